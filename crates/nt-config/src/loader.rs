//! Configuration loader with multi-source merging

use crate::{NodeTrackerConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern.
pub struct ConfigLoader {
    deployment_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// New loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            deployment_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "NT".to_string(),
        }
    }

    pub fn with_deployment_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.deployment_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all sources with proper precedence.
    pub fn load(self) -> Result<NodeTrackerConfig> {
        let mut builder = config::Config::builder();

        let defaults = NodeTrackerConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        let deployment_config_file = Paths::deployment_config_file(&self.deployment_dir);
        if deployment_config_file.exists() {
            builder = builder.add_source(
                config::File::from(deployment_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        let local_config_file = Paths::local_config_file(&self.deployment_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to build configuration")?;

        let node_tracker_config: NodeTrackerConfig = config
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        Ok(node_tracker_config)
    }

    pub fn load_or_default(self) -> NodeTrackerConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_with_no_files_present() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config = ConfigLoader::new()
            .with_deployment_dir(temp_dir.path())
            .load()
            .expect("failed to load config");

        assert_eq!(config.gates.max_concurrent_node_registrations, 256);
        assert_eq!(config.replication.replication_priority_count, 4);
    }

    #[test]
    fn deployment_config_overrides_defaults() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let deployment_dir = temp_dir.path();

        fs::write(
            deployment_dir.join("node-tracker.toml"),
            r#"
[gates]
max_concurrent_node_registrations = 16

[leases]
online_node_timeout_ms = 5000
"#,
        )
        .expect("failed to write deployment config");

        let config = ConfigLoader::new()
            .with_deployment_dir(deployment_dir)
            .load()
            .expect("failed to load config");

        assert_eq!(config.gates.max_concurrent_node_registrations, 16);
        assert_eq!(config.leases.online_node_timeout_ms, 5000);
        // Untouched values keep their defaults.
        assert_eq!(config.gates.max_concurrent_node_unregistrations, 256);
    }

    #[test]
    fn local_config_overrides_deployment_config() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let deployment_dir = temp_dir.path();

        fs::write(
            deployment_dir.join("node-tracker.toml"),
            "[leases]\nonline_node_timeout_ms = 30000\n",
        )
        .expect("failed to write deployment config");

        fs::write(
            deployment_dir.join("node-tracker.local.toml"),
            "[leases]\nonline_node_timeout_ms = 1000\n",
        )
        .expect("failed to write local config");

        let config = ConfigLoader::new()
            .with_deployment_dir(deployment_dir)
            .load()
            .expect("failed to load config");

        assert_eq!(config.leases.online_node_timeout_ms, 1000);
    }

    // Environment variable precedence (NT_GATES_MAX_CONCURRENT_NODE_REGISTRATIONS=16,
    // etc.) is exercised by the embedding application rather than here: the
    // `config` crate caches process environment at build time, which makes
    // per-test isolation unreliable under a shared test binary.
}
