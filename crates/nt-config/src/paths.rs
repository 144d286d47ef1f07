//! Path utilities and XDG directory discovery

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// XDG-compliant paths for the node tracker.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("com", "NodeTracker", "node-tracker"),
        }
    }

    /// `~/.config/node-tracker/`
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| {
                ConfigError::XdgError("failed to determine user config directory".to_string())
            })
    }

    /// `~/.config/node-tracker/config.toml`
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    /// `<deployment_dir>/node-tracker.toml`
    pub fn deployment_config_file(deployment_dir: impl AsRef<Path>) -> PathBuf {
        deployment_dir.as_ref().join("node-tracker.toml")
    }

    /// `<deployment_dir>/node-tracker.local.toml` (gitignored, host-local overrides)
    pub fn local_config_file(deployment_dir: impl AsRef<Path>) -> PathBuf {
        deployment_dir.as_ref().join("node-tracker.local.toml")
    }

    /// `<deployment_dir>/.node-tracker` snapshot/state directory
    pub fn state_dir(deployment_dir: impl AsRef<Path>) -> PathBuf {
        deployment_dir.as_ref().join(".node-tracker")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_paths() {
        let dir = std::path::Path::new("/srv/cell0");
        assert_eq!(
            Paths::deployment_config_file(dir),
            dir.join("node-tracker.toml")
        );
        assert_eq!(
            Paths::local_config_file(dir),
            dir.join("node-tracker.local.toml")
        );
        assert_eq!(Paths::state_dir(dir), dir.join(".node-tracker"));
    }
}
