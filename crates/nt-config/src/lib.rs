//! Configuration for the node tracker
//!
//! Loads the knobs that govern concurrency gates, lease timeouts and
//! multicell bookkeeping from multiple sources, highest precedence last:
//! 1. Built-in defaults
//! 2. `~/.config/node-tracker/config.toml` (user defaults)
//! 3. `node-tracker.toml` (deployment config, tracked alongside the cell)
//! 4. `node-tracker.local.toml` (gitignored, host-local overrides)
//! 5. `NT_*`-prefixed environment variables (highest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Root node tracker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeTrackerConfig {
    pub gates: GateConfig,
    pub leases: LeaseConfig,
    pub resources: ResourceConfig,
    pub replication: ReplicationConfig,
    pub addresses: AddressConfig,
}

/// Concurrency gates bounding in-flight registration/unregistration
/// mutations (§6 "Concurrency gates").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub max_concurrent_node_registrations: u32,
    pub max_concurrent_node_unregistrations: u32,
    pub max_concurrent_incremental_heartbeats_per_shard: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent_node_registrations: 256,
            max_concurrent_node_unregistrations: 256,
            max_concurrent_incremental_heartbeats_per_shard: 64,
        }
    }
}

/// Lease-transaction timeouts, keyed by the state the timeout applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub registered_node_timeout_ms: u64,
    pub online_node_timeout_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            registered_node_timeout_ms: 60_000,
            online_node_timeout_ms: 30_000,
        }
    }
}

/// Startup grace period and replication bucket count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Grace period during which per-tag total resource limits are
    /// treated as infinite, so a cold cell doesn't reject heartbeats
    /// before every node has re-registered.
    pub total_resource_limits_consider_delay_ms: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            total_resource_limits_consider_delay_ms: 120_000,
        }
    }
}

/// Number of priority buckets in push/pull replication queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub replication_priority_count: u8,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            replication_priority_count: 4,
        }
    }
}

/// Fixed network-name priority list used by compute-default-address
/// (§4.1): the first address network name present on a node's reported
/// address map wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressConfig {
    pub network_priority: Vec<String>,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            network_priority: vec![
                "interconnect".to_string(),
                "default".to_string(),
                "fallback".to_string(),
            ],
        }
    }
}

impl NodeTrackerConfig {
    /// Load configuration from default locations relative to the current
    /// directory.
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration for a specific deployment directory.
    pub fn load_from_dir(deployment_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new()
            .with_deployment_dir(deployment_dir)
            .load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = NodeTrackerConfig::default();
        assert_eq!(config.gates.max_concurrent_node_registrations, 256);
        assert_eq!(config.leases.registered_node_timeout_ms, 60_000);
        assert_eq!(config.leases.online_node_timeout_ms, 30_000);
        assert_eq!(config.replication.replication_priority_count, 4);
        assert_eq!(config.addresses.network_priority[0], "interconnect");
    }
}
