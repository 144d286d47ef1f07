//! nt-topology: topology containers for the node tracker
//!
//! A cluster's physical layout is modeled as a three-level tree:
//! [`DataCenter`] owns zero or more [`Rack`]s, a `Rack` owns zero or more
//! [`Host`]s, and a `Host` owns the set of node ids physically running on
//! it. Every entity is named and referenced by a small integer id; renames
//! and reparenting keep the name indices and rack-index allocator
//! consistent.
//!
//! # Example
//!
//! ```
//! use nt_topology::Topology;
//!
//! let mut topology = Topology::new();
//! let dc = topology.create_data_center("dc1").unwrap();
//! let rack = topology.create_rack("rack1", Some(dc)).unwrap();
//! let host = topology.create_host("host1", rack).unwrap();
//!
//! assert_eq!(topology.rack(rack).unwrap().data_center, Some(dc));
//! assert_eq!(topology.host(host).unwrap().rack, Some(rack));
//! ```

use std::collections::{BTreeSet, HashMap};

use nt_types::{DataCenterId, DataCenterIndex, HostId, NodeId, RackId, RackIndex};
use serde::{Deserialize, Serialize};

mod dc_index;
mod rack_index;

pub use dc_index::DataCenterIndexAllocator;
pub use rack_index::RackIndexAllocator;

#[cfg(test)]
mod tests;

/// A data center: the topmost topology container. Carries a dense index
/// in `[1, 16]` so a set of data centers fits in a single filter mask,
/// mirroring [`Rack::index`]. Immutable once created except by explicit
/// rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCenter {
    pub id: DataCenterId,
    pub name: String,
    pub index: DataCenterIndex,
}

/// A rack: carries a dense index in `[1, 63]` so that a set of racks fits
/// in a single 64-bit filter mask, and an optional back-pointer to its
/// data center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rack {
    pub id: RackId,
    pub name: String,
    pub index: RackIndex,
    pub data_center: Option<DataCenterId>,
}

/// A host: bound to at most one rack (unbound after its rack is
/// destroyed), with the set of node ids currently registered on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub rack: Option<RackId>,
    pub members: BTreeSet<NodeId>,
}

/// Errors raised by topology operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("data center not found: {0}")]
    DataCenterNotFound(DataCenterId),
    #[error("rack not found: {0}")]
    RackNotFound(RackId),
    #[error("host not found: {0}")]
    HostNotFound(HostId),
    #[error("name not found: {0}")]
    NameNotFound(String),
    #[error("name already exists: {0}")]
    AlreadyExists(String),
    #[error("rack index pool exhausted")]
    LimitReached,
    #[error("data center index pool exhausted")]
    DataCenterLimitReached,
}

pub type Result<T> = std::result::Result<T, TopologyError>;

/// The set of hosts whose effective ancestor tags changed as the result of
/// reparenting a rack; a node's tags derive from its host's rack and the
/// rack's data center, so moving a rack under a different (or no) data
/// center invalidates every host currently bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RackReparented {
    pub rack: RackId,
    pub old_data_center: Option<DataCenterId>,
    pub new_data_center: Option<DataCenterId>,
    pub affected_hosts: Vec<HostId>,
}

/// Owner of every topology entity, plus the name indices and rack-index
/// allocator needed to keep lookups and dense-index invariants consistent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    data_centers: HashMap<DataCenterId, DataCenter>,
    data_center_names: HashMap<String, DataCenterId>,
    next_data_center_id: u16,
    data_center_index_allocator: DataCenterIndexAllocator,

    racks: HashMap<RackId, Rack>,
    rack_names: HashMap<String, RackId>,
    next_rack_id: u32,
    rack_index_allocator: RackIndexAllocator,

    hosts: HashMap<HostId, Host>,
    host_names: HashMap<String, HostId>,
    next_host_id: u32,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Data centers
    // ------------------------------------------------------------------

    pub fn create_data_center(&mut self, name: impl Into<String>) -> Result<DataCenterId> {
        let name = name.into();
        if self.data_center_names.contains_key(&name) {
            return Err(TopologyError::AlreadyExists(name));
        }
        let index = self
            .data_center_index_allocator
            .allocate()
            .ok_or(TopologyError::DataCenterLimitReached)?;

        let id = DataCenterId::new(self.next_data_center_id);
        self.next_data_center_id += 1;

        self.data_center_names.insert(name.clone(), id);
        self.data_centers.insert(id, DataCenter { id, name, index });
        Ok(id)
    }

    pub fn rename_data_center(&mut self, id: DataCenterId, new_name: impl Into<String>) -> Result<()> {
        let new_name = new_name.into();
        if !self.data_centers.contains_key(&id) {
            return Err(TopologyError::DataCenterNotFound(id));
        }
        if self.data_center_names.contains_key(&new_name) {
            return Err(TopologyError::AlreadyExists(new_name));
        }

        let dc = self.data_centers.get_mut(&id).expect("checked above");
        let old_name = std::mem::replace(&mut dc.name, new_name.clone());
        self.data_center_names.remove(&old_name);
        self.data_center_names.insert(new_name, id);
        Ok(())
    }

    /// Destroys a data center, reassigning every member rack to "no DC".
    /// Returns the racks that were reparented.
    pub fn destroy_data_center(&mut self, id: DataCenterId) -> Result<Vec<RackId>> {
        let dc = self
            .data_centers
            .remove(&id)
            .ok_or(TopologyError::DataCenterNotFound(id))?;
        self.data_center_names.remove(&dc.name);
        self.data_center_index_allocator.free(dc.index);

        let affected: Vec<RackId> = self
            .racks
            .values()
            .filter(|r| r.data_center == Some(id))
            .map(|r| r.id)
            .collect();
        for rack_id in &affected {
            if let Some(rack) = self.racks.get_mut(rack_id) {
                rack.data_center = None;
            }
        }
        Ok(affected)
    }

    pub fn data_center(&self, id: DataCenterId) -> Option<&DataCenter> {
        self.data_centers.get(&id)
    }

    pub fn data_center_by_name(&self, name: &str) -> Result<&DataCenter> {
        let id = self
            .data_center_names
            .get(name)
            .ok_or_else(|| TopologyError::NameNotFound(name.to_string()))?;
        Ok(&self.data_centers[id])
    }

    pub fn data_centers(&self) -> impl Iterator<Item = &DataCenter> {
        self.data_centers.values()
    }

    // ------------------------------------------------------------------
    // Racks
    // ------------------------------------------------------------------

    pub fn create_rack(
        &mut self,
        name: impl Into<String>,
        data_center: Option<DataCenterId>,
    ) -> Result<RackId> {
        let name = name.into();
        if self.rack_names.contains_key(&name) {
            return Err(TopologyError::AlreadyExists(name));
        }
        if let Some(dc) = data_center {
            if !self.data_centers.contains_key(&dc) {
                return Err(TopologyError::DataCenterNotFound(dc));
            }
        }
        let index = self
            .rack_index_allocator
            .allocate()
            .ok_or(TopologyError::LimitReached)?;

        let id = RackId::new(self.next_rack_id);
        self.next_rack_id += 1;

        self.rack_names.insert(name.clone(), id);
        self.racks.insert(
            id,
            Rack {
                id,
                name,
                index,
                data_center,
            },
        );
        Ok(id)
    }

    pub fn rename_rack(&mut self, id: RackId, new_name: impl Into<String>) -> Result<()> {
        let new_name = new_name.into();
        if !self.racks.contains_key(&id) {
            return Err(TopologyError::RackNotFound(id));
        }
        if self.rack_names.contains_key(&new_name) {
            return Err(TopologyError::AlreadyExists(new_name));
        }

        let rack = self.racks.get_mut(&id).expect("checked above");
        let old_name = std::mem::replace(&mut rack.name, new_name.clone());
        self.rack_names.remove(&old_name);
        self.rack_names.insert(new_name, id);
        Ok(())
    }

    /// Unbinds every host currently on `rack_id`, updates the rack's
    /// parent link, then returns the affected hosts so the caller can emit
    /// a configuration-refresh notification for each. The hosts are not
    /// rebound automatically — a rack's data center is orthogonal to the
    /// host↔rack link, which is untouched by this operation.
    pub fn set_rack_parent(
        &mut self,
        rack_id: RackId,
        data_center: Option<DataCenterId>,
    ) -> Result<RackReparented> {
        if let Some(dc) = data_center {
            if !self.data_centers.contains_key(&dc) {
                return Err(TopologyError::DataCenterNotFound(dc));
            }
        }
        let rack = self
            .racks
            .get_mut(&rack_id)
            .ok_or(TopologyError::RackNotFound(rack_id))?;
        let old_data_center = rack.data_center;
        rack.data_center = data_center;

        let affected_hosts: Vec<HostId> = self
            .hosts
            .values()
            .filter(|h| h.rack == Some(rack_id))
            .map(|h| h.id)
            .collect();

        Ok(RackReparented {
            rack: rack_id,
            old_data_center,
            new_data_center: data_center,
            affected_hosts,
        })
    }

    /// Destroys a rack, reassigning every member host to "no rack", then
    /// frees the dense index and removes the rack from the name index.
    /// Returns the affected hosts.
    pub fn destroy_rack(&mut self, id: RackId) -> Result<Vec<HostId>> {
        let rack = self.racks.remove(&id).ok_or(TopologyError::RackNotFound(id))?;
        self.rack_names.remove(&rack.name);
        self.rack_index_allocator.free(rack.index);

        let affected: Vec<HostId> = self
            .hosts
            .values()
            .filter(|h| h.rack == Some(id))
            .map(|h| h.id)
            .collect();
        for host_id in &affected {
            if let Some(host) = self.hosts.get_mut(host_id) {
                host.rack = None;
            }
        }
        Ok(affected)
    }

    pub fn rack(&self, id: RackId) -> Option<&Rack> {
        self.racks.get(&id)
    }

    pub fn rack_by_name(&self, name: &str) -> Result<&Rack> {
        let id = self
            .rack_names
            .get(name)
            .ok_or_else(|| TopologyError::NameNotFound(name.to_string()))?;
        Ok(&self.racks[id])
    }

    pub fn racks(&self) -> impl Iterator<Item = &Rack> {
        self.racks.values()
    }

    // ------------------------------------------------------------------
    // Hosts
    // ------------------------------------------------------------------

    pub fn create_host(&mut self, name: impl Into<String>, rack: RackId) -> Result<HostId> {
        let name = name.into();
        if self.host_names.contains_key(&name) {
            return Err(TopologyError::AlreadyExists(name));
        }
        if !self.racks.contains_key(&rack) {
            return Err(TopologyError::RackNotFound(rack));
        }

        let id = HostId::new(self.next_host_id);
        self.next_host_id += 1;

        self.host_names.insert(name.clone(), id);
        self.hosts.insert(
            id,
            Host {
                id,
                name,
                rack: Some(rack),
                members: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    pub fn rename_host(&mut self, id: HostId, new_name: impl Into<String>) -> Result<()> {
        let new_name = new_name.into();
        if !self.hosts.contains_key(&id) {
            return Err(TopologyError::HostNotFound(id));
        }
        if self.host_names.contains_key(&new_name) {
            return Err(TopologyError::AlreadyExists(new_name));
        }

        let host = self.hosts.get_mut(&id).expect("checked above");
        let old_name = std::mem::replace(&mut host.name, new_name.clone());
        self.host_names.remove(&old_name);
        self.host_names.insert(new_name, id);
        Ok(())
    }

    pub fn set_host_rack(&mut self, host_id: HostId, rack: RackId) -> Result<()> {
        if !self.racks.contains_key(&rack) {
            return Err(TopologyError::RackNotFound(rack));
        }
        let host = self
            .hosts
            .get_mut(&host_id)
            .ok_or(TopologyError::HostNotFound(host_id))?;
        host.rack = Some(rack);
        Ok(())
    }

    pub fn destroy_host(&mut self, id: HostId) -> Result<()> {
        let host = self.hosts.remove(&id).ok_or(TopologyError::HostNotFound(id))?;
        self.host_names.remove(&host.name);
        Ok(())
    }

    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.get(&id)
    }

    pub fn host_by_name(&self, name: &str) -> Result<&Host> {
        let id = self
            .host_names
            .get(name)
            .ok_or_else(|| TopologyError::NameNotFound(name.to_string()))?;
        Ok(&self.hosts[id])
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn add_node_to_host(&mut self, host_id: HostId, node: NodeId) -> Result<()> {
        let host = self
            .hosts
            .get_mut(&host_id)
            .ok_or(TopologyError::HostNotFound(host_id))?;
        host.members.insert(node);
        Ok(())
    }

    pub fn remove_node_from_host(&mut self, host_id: HostId, node: NodeId) -> Result<()> {
        let host = self
            .hosts
            .get_mut(&host_id)
            .ok_or(TopologyError::HostNotFound(host_id))?;
        host.members.remove(&node);
        Ok(())
    }
}
