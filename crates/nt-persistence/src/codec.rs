//! Two-pass snapshot encoding for the registry and topology.
//!
//! Keys and values are serialized in two separate passes with a fixed
//! ordering so two replicas that committed the same log produce
//! byte-identical snapshots: every node id first (sorted, since
//! [`Registry`] stores them in a `BTreeMap`), then every node's fields in
//! that same order. Topology comes last as a single block — it has no
//! key/value split requirement of its own.
//!
//! Encoding is `postcard` (compact, no schema negotiation) wrapped by
//! [`crate::record::Frame`] for on-disk integrity.

use bytes::Bytes;
use nt_core::snapshot::NodeSnapshot;
use nt_core::Registry;
use nt_topology::Topology;
use nt_types::NodeId;
use serde::{Deserialize, Serialize};

use crate::record::Frame;
use crate::{PersistenceError, Result};

/// Current on-disk snapshot format. Bump this whenever [`SnapshotBody`]'s
/// shape changes in a way that isn't backward compatible, and extend
/// [`decode_snapshot`] with a migration branch rather than breaking old
/// snapshots outright.
pub const FORMAT_VERSION: u32 = 1;

/// The decoded, in-memory counterpart of a snapshot: enough to rebuild a
/// [`Registry`] and [`Topology`] with every transient index recomputed.
#[derive(Debug, Clone)]
pub struct DecodedSnapshot {
    pub registry: Registry,
    pub topology: Topology,
}

/// The two-pass wire body. `node_ids` is the keys pass; `node_values` is
/// the values pass, index-aligned with `node_ids`.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotBody {
    next_node_id_cursor: u32,
    node_ids: Vec<NodeId>,
    node_values: Vec<NodeSnapshot>,
    topology: Topology,
}

/// Encodes a registry and topology into a framed, checksummed byte buffer
/// ready to be written to disk by [`crate::storage::SnapshotStore`].
pub fn encode_snapshot(registry: &Registry, topology: &Topology) -> Result<Vec<u8>> {
    let mut node_ids = Vec::with_capacity(registry.len());
    let mut node_values = Vec::with_capacity(registry.len());
    for node in registry.iter() {
        node_ids.push(node.id);
        node_values.push(node.to_snapshot());
    }

    let body = SnapshotBody {
        next_node_id_cursor: registry.next_node_id_cursor(),
        node_ids,
        node_values,
        topology: topology.clone(),
    };

    let payload = postcard::to_allocvec(&body).map_err(PersistenceError::Encode)?;
    let frame = Frame::new(FORMAT_VERSION, Bytes::from(payload));
    Ok(frame.to_bytes())
}

/// Decodes a framed byte buffer back into a registry and topology.
/// Transient indices (`address_index`, `lease_index`, topology's name
/// indices and rack-index allocator) are rebuilt from the durable data
/// rather than persisted, since they are pure functions of it.
pub fn decode_snapshot(bytes: &[u8]) -> Result<DecodedSnapshot> {
    let frame = Frame::from_bytes(&Bytes::copy_from_slice(bytes))?;
    if frame.format_version() > FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: frame.format_version(),
            max: FORMAT_VERSION,
        });
    }

    let body: SnapshotBody =
        postcard::from_bytes(frame.payload()).map_err(PersistenceError::Decode)?;

    let mut registry = Registry::new();
    for (id, snapshot) in body.node_ids.into_iter().zip(body.node_values) {
        debug_assert_eq!(id, snapshot.id, "keys pass and values pass must stay index-aligned");
        let node = nt_core::Node::from_snapshot(snapshot);
        let default_address = if node.default_address().is_empty() {
            format!("unknown:{id}")
        } else {
            node.default_address().to_string()
        };
        registry.insert_node(node, default_address);
    }
    registry.set_next_node_id_cursor(body.next_node_id_cursor);
    registry.reindex_leases();
    registry.reindex_host_names();

    for node_id in registry
        .iter()
        .map(|n| n.id)
        .collect::<Vec<_>>()
    {
        if let Some(node) = registry.find_mut(node_id) {
            node.rebuild_tags(&body.topology);
        }
    }

    Ok(DecodedSnapshot {
        registry,
        topology: body.topology,
    })
}
