//! Generation-based snapshot storage on disk.
//!
//! [`SnapshotStore`] owns a directory with one file per generation plus a
//! small manifest recording the newest complete one. A save writes a new
//! generation file, `fsync`s it, then updates the manifest — in that order,
//! so a crash between the two leaves the manifest still pointing at the
//! previous (complete) generation rather than a half-written one.
//!
//! # File layout
//!
//! ```text
//! {data_dir}/
//! ├── snapshot_000000.bin
//! ├── snapshot_000001.bin
//! └── manifest.json            <- { "latest_generation": 1 }
//! ```
//!
//! Old generations are not pruned automatically; callers decide retention
//! (e.g. "keep the last 3") via [`SnapshotStore::prune_older_than`].

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use nt_core::Registry;
use nt_topology::Topology;
use serde::{Deserialize, Serialize};

use crate::codec::{decode_snapshot, encode_snapshot, DecodedSnapshot};
use crate::{PersistenceError, Result};

const MANIFEST_FILENAME: &str = "manifest.json";

fn snapshot_filename(generation: u64) -> String {
    format!("snapshot_{generation:06}.bin")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    latest_generation: u64,
}

/// Owner of a snapshot directory.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Opens (without requiring it to already contain a snapshot) the
    /// directory at `dir`, creating it if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILENAME)
    }

    fn read_manifest(&self) -> Option<Manifest> {
        let bytes = fs::read(self.manifest_path()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let json = serde_json::to_vec_pretty(manifest).map_err(std::io::Error::other)?;
        let tmp_path = self.manifest_path().with_extension("json.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp_path, self.manifest_path())?;
        Ok(())
    }

    /// Encodes and writes a new generation, then advances the manifest to
    /// point at it. Returns the new generation number.
    pub fn save(&self, registry: &Registry, topology: &Topology) -> Result<u64> {
        let generation = self.read_manifest().map_or(0, |m| m.latest_generation + 1);
        let bytes = encode_snapshot(registry, topology)?;

        let path = self.dir.join(snapshot_filename(generation));
        let mut file = File::create(&path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        self.write_manifest(&Manifest {
            latest_generation: generation,
        })?;
        tracing::info!(generation, bytes = bytes.len(), "wrote node tracker snapshot");
        Ok(generation)
    }

    /// Loads the manifest's recorded generation. If that file is missing,
    /// truncated, or fails its checksum (a crash landed between writing the
    /// file and syncing it), falls back to the next-older generation that
    /// still verifies, down to "no snapshot at all".
    pub fn load_latest(&self) -> Result<Option<DecodedSnapshot>> {
        let Some(manifest) = self.read_manifest() else {
            return Ok(None);
        };

        let mut generation = manifest.latest_generation;
        loop {
            match self.load_generation(generation) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(err) => {
                    tracing::warn!(generation, error = %err, "snapshot generation failed to load, trying older one");
                    if generation == 0 {
                        return Ok(None);
                    }
                    generation -= 1;
                }
            }
        }
    }

    fn load_generation(&self, generation: u64) -> Result<DecodedSnapshot> {
        let path = self.dir.join(snapshot_filename(generation));
        if !path.exists() {
            return Err(PersistenceError::NoSnapshot(path));
        }
        let bytes = fs::read(path)?;
        decode_snapshot(&bytes)
    }

    /// Deletes every generation file older than `keep_generation`, leaving
    /// the manifest untouched (it already points at the newest one).
    pub fn prune_older_than(&self, keep_generation: u64) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(generation) = parse_generation(&name) else {
                continue;
            };
            if generation < keep_generation {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

fn parse_generation(filename: &str) -> Option<u64> {
    filename
        .strip_prefix("snapshot_")?
        .strip_suffix(".bin")?
        .parse()
        .ok()
}
