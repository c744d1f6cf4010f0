//! Versioned, deterministic parameter snapshots.
//!
//! Snapshots carry a schema version header and the architecture that produced
//! the parameters, so an incompatible or truncated file is rejected during
//! load instead of silently corrupting a network.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::config::NetworkConfig;
use crate::net::params::ParamSet;

/// Schema version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors that can occur while saving or loading parameter snapshots.
#[derive(Debug)]
pub enum CheckpointError {
    /// Underlying I/O failure while reading or writing snapshot files.
    Io(std::io::Error),
    /// Serialization or deserialization error from the binary codec.
    Serialization(bincode::Error),
    /// The file was well formed but carries an incompatible schema version.
    VersionMismatch { expected: u32, found: u32 },
    /// The snapshot did not match the structure of the receiving network.
    InvalidFormat(String),
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(err) => write!(f, "I/O error while accessing snapshot: {err}"),
            CheckpointError::Serialization(err) => {
                write!(f, "Failed to (de)serialize snapshot payload: {err}")
            }
            CheckpointError::VersionMismatch { expected, found } => write!(
                f,
                "Snapshot version mismatch: expected {expected}, found {found}",
            ),
            CheckpointError::InvalidFormat(msg) => {
                write!(f, "Snapshot has invalid structure: {msg}")
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        CheckpointError::Io(err)
    }
}

impl From<bincode::Error> for CheckpointError {
    fn from(err: bincode::Error) -> Self {
        CheckpointError::Serialization(err)
    }
}

/// Deterministic binary codec options shared by writer and reader.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_little_endian()
}

/// On-disk payload: schema version, producing architecture, parameters.
#[derive(Debug, Serialize, Deserialize)]
pub struct ParamSnapshot {
    version: u32,
    config: NetworkConfig,
    params: ParamSet,
}

impl ParamSnapshot {
    pub fn new(config: NetworkConfig, params: ParamSet) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            config,
            params,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }
}

/// Writes a snapshot to `path`, creating parent directories as needed.
pub fn write_snapshot<P: AsRef<Path>>(
    path: P,
    snapshot: &ParamSnapshot,
) -> Result<(), CheckpointError> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    codec().serialize_into(&mut writer, snapshot)?;
    writer.flush()?;
    Ok(())
}

/// Reads a snapshot from `path` and validates its schema version.
pub fn read_snapshot<P: AsRef<Path>>(path: P) -> Result<ParamSnapshot, CheckpointError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let snapshot: ParamSnapshot = codec().deserialize_from(&mut reader)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CheckpointError::VersionMismatch {
            expected: SNAPSHOT_VERSION,
            found: snapshot.version,
        });
    }
    Ok(snapshot)
}
