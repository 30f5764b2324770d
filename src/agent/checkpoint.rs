use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;

use crate::game::config::ConfigError;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("checkpoint version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("checkpoint network maps {found_inputs} inputs to {found_actions} actions, expected {expected_inputs} to {expected_actions}")]
    ShapeMismatch {
        expected_inputs: usize,
        expected_actions: usize,
        found_inputs: usize,
        found_actions: usize,
    },
}

/// Everything needed to resume training, written as one bincode blob.
/// `N` is the network, which carries online and target parameters plus
/// optimizer state. Saving borrows it (`Checkpoint<&N>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<N> {
    pub version: u32,
    pub network: N,
    pub epsilon: f32,
    pub step_count: u64,
    pub episodes: u64,
}

impl<N> Checkpoint<N> {
    pub fn new(network: N, epsilon: f32, step_count: u64, episodes: u64) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            network,
            epsilon,
            step_count,
            episodes,
        }
    }
}

impl<N: Serialize> Checkpoint<N> {
    /// Writes next to `path` first and renames over it, so a reader never
    /// sees a half-written file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = staging_path(path);
        let mut writer = BufWriter::new(File::create(&staging)?);
        let written = bincode::serialize_into(&mut writer, self)
            .map_err(CheckpointError::from)
            .and_then(|_| writer.flush().map_err(CheckpointError::from));
        if let Err(err) = written {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
        drop(writer);

        fs::rename(&staging, path)?;
        info!(path = %path.display(), step_count = self.step_count, "checkpoint saved");
        Ok(())
    }
}

impl<N: DeserializeOwned> Checkpoint<N> {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let checkpoint: Self = bincode::deserialize_from(reader)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        info!(path = %path.display(), step_count = checkpoint.step_count, "checkpoint loaded");
        Ok(checkpoint)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
