//! Best-effort persistence of the last merged raw fetch, used to pre-warm
//! the cache before the first live fetch completes.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;

use crate::types::RawFlags;

#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encode/decode error: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<RawFlags, PersistError>;
    fn store(&self, raw: &RawFlags) -> Result<(), PersistError>;
}

pub struct FilesystemSnapshotStore {
    path: PathBuf,
}

impl FilesystemSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilesystemSnapshotStore { path: path.into() }
    }
}

impl SnapshotStore for FilesystemSnapshotStore {
    fn load(&self) -> Result<RawFlags, PersistError> {
        let file = File::open(&self.path)?;
        let raw = serde_json::from_reader(BufReader::new(file))?;
        Ok(raw)
    }

    fn store(&self, raw: &RawFlags) -> Result<(), PersistError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }

        // Create or overwrite
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, raw)?;
        Ok(())
    }
}

/// Discards stores and has nothing to load. For tests and deployments that
/// opt out of cold-start recovery.
pub struct NoopSnapshotStore;

impl SnapshotStore for NoopSnapshotStore {
    fn load(&self) -> Result<RawFlags, PersistError> {
        Ok(RawFlags::new())
    }

    fn store(&self, _raw: &RawFlags) -> Result<(), PersistError> {
        Ok(())
    }
}
