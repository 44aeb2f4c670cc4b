//! On-disk session cache.
//!
//! One MessagePack file per `(year, round, session_type)`, named with the
//! pipeline version so a processing change invalidates old files without
//! any migration step. Deleting a file forces a fresh load on the next
//! request. Corrupt or mismatched files are treated as misses.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use replay_core::SessionKey;
use replay_pipeline::ProcessedSession;

/// Bumped whenever the pipeline's output shape or semantics change.
pub const PIPELINE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O failed")]
    Io(#[from] io::Error),

    #[error("Cache encoding failed")]
    Encode(#[from] rmp_serde::encode::Error),
}

pub struct FrameCache {
    dir: PathBuf,
}

impl FrameCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: SessionKey) -> PathBuf {
        self.dir.join(format!("{key}_v{PIPELINE_VERSION}.rmp"))
    }

    /// Read the cached session for `key`, if a valid file exists.
    pub fn load(&self, key: SessionKey) -> Result<Option<ProcessedSession>, CacheError> {
        let path = self.path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        match rmp_serde::from_slice::<ProcessedSession>(&bytes) {
            Ok(session) => {
                info!(key = %key, path = %path.display(), "Cache hit");
                Ok(Some(session))
            }
            Err(error) => {
                // A file we cannot decode is stale or damaged; reload fresh.
                warn!(
                    key = %key,
                    path = %path.display(),
                    error = %error,
                    "Ignoring unreadable cache file"
                );
                Ok(None)
            }
        }
    }

    /// Persist `session` for `key`. Writes to a temporary sibling and
    /// renames, so readers never observe a half-written file.
    pub fn store(&self, key: SessionKey, session: &ProcessedSession) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path(key);
        let tmp = path.with_extension("rmp.tmp");
        let bytes = rmp_serde::to_vec_named(session)?;
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;

        info!(
            key = %key,
            path = %path.display(),
            bytes = bytes.len(),
            "Session cached"
        );
        Ok(())
    }
}
