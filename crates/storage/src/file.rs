//! Directory-backed content store
//!
//! Each blob is one file named by the hex digest of its content. Writes go
//! to a temporary file, are fsynced, then renamed into place, so a crash
//! never leaves a partially written blob under a valid name.

use crate::store::{content_address, is_content_address, ContentStore, StoredBlob};
use relay_core::{Handle, StoreError};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Content store persisting blobs as files in one directory
#[derive(Debug, Clone)]
pub struct FileContentStore {
    dir: PathBuf,
}

impl FileContentStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, handle: &Handle) -> Option<PathBuf> {
        if !is_content_address(handle) {
            return None;
        }
        // Validated above: "0x" followed by 64 hex characters
        Some(self.dir.join(&handle.as_str()[2..]))
    }
}

impl ContentStore for FileContentStore {
    fn put(&self, bytes: &[u8]) -> Result<StoredBlob, StoreError> {
        let handle = content_address(bytes);
        let path = self
            .blob_path(&handle)
            .ok_or_else(|| StoreError::Unavailable(format!("bad handle {}", handle)))?;

        if !path.exists() {
            let tmp = self.dir.join(format!(".tmp-{}", Uuid::new_v4().simple()));
            {
                let mut file = File::create(&tmp)?;
                file.write_all(bytes)?;
                file.sync_all()?;
            }
            fs::rename(&tmp, &path)?;
            debug!(handle = %handle, size = bytes.len(), "Stored blob");
        }

        Ok(StoredBlob {
            handle,
            size: bytes.len(),
        })
    }

    fn get(&self, handle: &Handle) -> Result<Vec<u8>, StoreError> {
        let path = self
            .blob_path(handle)
            .ok_or_else(|| StoreError::NotFound(handle.clone()))?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(handle.clone()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn contains(&self, handle: &Handle) -> bool {
        self.blob_path(handle)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }
}
