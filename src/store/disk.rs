use super::memory::PriceEntry;
use crate::core::error::PersistenceError;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// JSON file holding the persisted price store.
///
/// Writes go to a sibling temporary file that is renamed over the target,
/// so an interrupted write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Reads all entries. A missing file is an empty cache.
    pub async fn load(&self) -> Result<HashMap<String, PriceEntry>, PersistenceError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No price cache at {}", self.path.display());
                return Ok(HashMap::new());
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&content).map_err(|source| PersistenceError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    pub async fn save(&self, entries: &BTreeMap<String, PriceEntry>) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(entries)?;
        let write_error = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_error)?;
        }

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await.map_err(write_error)?;
        file.write_all(&json).await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(write_error)?;
        debug!(
            "Wrote {} price entries to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }
}
