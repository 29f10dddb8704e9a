use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};
use transit_core::state::next_pickup_id;
use transit_core::PickupRequest;

use crate::error::StoreError;

/// Pickup requests recovered at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedRequests {
    pub requests: Vec<PickupRequest>,
    /// `1 + max(id)`, or `1` for an empty file.
    pub next_id: u64,
}

impl LoadedRequests {
    fn empty() -> Self {
        Self {
            requests: Vec::new(),
            next_id: 1,
        }
    }
}

/// JSON file holding the full pickup-request collection.
///
/// Every save rewrites the whole file via a sibling temp file and a rename,
/// so a reader never sees a half-written collection.
pub struct PickupStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PickupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file. A missing or unreadable file yields an empty collection.
    pub fn load(&self) -> LoadedRequests {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no pickup request file, starting empty");
            return LoadedRequests::empty();
        }

        match self.read() {
            Ok(requests) => {
                let next_id = next_pickup_id(&requests);
                info!(
                    path = %self.path.display(),
                    count = requests.len(),
                    next_id,
                    "loaded pickup requests"
                );
                LoadedRequests { requests, next_id }
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to load pickup requests");
                LoadedRequests::empty()
            }
        }
    }

    fn read(&self) -> Result<Vec<PickupRequest>, StoreError> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrite the file with the given collection.
    pub fn save(&self, requests: &[PickupRequest]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(requests)?;

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        info!(path = %self.path.display(), count = requests.len(), "saved pickup requests");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "pickupRequests.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
