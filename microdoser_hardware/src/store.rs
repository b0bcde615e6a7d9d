//! JSON-file backed preference store.
//!
//! Stands in for on-chip NVS on hosts with a filesystem. The whole slot map is
//! rewritten atomically on every changed save; unchanged values are not
//! rewritten.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use microdoser_traits::PreferenceStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HwError, Result};
use crate::util::write_atomic;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    slots: BTreeMap<u32, u32>,
}

#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    slots: RefCell<BTreeMap<u32, u32>>,
}

impl FilePreferenceStore {
    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable or corrupt one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let slots = match std::fs::read(&path) {
            Ok(bytes) => {
                let file: StoreFile = serde_json::from_slice(&bytes)
                    .map_err(|e| HwError::Store(format!("{}: {e}", path.display())))?;
                info!(path = %path.display(), slots = file.slots.len(), "preference store loaded");
                file.slots
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "preference store not found; starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(HwError::Io(e)),
        };
        Ok(Self {
            path,
            slots: RefCell::new(slots),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    fn flush(&self) -> Result<()> {
        let file = StoreFile {
            slots: self.slots.borrow().clone(),
        };
        let bytes =
            serde_json::to_vec_pretty(&file).map_err(|e| HwError::Store(e.to_string()))?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load(&self, key: u32) -> Option<u32> {
        self.slots.borrow().get(&key).copied()
    }

    fn save(&self, key: u32, value: u32) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let previous = self.slots.borrow_mut().insert(key, value);
        if previous == Some(value) {
            return Ok(());
        }
        if let Err(e) = self.flush() {
            // keep memory consistent with disk
            let mut slots = self.slots.borrow_mut();
            match previous {
                Some(v) => slots.insert(key, v),
                None => slots.remove(&key),
            };
            return Err(Box::new(e));
        }
        debug!(key, value, "preference saved");
        Ok(())
    }
}
