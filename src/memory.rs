//! Persistence of the last fully connected remote.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::adapter::PeripheralId;

pub trait DeviceMemory: Send {
    fn known_identity(&self) -> Option<PeripheralId>;
    fn set_known_identity(&mut self, id: &PeripheralId) -> anyhow::Result<()>;
    fn clear_known_identity(&mut self) -> anyhow::Result<()>;
}

/// Volatile store, forgotten when the process exits.
#[derive(Debug, Clone, Default)]
pub struct InMemory {
    identity: Option<PeripheralId>,
}

impl InMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(id: PeripheralId) -> Self {
        Self { identity: Some(id) }
    }
}

impl DeviceMemory for InMemory {
    fn known_identity(&self) -> Option<PeripheralId> {
        self.identity.clone()
    }

    fn set_known_identity(&mut self, id: &PeripheralId) -> anyhow::Result<()> {
        self.identity = Some(id.clone());
        Ok(())
    }

    fn clear_known_identity(&mut self) -> anyhow::Result<()> {
        self.identity = None;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Stored {
    known_identity: Option<PeripheralId>,
}

/// JSON file store. The file is read once on open and rewritten on change;
/// the cached identity only changes once the file has been written.
#[derive(Debug)]
pub struct FileMemory {
    path: PathBuf,
    identity: Option<PeripheralId>,
}

impl FileMemory {
    /// Open the store, treating a missing file as empty.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let identity = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<Stored>(&text)?.known_identity,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(anyhow::anyhow!("cannot read {}: {}", path.display(), e)),
        };
        Ok(Self { path, identity })
    }

    fn save(&self, identity: Option<&PeripheralId>) -> anyhow::Result<()> {
        let stored = Stored {
            known_identity: identity.cloned(),
        };
        fs::write(&self.path, serde_json::to_vec_pretty(&stored)?)
            .map_err(|e| anyhow::anyhow!("cannot write {}: {}", self.path.display(), e))
    }
}

impl DeviceMemory for FileMemory {
    fn known_identity(&self) -> Option<PeripheralId> {
        self.identity.clone()
    }

    fn set_known_identity(&mut self, id: &PeripheralId) -> anyhow::Result<()> {
        self.save(Some(id))?;
        self.identity = Some(id.clone());
        Ok(())
    }

    fn clear_known_identity(&mut self) -> anyhow::Result<()> {
        self.save(None)?;
        self.identity = None;
        Ok(())
    }
}

impl<T: DeviceMemory + ?Sized> DeviceMemory for Box<T> {
    fn known_identity(&self) -> Option<PeripheralId> {
        (**self).known_identity()
    }

    fn set_known_identity(&mut self, id: &PeripheralId) -> anyhow::Result<()> {
        (**self).set_known_identity(id)
    }

    fn clear_known_identity(&mut self) -> anyhow::Result<()> {
        (**self).clear_known_identity()
    }
}
