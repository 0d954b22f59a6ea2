//! Directory-backed backend.
//!
//! Each committed node lives in its own file named after the SHA-256 of its
//! path, holding the bincode-encoded [`Node`]. An in-memory path index is
//! rebuilt from the directory on connect.
//!
//! Parameters:
//! - `root`: storage directory (created if missing). When absent a temporary
//!   directory is used and removed when the connection is dropped.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::debug;

use super::{
    descendants_start, is_below, Capabilities, ConnectParams, Connection, ConnectionFactory, Node, NodeStore,
    StoreConnection,
};
use crate::error::BackendError;

const NODE_EXTENSION: &str = "node";

fn hex32(d: [u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in d {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn encode(node: &Node) -> Result<Vec<u8>, BackendError> {
    bincode::serialize(node).map_err(|e| BackendError::Encoding(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Node, BackendError> {
    bincode::deserialize(bytes).map_err(|e| BackendError::Encoding(e.to_string()))
}

struct FsStore {
    dir: PathBuf,
    index: Mutex<BTreeSet<String>>,
    // Keeps an anonymous directory alive for the connection's lifetime.
    _scratch: Option<TempDir>,
}

impl FsStore {
    fn open(dir: PathBuf, scratch: Option<TempDir>) -> Result<Self, BackendError> {
        fs::create_dir_all(&dir)?;
        let mut index = BTreeSet::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(NODE_EXTENSION) {
                continue;
            }
            let node = decode(&fs::read(&path)?)?;
            index.insert(node.path);
        }
        debug!(dir = %dir.display(), nodes = index.len(), "opened node directory");
        Ok(Self {
            dir,
            index: Mutex::new(index),
            _scratch: scratch,
        })
    }

    fn file_for(&self, path: &str) -> PathBuf {
        let digest: [u8; 32] = Sha256::digest(path.as_bytes()).into();
        self.dir
            .join(format!("{}.{NODE_EXTENSION}", hex32(digest)))
    }

    fn index(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}

impl NodeStore for FsStore {
    fn load(&self, path: &str) -> Result<Option<Node>, BackendError> {
        if !self.index().contains(path) {
            return Ok(None);
        }
        match fs::read(self.file_for(path)) {
            Ok(bytes) => Ok(Some(decode(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, node: &Node) -> Result<(), BackendError> {
        fs::write(self.file_for(&node.path), encode(node)?)?;
        self.index().insert(node.path.clone());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), BackendError> {
        match fs::remove_file(self.file_for(path)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.index().remove(path);
        Ok(())
    }

    fn descendants(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let index = self.index();
        Ok(index
            .range::<String, _>((descendants_start(path), Bound::Unbounded))
            .take_while(|p| is_below(p, path))
            .cloned()
            .collect())
    }
}

#[derive(Clone, Debug)]
pub struct FsFactory {
    name: String,
}

impl FsFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for FsFactory {
    fn default() -> Self {
        Self::new("File System")
    }
}

impl ConnectionFactory for FsFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn Connection>, BackendError> {
        let store = match params.get("root") {
            Some(root) => FsStore::open(PathBuf::from(root), None),
            None => {
                let scratch = TempDir::new()?;
                FsStore::open(scratch.path().to_path_buf(), Some(scratch))
            }
        }
        .map_err(|e| BackendError::Connect {
            backend: self.name.clone(),
            reason: e.to_string(),
        })?;
        debug!(backend = %self.name, dir = %store.dir().display(), "connected");

        let capabilities = Capabilities {
            import_export: true,
            persistent: true,
        };
        Ok(Arc::new(StoreConnection::new(
            self.name.clone(),
            capabilities,
            store,
        )))
    }
}
