//! Node-store interface that every benchmarked backend implements.
//!
//! A backend hands out a [`Connection`] through its [`ConnectionFactory`].
//! Suites log in to the connection to obtain [`Session`]s, which see a tree
//! of [`Node`]s addressed by slash-separated absolute paths (`/a/b`). Changes
//! made in a session stay pending until [`Session::save`].

pub mod fs;
pub mod memory;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BackendError;

pub use fs::FsFactory;
pub use memory::MemoryFactory;

pub const ROOT_PATH: &str = "/";

/// Free-form parameters passed to [`ConnectionFactory::connect`].
pub type ConnectParams = BTreeMap<String, String>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub path: String,
    pub properties: BTreeMap<String, String>,
}

impl Node {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }
}

/// Optional features a backend advertises; suites gate on these.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub import_export: bool,
    pub persistent: bool,
}

pub trait ConnectionFactory {
    /// Display name used for reports and artifact file names.
    fn name(&self) -> &str;

    fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn Connection>, BackendError>;
}

pub trait Connection: Send + Sync {
    fn backend_name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn login(&self) -> Result<Box<dyn Session>, BackendError>;

    /// Lightweight login/logout probe.
    fn verify(&self) -> Result<(), BackendError> {
        self.login()?.logout()
    }
}

pub trait Session {
    /// Creates `name` under `parent` and returns the new node's path.
    fn add_node(
        &mut self,
        parent: &str,
        name: &str,
        properties: BTreeMap<String, String>,
    ) -> Result<String, BackendError>;

    fn node(&self, path: &str) -> Result<Option<Node>, BackendError>;

    fn exists(&self, path: &str) -> Result<bool, BackendError> {
        Ok(self.node(path)?.is_some())
    }

    /// Paths of the direct children of `path`, sorted.
    fn children(&self, path: &str) -> Result<Vec<String>, BackendError>;

    fn set_property(&mut self, path: &str, key: &str, value: &str) -> Result<(), BackendError>;

    /// Removes `path` and its whole subtree; returns the number of nodes removed.
    fn remove(&mut self, path: &str) -> Result<usize, BackendError>;

    fn save(&mut self) -> Result<(), BackendError>;

    /// Serializes `path` and its subtree, with paths relative to the parent
    /// of `path`. Exporting `/` yields every node below the root.
    fn export(&self, path: &str) -> Result<Vec<u8>, BackendError>;

    /// Re-creates a previously exported subtree under `parent`, replacing
    /// colliding nodes. Returns the number of nodes written.
    fn import(&mut self, parent: &str, data: &[u8]) -> Result<usize, BackendError>;

    /// Ends the session, discarding unsaved changes.
    fn logout(self: Box<Self>) -> Result<(), BackendError>;
}

/// Durable part of a backend: committed nodes keyed by path.
pub(crate) trait NodeStore: Send + Sync {
    fn load(&self, path: &str) -> Result<Option<Node>, BackendError>;
    fn store(&self, node: &Node) -> Result<(), BackendError>;
    fn delete(&self, path: &str) -> Result<(), BackendError>;
    /// Every committed path strictly below `path`, sorted.
    fn descendants(&self, path: &str) -> Result<Vec<String>, BackendError>;
}

pub fn child_path(parent: &str, name: &str) -> Result<String, BackendError> {
    if name.is_empty() || name.contains('/') {
        return Err(BackendError::InvalidPath(name.to_string()));
    }
    Ok(format!("{}/{}", parent.trim_end_matches('/'), name))
}

pub fn parent_path(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT_PATH),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Lower bound of the sorted key range holding every descendant of `path`.
/// The range ends at the first key for which [`is_below`] fails.
pub(crate) fn descendants_start(path: &str) -> Bound<String> {
    if path == ROOT_PATH {
        Bound::Excluded(ROOT_PATH.to_string())
    } else {
        Bound::Included(format!("{path}/"))
    }
}

pub(crate) fn is_below(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT_PATH {
        return path != ROOT_PATH && path.starts_with('/');
    }
    path.len() > ancestor.len() + 1
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

fn validate_path(path: &str) -> Result<(), BackendError> {
    if path == ROOT_PATH {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(BackendError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Exported subtree: paths are relative to the export root.
#[derive(Debug, Serialize, Deserialize)]
struct ExportDocument {
    nodes: Vec<Node>,
}

/// Connection shared by the bundled backends: a name, capabilities and a store.
pub(crate) struct StoreConnection<S: NodeStore> {
    name: String,
    capabilities: Capabilities,
    store: Arc<S>,
}

impl<S: NodeStore + 'static> StoreConnection<S> {
    pub(crate) fn new(name: impl Into<String>, capabilities: Capabilities, store: S) -> Self {
        Self {
            name: name.into(),
            capabilities,
            store: Arc::new(store),
        }
    }
}

impl<S: NodeStore + 'static> Connection for StoreConnection<S> {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn login(&self) -> Result<Box<dyn Session>, BackendError> {
        Ok(Box::new(StoreSession {
            backend: self.name.clone(),
            capabilities: self.capabilities,
            store: Arc::clone(&self.store),
            pending: BTreeMap::new(),
        }))
    }
}

/// Session over a [`NodeStore`]. `pending` maps a path to its new value, or
/// to `None` when the node is removed.
struct StoreSession<S: NodeStore> {
    backend: String,
    capabilities: Capabilities,
    store: Arc<S>,
    pending: BTreeMap<String, Option<Node>>,
}

impl<S: NodeStore> StoreSession<S> {
    fn lookup(&self, path: &str) -> Result<Option<Node>, BackendError> {
        if path == ROOT_PATH {
            return Ok(Some(Node::new(ROOT_PATH)));
        }
        match self.pending.get(path) {
            Some(change) => Ok(change.clone()),
            None => self.store.load(path),
        }
    }

    fn descendants(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let mut all: Vec<String> = self
            .store
            .descendants(path)?
            .into_iter()
            .filter(|p| !matches!(self.pending.get(p), Some(None)))
            .collect();
        all.extend(
            self.pending
                .iter()
                .filter(|(p, change)| change.is_some() && is_below(p, path))
                .map(|(p, _)| p.clone()),
        );
        all.sort();
        all.dedup();
        Ok(all)
    }

    fn require(&self, path: &str) -> Result<Node, BackendError> {
        validate_path(path)?;
        self.lookup(path)?
            .ok_or_else(|| BackendError::NodeNotFound(path.to_string()))
    }

    fn unsupported(&self, operation: &'static str) -> BackendError {
        BackendError::Unsupported {
            backend: self.backend.clone(),
            operation,
        }
    }
}

impl<S: NodeStore> Session for StoreSession<S> {
    fn add_node(
        &mut self,
        parent: &str,
        name: &str,
        properties: BTreeMap<String, String>,
    ) -> Result<String, BackendError> {
        validate_path(parent)?;
        let path = child_path(parent, name)?;
        if self.lookup(parent)?.is_none() {
            return Err(BackendError::MissingParent(path));
        }
        if self.lookup(&path)?.is_some() {
            return Err(BackendError::NodeExists(path));
        }
        let node = Node {
            path: path.clone(),
            properties,
        };
        self.pending.insert(path.clone(), Some(node));
        Ok(path)
    }

    fn node(&self, path: &str) -> Result<Option<Node>, BackendError> {
        validate_path(path)?;
        self.lookup(path)
    }

    fn children(&self, path: &str) -> Result<Vec<String>, BackendError> {
        self.require(path)?;
        Ok(self
            .descendants(path)?
            .into_iter()
            .filter(|p| parent_path(p) == Some(path))
            .collect())
    }

    fn set_property(&mut self, path: &str, key: &str, value: &str) -> Result<(), BackendError> {
        if path == ROOT_PATH {
            return Err(BackendError::InvalidPath(path.to_string()));
        }
        let mut node = self.require(path)?;
        node.properties.insert(key.to_string(), value.to_string());
        self.pending.insert(path.to_string(), Some(node));
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<usize, BackendError> {
        if path == ROOT_PATH {
            return Err(BackendError::InvalidPath(path.to_string()));
        }
        self.require(path)?;
        let mut doomed = self.descendants(path)?;
        doomed.push(path.to_string());
        for p in &doomed {
            self.pending.insert(p.clone(), None);
        }
        Ok(doomed.len())
    }

    fn save(&mut self) -> Result<(), BackendError> {
        for (path, change) in std::mem::take(&mut self.pending) {
            match change {
                Some(node) => self.store.store(&node)?,
                None => self.store.delete(&path)?,
            }
        }
        Ok(())
    }

    fn export(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        if !self.capabilities.import_export {
            return Err(self.unsupported("export"));
        }
        self.require(path)?;
        let base = parent_path(path).unwrap_or(ROOT_PATH).trim_end_matches('/');
        let mut paths = Vec::new();
        if path != ROOT_PATH {
            paths.push(path.to_string());
        }
        paths.extend(self.descendants(path)?);
        let mut nodes = Vec::new();
        for p in paths {
            if let Some(mut node) = self.lookup(&p)? {
                node.path = node.path[base.len()..].to_string();
                nodes.push(node);
            }
        }
        serde_json::to_vec(&ExportDocument { nodes })
            .map_err(|e| BackendError::Encoding(e.to_string()))
    }

    fn import(&mut self, parent: &str, data: &[u8]) -> Result<usize, BackendError> {
        if !self.capabilities.import_export {
            return Err(self.unsupported("import"));
        }
        self.require(parent)?;
        let doc: ExportDocument =
            serde_json::from_slice(data).map_err(|e| BackendError::Encoding(e.to_string()))?;
        let base = parent.trim_end_matches('/');
        let count = doc.nodes.len();
        for mut node in doc.nodes {
            node.path = format!("{base}{}", node.path);
            validate_path(&node.path)?;
            self.pending.insert(node.path.clone(), Some(node));
        }
        Ok(count)
    }

    fn logout(self: Box<Self>) -> Result<(), BackendError> {
        Ok(())
    }
}
