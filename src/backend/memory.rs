//! Process-local backend over an ordered map. Every `connect` starts empty.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use super::{
    descendants_start, is_below, Capabilities, ConnectParams, Connection, ConnectionFactory, Node, NodeStore,
    StoreConnection,
};
use crate::error::BackendError;

#[derive(Debug, Default)]
struct MemoryStore {
    nodes: Mutex<BTreeMap<String, Node>>,
}

impl MemoryStore {
    fn nodes(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Node>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NodeStore for MemoryStore {
    fn load(&self, path: &str) -> Result<Option<Node>, BackendError> {
        Ok(self.nodes().get(path).cloned())
    }

    fn store(&self, node: &Node) -> Result<(), BackendError> {
        self.nodes().insert(node.path.clone(), node.clone());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), BackendError> {
        self.nodes().remove(path);
        Ok(())
    }

    fn descendants(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let nodes = self.nodes();
        let range = nodes.range::<String, _>((descendants_start(path), Bound::Unbounded));
        Ok(range
            .map(|(p, _)| p)
            .take_while(|p| is_below(p, path))
            .cloned()
            .collect())
    }
}

#[derive(Clone, Debug)]
pub struct MemoryFactory {
    name: String,
}

impl MemoryFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for MemoryFactory {
    fn default() -> Self {
        Self::new("In Memory")
    }
}

impl ConnectionFactory for MemoryFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, _params: &ConnectParams) -> Result<Arc<dyn Connection>, BackendError> {
        let capabilities = Capabilities {
            import_export: true,
            persistent: false,
        };
        Ok(Arc::new(StoreConnection::new(
            self.name.clone(),
            capabilities,
            MemoryStore::default(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_add_save_and_read_back() {
        let conn = MemoryFactory::default().connect(&ConnectParams::new()).unwrap();
        conn.verify().unwrap();

        let mut session = conn.login().unwrap();
        let a = session.add_node("/", "a", props(&[("k", "v")])).unwrap();
        session.add_node(&a, "b", BTreeMap::new()).unwrap();
        session.save().unwrap();
        session.logout().unwrap();

        let session = conn.login().unwrap();
        let node = session.node("/a").unwrap().unwrap();
        assert_eq!(node.properties["k"], "v");
        assert_eq!(session.children("/a").unwrap(), vec!["/a/b"]);
        assert_eq!(session.children("/").unwrap(), vec!["/a"]);
    }

    #[test]
    fn test_unsaved_changes_discarded_on_logout() {
        let conn = MemoryFactory::default().connect(&ConnectParams::new()).unwrap();
        let mut session = conn.login().unwrap();
        session.add_node("/", "tmp", BTreeMap::new()).unwrap();
        session.logout().unwrap();

        let session = conn.login().unwrap();
        assert!(!session.exists("/tmp").unwrap());
    }

    #[test]
    fn test_remove_subtree() {
        let conn = MemoryFactory::default().connect(&ConnectParams::new()).unwrap();
        let mut session = conn.login().unwrap();
        session.add_node("/", "a", BTreeMap::new()).unwrap();
        session.add_node("/a", "b", BTreeMap::new()).unwrap();
        session.add_node("/a/b", "c", BTreeMap::new()).unwrap();
        session.add_node("/", "ab", BTreeMap::new()).unwrap();
        session.save().unwrap();

        assert_eq!(session.remove("/a").unwrap(), 3);
        session.save().unwrap();
        assert!(!session.exists("/a/b/c").unwrap());
        assert!(session.exists("/ab").unwrap());
    }

    #[test]
    fn test_missing_parent_and_duplicates() {
        let conn = MemoryFactory::default().connect(&ConnectParams::new()).unwrap();
        let mut session = conn.login().unwrap();
        assert!(matches!(
            session.add_node("/nope", "x", BTreeMap::new()),
            Err(BackendError::MissingParent(_))
        ));
        session.add_node("/", "x", BTreeMap::new()).unwrap();
        assert!(matches!(
            session.add_node("/", "x", BTreeMap::new()),
            Err(BackendError::NodeExists(_))
        ));
    }

    #[test]
    fn test_export_import_roundtrip() {
        let conn = MemoryFactory::default().connect(&ConnectParams::new()).unwrap();
        let mut session = conn.login().unwrap();
        session.add_node("/", "src", BTreeMap::new()).unwrap();
        session.add_node("/src", "one", props(&[("n", "1")])).unwrap();
        session.add_node("/src/one", "two", BTreeMap::new()).unwrap();
        session.add_node("/", "dst", BTreeMap::new()).unwrap();
        session.save().unwrap();

        let data = session.export("/src").unwrap();
        assert_eq!(session.import("/dst", &data).unwrap(), 3);
        session.save().unwrap();

        assert_eq!(
            session.node("/dst/src/one").unwrap().unwrap().properties["n"],
            "1"
        );
        assert!(session.exists("/dst/src/one/two").unwrap());
        assert!(session.exists("/src/one/two").unwrap());
    }

    fn store_with(paths: &[&str]) -> MemoryStore {
        let store = MemoryStore::default();
        for path in paths {
            store.store(&Node::new(*path)).unwrap();
        }
        store
    }

    #[test]
    fn test_descendants_skip_prefix_siblings() {
        let store = store_with(&["/a", "/a b", "/a-b", "/a.x", "/a/x", "/a/x/y", "/ab", "/b"]);
        assert_eq!(store.descendants("/a").unwrap(), vec!["/a/x", "/a/x/y"]);
        assert_eq!(store.descendants("/a/x").unwrap(), vec!["/a/x/y"]);
        assert!(store.descendants("/a/x/y").unwrap().is_empty());
        assert!(store.descendants("/a-b").unwrap().is_empty());
        assert_eq!(store.descendants("/").unwrap().len(), 8);
    }

    #[test]
    fn test_each_connect_is_fresh() {
        let factory = MemoryFactory::default();
        let first = factory.connect(&ConnectParams::new()).unwrap();
        let mut session = first.login().unwrap();
        session.add_node("/", "a", BTreeMap::new()).unwrap();
        session.save().unwrap();

        let second = factory.connect(&ConnectParams::new()).unwrap();
        assert!(!second.login().unwrap().exists("/a").unwrap());
    }
}
