use std::sync::Arc;

use anyhow::{ensure, Context};

use super::{clean_tree, fill_tree, fixture_rng, tree_size};
use crate::backend::{child_path, Connection, Session, ROOT_PATH};
use crate::suite::{always_compatible, Suite, SuiteDescriptor};

const ROOT_NODE: &str = "traverse";
const TREE_WIDTH: usize = 5;
const TREE_DEPTH: usize = 4;

/// Walks a fixed tree depth-first and reads every node's properties.
pub struct TreeTraversalSuite {
    connection: Arc<dyn Connection>,
    session: Option<Box<dyn Session>>,
}

pub fn descriptor() -> SuiteDescriptor {
    SuiteDescriptor::new(
        "TreeTraversalSuite",
        module_path!(),
        always_compatible,
        TreeTraversalSuite::boxed,
    )
}

impl TreeTraversalSuite {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            session: None,
        }
    }

    fn boxed(connection: Arc<dyn Connection>) -> Box<dyn Suite> {
        Box::new(Self::new(connection))
    }
}

/// Visits `root` and everything below it; returns how many nodes were seen.
fn walk(session: &dyn Session, root: &str) -> anyhow::Result<usize> {
    let mut stack = vec![root.to_string()];
    let mut visited = 0;
    while let Some(path) = stack.pop() {
        let node = session
            .node(&path)?
            .with_context(|| format!("{path} listed but missing"))?;
        ensure!(
            node.properties.len() <= 2,
            "{path} has unexpected properties"
        );
        visited += 1;
        // Reverse so the leftmost child is visited first.
        stack.extend(session.children(&path)?.into_iter().rev());
    }
    Ok(visited)
}

impl Suite for TreeTraversalSuite {
    fn before_suite(&mut self) -> anyhow::Result<()> {
        let mut session = self.connection.login()?;
        fill_tree(
            session.as_mut(),
            ROOT_NODE,
            TREE_WIDTH,
            TREE_DEPTH,
            &mut fixture_rng(),
        )?;
        session.save()?;
        self.session = Some(session);
        Ok(())
    }

    fn run_test(&mut self) -> anyhow::Result<()> {
        let session = self.session.as_ref().context("session not open")?;
        let root = child_path(ROOT_PATH, ROOT_NODE)?;
        let visited = walk(session.as_ref(), &root)?;
        let expected = tree_size(TREE_WIDTH, TREE_DEPTH) + 1;
        ensure!(visited == expected, "visited {visited} nodes, expected {expected}");
        Ok(())
    }

    fn after_suite(&mut self) -> anyhow::Result<()> {
        if let Some(mut session) = self.session.take() {
            clean_tree(session.as_mut(), ROOT_NODE)?;
            session.logout()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ConnectParams, ConnectionFactory, MemoryFactory};

    #[test]
    fn test_walk_counts_every_node() {
        let conn = MemoryFactory::default().connect(&ConnectParams::new()).unwrap();
        let mut session = conn.login().unwrap();
        fill_tree(session.as_mut(), "w", 2, 3, &mut fixture_rng()).unwrap();
        session.save().unwrap();
        assert_eq!(walk(session.as_ref(), "/w").unwrap(), 1 + 2 + 4 + 8);
    }

    #[test]
    fn test_lifecycle() {
        let conn = MemoryFactory::default().connect(&ConnectParams::new()).unwrap();
        let mut suite = TreeTraversalSuite::new(Arc::clone(&conn));
        suite.before_suite().unwrap();
        suite.run_test().unwrap();
        suite.after_suite().unwrap();
        assert!(!conn.login().unwrap().exists("/traverse").unwrap());
    }

    #[test]
    fn test_walk_missing_root_fails() {
        let conn = MemoryFactory::default().connect(&ConnectParams::new()).unwrap();
        let session = conn.login().unwrap();
        assert!(walk(session.as_ref(), "/absent").is_err());
    }
}
