use std::fs;
use std::io::Write;
use std::sync::Arc;

use anyhow::{ensure, Context};
use tempfile::NamedTempFile;

use super::{clean_tree, fill_tree, fixture_rng};
use crate::backend::{child_path, Connection, Session, ROOT_PATH};
use crate::suite::{Suite, SuiteDescriptor};

const ROOT_NODE: &str = "start";
const TREE_WIDTH: usize = 6;
const TREE_DEPTH: usize = 3;

/// Imports a previously exported tree from a file on every iteration, then
/// wipes it again so the next import starts from the same state.
pub struct TreeImportSuite {
    connection: Arc<dyn Connection>,
    session: Option<Box<dyn Session>>,
    export: Option<NamedTempFile>,
    expected_nodes: usize,
}

pub fn descriptor() -> SuiteDescriptor {
    SuiteDescriptor::new(
        "TreeImportSuite",
        module_path!(),
        supports_import_export,
        TreeImportSuite::boxed,
    )
}

fn supports_import_export(connection: &dyn Connection) -> bool {
    connection.capabilities().import_export
}

impl TreeImportSuite {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            session: None,
            export: None,
            expected_nodes: 0,
        }
    }

    fn boxed(connection: Arc<dyn Connection>) -> Box<dyn Suite> {
        Box::new(Self::new(connection))
    }
}

impl Suite for TreeImportSuite {
    fn before_suite(&mut self) -> anyhow::Result<()> {
        let mut session = self.connection.login()?;
        let mut rng = fixture_rng();
        let created = fill_tree(session.as_mut(), ROOT_NODE, TREE_WIDTH, TREE_DEPTH, &mut rng)?;
        session.save()?;

        let data = session.export(&child_path(ROOT_PATH, ROOT_NODE)?)?;
        let mut file = NamedTempFile::new().context("creating export file")?;
        file.write_all(&data)?;
        file.flush()?;

        clean_tree(session.as_mut(), ROOT_NODE)?;

        // The export includes `/start` itself.
        self.expected_nodes = created + 1;
        self.export = Some(file);
        self.session = Some(session);
        Ok(())
    }

    fn run_test(&mut self) -> anyhow::Result<()> {
        let session = self.session.as_mut().context("session not open")?;
        let file = self.export.as_ref().context("export file missing")?;

        let data = fs::read(file.path())?;
        let imported = session.import(ROOT_PATH, &data)?;
        session.save()?;
        ensure!(
            imported == self.expected_nodes,
            "imported {imported} nodes, expected {}",
            self.expected_nodes
        );

        clean_tree(session.as_mut(), ROOT_NODE)?;
        Ok(())
    }

    fn after_suite(&mut self) -> anyhow::Result<()> {
        // Dropping the handle deletes the export file.
        self.export.take();
        if let Some(mut session) = self.session.take() {
            clean_tree(session.as_mut(), ROOT_NODE)?;
            session.save()?;
            session.logout()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ConnectParams, ConnectionFactory, FsFactory, MemoryFactory};
    use crate::suites::tree_size;

    #[test]
    fn test_import_roundtrip_memory() {
        let conn = MemoryFactory::default().connect(&ConnectParams::new()).unwrap();
        assert!((descriptor().is_compatible)(conn.as_ref()));

        let mut suite = TreeImportSuite::new(Arc::clone(&conn));
        suite.before_suite().unwrap();
        assert_eq!(suite.expected_nodes, tree_size(TREE_WIDTH, TREE_DEPTH) + 1);
        let export_path = suite.export.as_ref().unwrap().path().to_path_buf();
        assert!(export_path.exists());

        suite.run_test().unwrap();
        suite.run_test().unwrap();
        suite.after_suite().unwrap();

        assert!(!export_path.exists());
        assert!(!conn.login().unwrap().exists("/start").unwrap());
    }

    #[test]
    fn test_import_roundtrip_fs() {
        let conn = FsFactory::default().connect(&ConnectParams::new()).unwrap();
        let mut suite = TreeImportSuite::new(conn);
        suite.before_suite().unwrap();
        suite.run_test().unwrap();
        suite.after_suite().unwrap();
    }
}
