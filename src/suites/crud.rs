use std::sync::Arc;

use anyhow::{ensure, Context};
use rand_chacha::ChaCha8Rng;

use super::{clean_tree, fixture_rng, random_properties};
use crate::backend::{child_path, Connection, Session, ROOT_PATH};
use crate::suite::{always_compatible, Suite, SuiteDescriptor};

const ROOT_NODE: &str = "crud";
const NODE_COUNT: usize = 200;
const PROPERTIES_PER_NODE: usize = 4;

/// Creates, reads back and deletes a flat batch of nodes per iteration.
pub struct NodeCrudSuite {
    connection: Arc<dyn Connection>,
    session: Option<Box<dyn Session>>,
    rng: ChaCha8Rng,
}

pub fn descriptor() -> SuiteDescriptor {
    SuiteDescriptor::new(
        "NodeCrudSuite",
        module_path!(),
        always_compatible,
        NodeCrudSuite::boxed,
    )
}

impl NodeCrudSuite {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            session: None,
            rng: fixture_rng(),
        }
    }

    fn boxed(connection: Arc<dyn Connection>) -> Box<dyn Suite> {
        Box::new(Self::new(connection))
    }
}

impl Suite for NodeCrudSuite {
    fn before_suite(&mut self) -> anyhow::Result<()> {
        let mut session = self.connection.login()?;
        clean_tree(session.as_mut(), ROOT_NODE)?;
        session.add_node(ROOT_PATH, ROOT_NODE, Default::default())?;
        session.save()?;
        self.session = Some(session);
        Ok(())
    }

    fn run_test(&mut self) -> anyhow::Result<()> {
        let session = self.session.as_mut().context("session not open")?;
        let root = child_path(ROOT_PATH, ROOT_NODE)?;

        let mut written = Vec::with_capacity(NODE_COUNT);
        for i in 0..NODE_COUNT {
            let props = random_properties(&mut self.rng, PROPERTIES_PER_NODE);
            let path = session.add_node(&root, &format!("item-{i:04}"), props.clone())?;
            written.push((path, props));
        }
        session.save()?;

        for (path, props) in &written {
            let node = session
                .node(path)?
                .with_context(|| format!("{path} vanished after save"))?;
            ensure!(&node.properties == props, "{path} read back different properties");
        }

        for (path, _) in &written {
            session.remove(path)?;
        }
        session.save()?;
        ensure!(session.children(&root)?.is_empty(), "{root} not empty after delete");
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
