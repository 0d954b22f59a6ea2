//! Bundled workloads. Each suite builds its own fixture tree under a
//! dedicated top-level node and removes it in `after_suite`.

pub mod crud;
pub mod import;
pub mod traversal;

use std::collections::BTreeMap;

use anyhow::Context;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::backend::{child_path, Session, ROOT_PATH};
use crate::suite::SuiteRegistry;

pub use crud::NodeCrudSuite;
pub use import::TreeImportSuite;
pub use traversal::TreeTraversalSuite;

/// Seed for fixture content so every backend sees identical data.
pub const FIXTURE_SEED: u64 = 0x5eed_0f_7ee5;

pub fn register_all(registry: &mut SuiteRegistry) {
    registry
        .register(crud::descriptor())
        .register(import::descriptor())
        .register(traversal::descriptor());
}

pub(crate) fn fixture_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(FIXTURE_SEED)
}

pub(crate) fn random_properties(rng: &mut ChaCha8Rng, count: usize) -> BTreeMap<String, String> {
    (0..count)
        .map(|i| (format!("p{i}"), format!("{:016x}", rng.gen::<u64>())))
        .collect()
}

/// Number of nodes in a full tree of `width` children per level and
/// `depth` levels, not counting the root.
pub(crate) fn tree_size(width: usize, depth: usize) -> usize {
    (1..=depth).map(|level| width.pow(level as u32)).sum()
}

/// Replaces `/{root}` with a fresh tree and returns the number of nodes
/// created below it. Changes are left unsaved.
pub(crate) fn fill_tree(
    session: &mut dyn Session,
    root: &str,
    width: usize,
    depth: usize,
    rng: &mut ChaCha8Rng,
) -> anyhow::Result<usize> {
    clean_tree(session, root)?;
    let top = session.add_node(ROOT_PATH, root, BTreeMap::new())?;
    let mut created = 0;
    let mut level = vec![top];
    for _ in 0..depth {
        let mut next = Vec::with_capacity(level.len() * width);
        for parent in &level {
            for i in 0..width {
                let path = session.add_node(parent, &format!("node-{i}"), random_properties(rng, 2))?;
                next.push(path);
                created += 1;
            }
        }
        level = next;
    }
    Ok(created)
}

/// Removes `/{root}` if present and saves.
pub(crate) fn clean_tree(session: &mut dyn Session, root: &str) -> anyhow::Result<()> {
    let path = child_path(ROOT_PATH, root)?;
    if session.exists(&path)? {
        session.remove(&path)?;
        session
            .save()
            .with_context(|| format!("saving removal of {path}"))?;
    }
    Ok(())
}
