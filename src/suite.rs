use std::fmt;
use std::sync::Arc;

use crate::backend::Connection;

/// A repeatable workload. One instance is built per backend, so fixtures
/// created in `before_suite` are never shared with another backend or suite.
pub trait Suite {
    fn before_suite(&mut self) -> anyhow::Result<()>;

    /// The timed unit of work.
    fn run_test(&mut self) -> anyhow::Result<()>;

    /// Must release everything `before_suite` acquired, even if `run_test`
    /// failed.
    fn after_suite(&mut self) -> anyhow::Result<()>;
}

pub type SuiteConstructor = fn(Arc<dyn Connection>) -> Box<dyn Suite>;
pub type CompatibilityCheck = fn(&dyn Connection) -> bool;

/// Registration record for a suite.
#[derive(Clone)]
pub struct SuiteDescriptor {
    /// Operation name used in timings and reports. Also the simple name
    /// matched by include/exclude patterns.
    pub name: &'static str,
    /// Module path of the implementing type; the qualified name is
    /// `{module}::{name}`.
    pub module: &'static str,
    pub is_compatible: CompatibilityCheck,
    pub construct: SuiteConstructor,
}

impl SuiteDescriptor {
    pub fn new(
        name: &'static str,
        module: &'static str,
        is_compatible: CompatibilityCheck,
        construct: SuiteConstructor,
    ) -> Self {
        Self {
            name,
            module,
            is_compatible,
            construct,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }
}

impl fmt::Debug for SuiteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteDescriptor")
            .field("name", &self.name)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Compatibility predicate for suites that run on any backend.
pub fn always_compatible(_: &dyn Connection) -> bool {
    true
}

/// Suites known to the runner, in registration order.
#[derive(Clone, Debug, Default)]
pub struct SuiteRegistry {
    suites: Vec<SuiteDescriptor>,
}

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled workloads.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::suites::register_all(&mut registry);
        registry
    }

    /// Adds a suite. A later registration under an existing name replaces it
    /// in place, keeping its earlier position.
    pub fn register(&mut self, descriptor: SuiteDescriptor) -> &mut Self {
        match self.suites.iter_mut().find(|d| d.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.suites.push(descriptor),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &SuiteDescriptor> {
        self.suites.iter()
    }

    pub fn get(&self, name: &str) -> Option<&SuiteDescriptor> {
        self.suites.iter().find(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Suite for Noop {
        fn before_suite(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn run_test(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn after_suite(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn noop(_: Arc<dyn Connection>) -> Box<dyn Suite> {
        Box::new(Noop)
    }

    #[test]
    fn test_registration_order_is_kept() {
        let mut registry = SuiteRegistry::new();
        registry
            .register(SuiteDescriptor::new("B", "t", always_compatible, noop))
            .register(SuiteDescriptor::new("A", "t", always_compatible, noop))
            .register(SuiteDescriptor::new("B", "u", always_compatible, noop));

        let names: Vec<_> = registry.iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(registry.get("B").unwrap().qualified_name(), "u::B");
    }

    #[test]
    fn test_builtin_registry_is_populated() {
        let registry = SuiteRegistry::builtin();
        assert!(!registry.is_empty());
        assert!(registry.get("NodeCrudSuite").is_some());
    }
}
