//! Include/exclude selection of suites by regular expression.
//!
//! Patterns match the whole name, never a substring: `Foo` does not select
//! `FooSuite`, `Foo.*` does. A candidate is tested against both its simple
//! name and its qualified name. Exclusion always wins over inclusion.

use regex::Regex;
use tracing::warn;

/// A configured pattern after compilation.
#[derive(Clone, Debug)]
pub enum Pattern {
    Valid(Regex),
    Invalid { source: String, reason: String },
}

impl Pattern {
    pub fn compile(source: &str) -> Self {
        // Anchor so `is_match` behaves as a whole-string match.
        match Regex::new(&format!("^(?:{source})$")) {
            Ok(re) => Pattern::Valid(re),
            Err(e) => Pattern::Invalid {
                source: source.to_string(),
                reason: e.to_string(),
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Pattern::Valid(_))
    }
}

#[derive(Clone, Debug, Default)]
pub struct PatternFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    rejected: Vec<String>,
}

impl PatternFilter {
    /// Compiles both lists eagerly. Invalid patterns are reported once and
    /// dropped, so they behave as if they never match.
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut rejected = Vec::new();
        let include = compile_list("tests.include", include, &mut rejected);
        let exclude = compile_list("tests.exclude", exclude, &mut rejected);
        Self {
            include,
            exclude,
            rejected,
        }
    }

    /// A filter that lets every candidate through.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_included(&self, simple_name: &str, qualified_name: &str) -> bool {
        if matches_any(&self.exclude, simple_name, qualified_name) {
            return false;
        }
        self.include.is_empty() || matches_any(&self.include, simple_name, qualified_name)
    }

    /// Source text of the patterns that failed to compile.
    pub fn rejected_patterns(&self) -> &[String] {
        &self.rejected
    }

    pub fn include_count(&self) -> usize {
        self.include.len()
    }

    pub fn exclude_count(&self) -> usize {
        self.exclude.len()
    }
}

fn compile_list<P, S>(list: &str, patterns: P, rejected: &mut Vec<String>) -> Vec<Regex>
where
    P: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    for raw in patterns {
        match Pattern::compile(raw.as_ref()) {
            Pattern::Valid(re) => out.push(re),
            Pattern::Invalid { source, reason } => {
                warn!(list, pattern = %source, %reason, "invalid regex, ignoring it");
                rejected.push(source);
            }
        }
    }
    out
}

fn matches_any(patterns: &[Regex], simple_name: &str, qualified_name: &str) -> bool {
    patterns
        .iter()
        .any(|re| re.is_match(simple_name) || re.is_match(qualified_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: [&str; 0] = [];

    fn included(filter: &PatternFilter, name: &str) -> bool {
        filter.is_included(name, &format!("repobench::suites::{name}"))
    }

    #[test]
    fn test_exclude_only() {
        let filter = PatternFilter::new(EMPTY, ["FooSuite"]);
        assert!(!included(&filter, "FooSuite"));
        assert!(included(&filter, "BarSuite"));
    }

    #[test]
    fn test_include_only() {
        let filter = PatternFilter::new(["Foo.*"], EMPTY);
        assert!(included(&filter, "FooSuite"));
        assert!(!included(&filter, "BarSuite"));
    }

    #[test]
    fn test_exclude_has_priority() {
        let filter = PatternFilter::new([".*Suite"], ["Foo.*"]);
        assert!(!included(&filter, "FooSuite"));
        assert!(included(&filter, "BarSuite"));
    }

    #[test]
    fn test_whole_string_match() {
        let filter = PatternFilter::new(["Foo"], EMPTY);
        assert!(!included(&filter, "FooSuite"));
        assert!(!included(&filter, "MyFoo"));
        assert!(included(&filter, "Foo"));
    }

    #[test]
    fn test_qualified_name_matches() {
        let filter = PatternFilter::new(EMPTY, ["repobench::suites::.*"]);
        assert!(!included(&filter, "AnySuite"));
        assert!(filter.is_included("AnySuite", "other::AnySuite"));
    }

    #[test]
    fn test_invalid_pattern_is_dropped() {
        let filter = PatternFilter::new(["Foo(", "Bar.*"], ["[unclosed"]);
        assert_eq!(filter.rejected_patterns(), ["Foo(", "[unclosed"]);
        assert_eq!(filter.include_count(), 1);
        assert_eq!(filter.exclude_count(), 0);
        assert!(included(&filter, "BarSuite"));
        assert!(!included(&filter, "FooSuite"));
    }

    #[test]
    fn test_all_includes_invalid_means_include_everything() {
        let filter = PatternFilter::new(["("], EMPTY);
        assert!(included(&filter, "FooSuite"));
    }

    #[test]
    fn test_pattern_compile_variants() {
        assert!(Pattern::compile("a+b").is_valid());
        assert!(!Pattern::compile("a(").is_valid());
    }
}
