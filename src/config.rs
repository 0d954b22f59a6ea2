//! Runner configuration.
//!
//! Settings come from a TOML runner file whose dotted keys mirror the
//! classic property names (`repeat.count`, `warmup.count`, `tests.include`,
//! `tests.exclude`), with command-line flags applied on top. The result is an
//! immutable [`BenchmarkConfig`] built once per run.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::filter::PatternFilter;

pub const DEFAULT_REPEAT_COUNT: u32 = 1;
pub const DEFAULT_WARMUP_COUNT: u32 = 1;
pub const DEFAULT_CONFIG_FILE: &str = "repobench.toml";

/// What a lifecycle hook is told about the suite it wraps.
#[derive(Clone, Copy, Debug)]
pub struct HookContext<'a> {
    pub suite: &'a str,
    pub backend: &'a str,
}

pub type SuiteHook = Arc<dyn Fn(&HookContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Immutable settings for one run.
#[derive(Clone)]
pub struct BenchmarkConfig {
    repeat_count: u32,
    warmup_count: u32,
    filter: PatternFilter,
    before_suite: Vec<SuiteHook>,
    after_suite: Vec<SuiteHook>,
}

impl BenchmarkConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn warmup_count(&self) -> u32 {
        self.warmup_count
    }

    pub fn filter(&self) -> &PatternFilter {
        &self.filter
    }

    /// Runs before-suite hooks in registration order, stopping at the first
    /// failure.
    pub fn run_before_suite(&self, ctx: &HookContext<'_>) -> anyhow::Result<()> {
        self.before_suite.iter().try_for_each(|hook| hook(ctx))
    }

    /// Runs every after-suite hook in reverse registration order and returns
    /// the first failure.
    pub fn run_after_suite(&self, ctx: &HookContext<'_>) -> anyhow::Result<()> {
        let mut first_error = None;
        for hook in self.after_suite.iter().rev() {
            if let Err(e) = hook(ctx) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            repeat_count: DEFAULT_REPEAT_COUNT,
            warmup_count: DEFAULT_WARMUP_COUNT,
            filter: PatternFilter::allow_all(),
            before_suite: Vec::new(),
            after_suite: Vec::new(),
        }
    }
}

impl fmt::Debug for BenchmarkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkConfig")
            .field("repeat_count", &self.repeat_count)
            .field("warmup_count", &self.warmup_count)
            .field("filter", &self.filter)
            .field("before_suite", &self.before_suite.len())
            .field("after_suite", &self.after_suite.len())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct ConfigBuilder {
    repeat_count: Option<u32>,
    warmup_count: Option<u32>,
    include: Vec<String>,
    exclude: Vec<String>,
    before_suite: Vec<SuiteHook>,
    after_suite: Vec<SuiteHook>,
}

impl ConfigBuilder {
    pub fn repeat_count(mut self, n: u32) -> Self {
        self.repeat_count = Some(n);
        self
    }

    pub fn warmup_count(mut self, n: u32) -> Self {
        self.warmup_count = Some(n);
        self
    }

    pub fn include<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.include.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn exclude<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Adds a hook; earlier hooks stay registered and run first.
    pub fn before_suite(
        mut self,
        hook: impl Fn(&HookContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.before_suite.push(Arc::new(hook));
        self
    }

    /// Adds a hook; it runs before the after-suite hooks added earlier.
    pub fn after_suite(
        mut self,
        hook: impl Fn(&HookContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.after_suite.push(Arc::new(hook));
        self
    }

    /// Installs hooks that recreate each directory empty before every suite
    /// and delete it afterwards.
    pub fn scratch_dirs(self, dirs: Vec<PathBuf>) -> Self {
        if dirs.is_empty() {
            return self;
        }
        let before = dirs.clone();
        self.before_suite(move |ctx| {
            for dir in &before {
                remove_dir_if_present(dir)?;
                fs::create_dir_all(dir)?;
                debug!(suite = ctx.suite, dir = %dir.display(), "created scratch dir");
            }
            Ok(())
        })
        .after_suite(move |_| {
            for dir in &dirs {
                remove_dir_if_present(dir)?;
            }
            Ok(())
        })
    }

    pub fn build(self) -> Result<BenchmarkConfig, ConfigError> {
        let repeat_count = self.repeat_count.unwrap_or(DEFAULT_REPEAT_COUNT);
        if repeat_count == 0 {
            return Err(ConfigError::ZeroRepeat(repeat_count));
        }
        Ok(BenchmarkConfig {
            repeat_count,
            warmup_count: self.warmup_count.unwrap_or(DEFAULT_WARMUP_COUNT),
            filter: PatternFilter::new(&self.include, &self.exclude),
            before_suite: self.before_suite,
            after_suite: self.after_suite,
        })
    }
}

fn remove_dir_if_present(dir: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Comma-separated string or TOML array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ValueList {
    Csv(String),
    List(Vec<String>),
}

impl Default for ValueList {
    fn default() -> Self {
        ValueList::List(Vec::new())
    }
}

impl ValueList {
    /// Trimmed, non-empty entries.
    pub fn values(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            ValueList::Csv(s) => s.split(',').collect(),
            ValueList::List(v) => v.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountSection {
    #[serde(default = "default_count")]
    pub count: u32,
}

impl Default for CountSection {
    fn default() -> Self {
        Self {
            count: default_count(),
        }
    }
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestsSection {
    #[serde(default)]
    pub include: ValueList,
    /// Takes precedence over `include`.
    #[serde(default)]
    pub exclude: ValueList,
    /// Scratch directories recreated around every suite.
    #[serde(default)]
    pub dirs: ValueList,
    /// Label printed at the top of reports.
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputSection {
    /// Where run artifacts are written and aggregated from.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            report_dir: default_report_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("target/repobench/data")
}
fn default_report_dir() -> PathBuf {
    PathBuf::from("target/repobench/reports")
}

/// On-disk runner file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerFile {
    #[serde(default)]
    pub repeat: CountSection,
    #[serde(default)]
    pub warmup: CountSection,
    #[serde(default)]
    pub tests: TestsSection,
    #[serde(default)]
    pub output: OutputSection,
}

impl RunnerFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Walks up from the current directory looking for `repobench.toml`.
    pub fn discover() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let candidate = dir.join(DEFAULT_CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    pub fn to_builder(&self) -> ConfigBuilder {
        BenchmarkConfig::builder()
            .repeat_count(self.repeat.count)
            .warmup_count(self.warmup.count)
            .include(self.tests.include.values())
            .exclude(self.tests.exclude.values())
            .scratch_dirs(self.tests.dirs.values().into_iter().map(PathBuf::from).collect())
    }

    pub fn default_toml() -> String {
        r#"# repobench runner configuration

# Measured iterations per suite (at least 1)
repeat.count = 5
# Unrecorded iterations before measuring
warmup.count = 1

# Whole-name regular expressions, comma separated or as an array.
# Excludes take precedence over includes; an empty include list runs everything.
tests.include = ""
tests.exclude = ""
# Directories recreated empty before each suite and removed afterwards
tests.dirs = ""
# tests.description = "nightly comparison"

[output]
data_dir = "target/repobench/data"
report_dir = "target/repobench/reports"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let cfg = BenchmarkConfig::default();
        assert_eq!(cfg.repeat_count(), 1);
        assert_eq!(cfg.warmup_count(), 1);
        assert!(cfg.filter().is_included("AnySuite", "x::AnySuite"));
    }

    #[test]
    fn test_zero_repeat_rejected() {
        let err = BenchmarkConfig::builder().repeat_count(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::ZeroRepeat(0)));
    }

    #[test]
    fn test_parse_dotted_keys() {
        let file: RunnerFile = toml::from_str(
            r#"
            repeat.count = 7
            warmup.count = 0
            tests.include = "Node.*, Tree.*"
            tests.exclude = ["TreeTraversalSuite"]
            "#,
        )
        .unwrap();

        assert_eq!(file.repeat.count, 7);
        assert_eq!(file.warmup.count, 0);
        assert_eq!(file.tests.include.values(), vec!["Node.*", "Tree.*"]);
        assert_eq!(file.tests.exclude.values(), vec!["TreeTraversalSuite"]);
        assert_eq!(file.output, OutputSection::default());

        let cfg = file.to_builder().build().unwrap();
        assert_eq!(cfg.repeat_count(), 7);
        assert!(cfg.filter().is_included("NodeCrudSuite", "m::NodeCrudSuite"));
        assert!(!cfg.filter().is_included("TreeTraversalSuite", "m::TreeTraversalSuite"));
        assert!(!cfg.filter().is_included("ImportSuite", "m::ImportSuite"));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let file: RunnerFile = toml::from_str("").unwrap();
        assert_eq!(file.repeat.count, 1);
        assert_eq!(file.warmup.count, 1);
        assert!(file.tests.include.values().is_empty());
    }

    #[test]
    fn test_default_toml_parses() {
        let file: RunnerFile = toml::from_str(&RunnerFile::default_toml()).unwrap();
        assert_eq!(file.repeat.count, 5);
        assert!(file.tests.dirs.values().is_empty());
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "repeat.count = \"many\"").unwrap();
        let err = RunnerFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_scratch_dir_hooks() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("work");
        let cfg = BenchmarkConfig::builder()
            .scratch_dirs(vec![scratch.clone()])
            .build()
            .unwrap();
        let ctx = HookContext {
            suite: "S",
            backend: "b",
        };

        cfg.run_before_suite(&ctx).unwrap();
        assert!(scratch.is_dir());
        fs::write(scratch.join("leftover"), b"x").unwrap();
        cfg.run_before_suite(&ctx).unwrap();
        assert!(!scratch.join("leftover").exists());
        cfg.run_after_suite(&ctx).unwrap();
        assert!(!scratch.exists());
    }

    #[test]
    fn test_scratch_dirs_keep_other_hooks() {
        use std::sync::Mutex;

        let dir = tempdir().unwrap();
        let scratch = dir.path().join("work");
        let log = Arc::new(Mutex::new(Vec::new()));
        let (before_log, after_log) = (Arc::clone(&log), Arc::clone(&log));
        let created = scratch.clone();

        let cfg = BenchmarkConfig::builder()
            .before_suite(move |_| {
                before_log.lock().unwrap().push("user before");
                Ok(())
            })
            .after_suite(move |_| {
                after_log.lock().unwrap().push("user after");
                Ok(())
            })
            .scratch_dirs(vec![scratch.clone()])
            .before_suite(move |_| {
                anyhow::ensure!(created.is_dir(), "scratch dir missing");
                Ok(())
            })
            .build()
            .unwrap();
        let ctx = HookContext {
            suite: "S",
            backend: "b",
        };

        cfg.run_before_suite(&ctx).unwrap();
        assert!(scratch.is_dir());
        cfg.run_after_suite(&ctx).unwrap();
        assert!(!scratch.exists());
        assert_eq!(*log.lock().unwrap(), vec!["user before", "user after"]);
    }

    #[test]
    fn test_after_hooks_all_run_on_failure() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cfg = BenchmarkConfig::builder()
            .after_suite(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .after_suite(|_| anyhow::bail!("cleanup failed"))
            .build()
            .unwrap();
        let ctx = HookContext {
            suite: "S",
            backend: "b",
        };

        let err = cfg.run_after_suite(&ctx).unwrap_err();
        assert!(err.to_string().contains("cleanup failed"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
