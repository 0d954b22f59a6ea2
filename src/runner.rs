//! Runs every registered suite against every backend and persists the
//! timings.
//!
//! Backends are processed in the order given; suites in registry order.
//! Nothing that goes wrong inside one suite or one backend stops the run:
//! a failed connection is recorded under [`INITIALIZATION_OPERATION`] and the
//! backend is skipped, a failed hook skips only its suite.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use crate::aggregate::ReportAggregator;
use crate::artifact::{artifact_file_stem, write_run_result_named, ARTIFACT_EXTENSION};
use crate::backend::{ConnectParams, Connection, ConnectionFactory};
use crate::config::{BenchmarkConfig, HookContext};
use crate::error::BenchResult;
use crate::harness::{measure_once, run_guarded, SuiteExecutor, SuiteOutcome};
use crate::recorder::{RunResult, TimingRecorder};
use crate::report::{build_report, write_reports};
use crate::schema::ComparisonReport;
use crate::suite::{SuiteDescriptor, SuiteRegistry};
use crate::{TimeUnit, INITIALIZATION_OPERATION};

/// What happened to one suite on one backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SuiteDisposition {
    Excluded,
    HookFailed(String),
    Incompatible,
    Executed(SuiteOutcome),
}

#[derive(Debug)]
pub struct BackendRun {
    pub result: RunResult,
    /// `None` when the backend could not be reached.
    pub suites: Option<Vec<(String, SuiteDisposition)>>,
}

impl BackendRun {
    pub fn connected(&self) -> bool {
        self.suites.is_some()
    }
}

pub struct Runner {
    config: BenchmarkConfig,
    registry: SuiteRegistry,
}

impl Runner {
    pub fn new(config: BenchmarkConfig, registry: SuiteRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    pub fn registry(&self) -> &SuiteRegistry {
        &self.registry
    }

    pub fn run(
        &self,
        factories: &[Box<dyn ConnectionFactory>],
        params: &ConnectParams,
    ) -> Vec<BackendRun> {
        info!(
            backends = factories.len(),
            suites = self.registry.len(),
            repeat = self.config.repeat_count(),
            warmup = self.config.warmup_count(),
            "starting benchmark run"
        );
        factories
            .iter()
            .map(|factory| self.run_backend(factory.as_ref(), params))
            .collect()
    }

    pub fn run_backend(&self, factory: &dyn ConnectionFactory, params: &ConnectParams) -> BackendRun {
        let backend = factory.name();
        let mut recorder = TimingRecorder::new(backend);

        let (nanos, connected) = measure_once(|| {
            let connection = factory.connect(params)?;
            connection.verify()?;
            Ok(connection)
        });
        let connection = match connected {
            Ok(c) => {
                recorder.record_success(INITIALIZATION_OPERATION, nanos, 1);
                info!(backend, nanos, "backend initialized");
                c
            }
            Err(cause) => {
                error!(backend, %cause, "cannot initialize backend, skipping it");
                recorder.record_failure(INITIALIZATION_OPERATION, cause, 1);
                return BackendRun {
                    result: recorder.into_run_result(),
                    suites: None,
                };
            }
        };

        let suites = self
            .registry
            .iter()
            .map(|descriptor| {
                let disposition = self.run_suite(descriptor, &connection, &mut recorder);
                (descriptor.name.to_string(), disposition)
            })
            .collect();

        BackendRun {
            result: recorder.into_run_result(),
            suites: Some(suites),
        }
    }

    fn run_suite(
        &self,
        descriptor: &SuiteDescriptor,
        connection: &Arc<dyn Connection>,
        recorder: &mut TimingRecorder,
    ) -> SuiteDisposition {
        let backend = connection.backend_name().to_string();
        let suite = descriptor.name;

        if !self
            .config
            .filter()
            .is_included(suite, &descriptor.qualified_name())
        {
            debug!(suite, backend = %backend, "excluded by filter");
            return SuiteDisposition::Excluded;
        }

        let ctx = HookContext {
            suite,
            backend: &backend,
        };
        if let Err(cause) = run_guarded(|| self.config.run_before_suite(&ctx)) {
            warn!(suite, backend = %backend, %cause, "before-suite hook failed, skipping suite");
            return SuiteDisposition::HookFailed(cause);
        }

        let disposition = if (descriptor.is_compatible)(connection.as_ref()) {
            let mut instance = (descriptor.construct)(Arc::clone(connection));
            let mut executor = SuiteExecutor::new(
                suite,
                self.config.warmup_count(),
                self.config.repeat_count(),
            );
            SuiteDisposition::Executed(executor.execute(instance.as_mut(), recorder))
        } else {
            info!(suite, backend = %backend, "suite not compatible with backend, skipping");
            SuiteDisposition::Incompatible
        };

        if let Err(cause) = run_guarded(|| self.config.run_after_suite(&ctx)) {
            warn!(suite, backend = %backend, %cause, "after-suite hook failed");
        }
        disposition
    }
}

/// Directory name for a run started now.
pub fn default_run_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("run-{secs}")
}

/// Writes one artifact per backend into `data_dir/run_id`.
/// Backends whose file names collide get a `-2`, `-3`, ... suffix in run
/// order.
pub fn persist(runs: &[BackendRun], data_dir: &Path, run_id: &str) -> BenchResult<Vec<PathBuf>> {
    let run_dir = data_dir.join(run_id);
    let mut used = BTreeSet::new();
    let mut written = Vec::with_capacity(runs.len());
    for run in runs {
        let stem = artifact_file_stem(&run.result.backend);
        let mut file_name = format!("{stem}.{ARTIFACT_EXTENSION}");
        let mut n = 2;
        while used.contains(&file_name) {
            file_name = format!("{stem}-{n}.{ARTIFACT_EXTENSION}");
            n += 1;
        }
        if n > 2 {
            warn!(backend = %run.result.backend, file = %file_name, "artifact name collision, adding suffix");
        }
        let path = write_run_result_named(&run_dir, &file_name, &run.result)?;
        used.insert(file_name);
        info!(backend = %run.result.backend, path = %path.display(), "wrote run result");
        written.push(path);
    }
    Ok(written)
}

/// Aggregates everything under `data_dir` and writes the comparison report.
pub fn publish_report(
    data_dir: &Path,
    report_dir: &Path,
    unit: TimeUnit,
    description: Option<String>,
) -> BenchResult<ComparisonReport> {
    let dataset = ReportAggregator::new(data_dir).load_performance_data(unit);
    if !dataset.skipped().is_empty() {
        warn!(skipped = dataset.skipped().len(), "some artifacts were ignored");
    }
    let report = build_report(&dataset, description);
    for path in write_reports(report_dir, &report)? {
        info!(path = %path.display(), "wrote report");
    }
    Ok(report)
}
