use std::hint::black_box;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::recorder::TimingRecorder;
use crate::suite::Suite;

/// Lifecycle of one suite against one backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuiteState {
    NotStarted,
    SettingUp,
    WarmingUp,
    Measuring,
    TornDown,
    Failed,
}

impl SuiteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SuiteState::TornDown | SuiteState::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuiteOutcome {
    pub state: SuiteState,
    pub warmup_completed: u32,
    /// Cause of the warmup iteration that cut the warmup short.
    pub warmup_error: Option<String>,
    pub measured: u32,
    pub failed_iteration: Option<u32>,
    pub setup_error: Option<String>,
    pub teardown_error: Option<String>,
}

impl SuiteOutcome {
    fn new() -> Self {
        Self {
            state: SuiteState::NotStarted,
            warmup_completed: 0,
            warmup_error: None,
            measured: 0,
            failed_iteration: None,
            setup_error: None,
            teardown_error: None,
        }
    }
}

/// Runs `f`, turning both `Err` and a panic into a printable cause.
pub fn run_guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(panic) => Err(if let Some(s) = panic.downcast_ref::<&str>() {
            format!("panicked: {s}")
        } else if let Some(s) = panic.downcast_ref::<String>() {
            format!("panicked: {s}")
        } else {
            "panicked".to_string()
        }),
    }
}

/// Times a single guarded call with the monotonic clock.
pub fn measure_once<T>(f: impl FnOnce() -> anyhow::Result<T>) -> (u64, Result<T, String>) {
    let start = Instant::now();
    let result = black_box(run_guarded(f));
    let elapsed = start.elapsed();
    let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
    (nanos, result)
}

/// Drives one suite through warmup and measurement, recording measured
/// iterations under the suite name.
#[derive(Debug)]
pub struct SuiteExecutor<'a> {
    name: &'a str,
    warmup: u32,
    repeat: u32,
    state: SuiteState,
}

impl<'a> SuiteExecutor<'a> {
    pub fn new(name: &'a str, warmup: u32, repeat: u32) -> Self {
        Self {
            name,
            warmup,
            repeat,
            state: SuiteState::NotStarted,
        }
    }

    pub fn state(&self) -> SuiteState {
        self.state
    }

    fn enter(&mut self, next: SuiteState) {
        debug!(suite = self.name, from = ?self.state, to = ?next, "suite transition");
        self.state = next;
    }

    pub fn execute(&mut self, suite: &mut dyn Suite, recorder: &mut TimingRecorder) -> SuiteOutcome {
        let mut outcome = SuiteOutcome::new();
        if self.state != SuiteState::NotStarted {
            warn!(suite = self.name, state = ?self.state, "executor already used");
            outcome.state = self.state;
            return outcome;
        }

        self.enter(SuiteState::SettingUp);
        if let Err(cause) = run_guarded(|| suite.before_suite()) {
            warn!(suite = self.name, backend = recorder.backend(), %cause, "setup failed, skipping suite");
            self.enter(SuiteState::Failed);
            outcome.setup_error = Some(cause);
            outcome.state = self.state;
            return outcome;
        }

        self.enter(SuiteState::WarmingUp);
        for i in 1..=self.warmup {
            match run_guarded(|| suite.run_test()) {
                Ok(()) => outcome.warmup_completed += 1,
                Err(cause) => {
                    warn!(suite = self.name, iteration = i, %cause, "warmup failed, skipping remaining warmup");
                    recorder.record_warmup_failure(self.name, cause.clone(), i);
                    outcome.warmup_error = Some(cause);
                    break;
                }
            }
        }

        self.enter(SuiteState::Measuring);
        for i in 1..=self.repeat {
            let (nanos, result) = measure_once(|| suite.run_test());
            match result {
                Ok(()) => {
                    recorder.record_success(self.name, nanos, i);
                    outcome.measured += 1;
                }
                Err(cause) => {
                    warn!(suite = self.name, iteration = i, %cause, "measured iteration failed, stopping suite");
                    recorder.record_failure(self.name, cause, i);
                    outcome.failed_iteration = Some(i);
                    break;
                }
            }
        }

        if let Err(cause) = run_guarded(|| suite.after_suite()) {
            warn!(suite = self.name, %cause, "teardown failed");
            outcome.teardown_error = Some(cause);
        }
        self.enter(SuiteState::TornDown);

        info!(
            suite = self.name,
            backend = recorder.backend(),
            measured = outcome.measured,
            failed = outcome.failed_iteration.is_some(),
            "suite finished"
        );
        outcome.state = self.state;
        outcome
    }
}
