use std::collections::BTreeMap;

use serde::Serialize;

/// One recorded iteration that failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub sequence: u32,
    pub cause: String,
}

/// Timings for one named operation within one backend run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TimingRecord {
    pub name: String,
    /// `(sequence index, duration in nanoseconds)` in recording order.
    pub successes: Vec<(u32, u64)>,
    pub failures: Vec<Failure>,
    /// Diagnostic only: never persisted and never part of success reports.
    pub warmup_failures: Vec<Failure>,
}

impl TimingRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn durations(&self) -> Vec<u64> {
        self.successes.iter().map(|&(_, nanos)| nanos).collect()
    }
}

/// All timing data produced for one backend in one process run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub backend: String,
    pub records: BTreeMap<String, TimingRecord>,
}

impl RunResult {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            records: BTreeMap::new(),
        }
    }

    pub fn record(&self, operation: &str) -> Option<&TimingRecord> {
        self.records.get(operation)
    }

    /// Operation name to ordered nanosecond samples, for operations with at
    /// least one success.
    pub fn samples(&self) -> BTreeMap<String, Vec<u64>> {
        self.records
            .values()
            .filter(|r| !r.successes.is_empty())
            .map(|r| (r.name.clone(), r.durations()))
            .collect()
    }
}

/// Append-only sink for one backend's timings.
#[derive(Debug, Default)]
pub struct TimingRecorder {
    result: RunResult,
}

impl TimingRecorder {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            result: RunResult::new(backend),
        }
    }

    pub fn backend(&self) -> &str {
        &self.result.backend
    }

    fn entry(&mut self, operation: &str) -> &mut TimingRecord {
        self.result
            .records
            .entry(operation.to_string())
            .or_insert_with(|| TimingRecord::new(operation))
    }

    pub fn record_success(&mut self, operation: &str, duration_nanos: u64, sequence: u32) {
        self.entry(operation).successes.push((sequence, duration_nanos));
    }

    pub fn record_failure(&mut self, operation: &str, cause: impl Into<String>, sequence: u32) {
        self.entry(operation).failures.push(Failure {
            sequence,
            cause: cause.into(),
        });
    }

    pub fn record_warmup_failure(
        &mut self,
        operation: &str,
        cause: impl Into<String>,
        sequence: u32,
    ) {
        self.entry(operation).warmup_failures.push(Failure {
            sequence,
            cause: cause.into(),
        });
    }

    /// Sorted names of operations with at least one success.
    pub fn successful_operation_names(&self) -> Vec<&str> {
        self.names_where(|r| !r.successes.is_empty())
    }

    /// Sorted names of operations with at least one measured failure.
    pub fn failed_operation_names(&self) -> Vec<&str> {
        self.names_where(|r| !r.failures.is_empty())
    }

    fn names_where(&self, pred: impl Fn(&TimingRecord) -> bool) -> Vec<&str> {
        self.result
            .records
            .values()
            .filter(|r| pred(r))
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn durations_for(&self, operation: &str) -> Vec<u64> {
        self.result
            .records
            .get(operation)
            .map(TimingRecord::durations)
            .unwrap_or_default()
    }

    pub fn failures_for(&self, operation: &str) -> &[Failure] {
        self.result
            .records
            .get(operation)
            .map(|r| r.failures.as_slice())
            .unwrap_or(&[])
    }

    pub fn warmup_failures_for(&self, operation: &str) -> &[Failure] {
        self.result
            .records
            .get(operation)
            .map(|r| r.warmup_failures.as_slice())
            .unwrap_or(&[])
    }

    pub fn run_result(&self) -> &RunResult {
        &self.result
    }

    pub fn into_run_result(self) -> RunResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_preserved_per_operation() {
        let mut rec = TimingRecorder::new("memory");
        rec.record_success("Insert", 30, 1);
        rec.record_success("Read", 5, 1);
        rec.record_success("Insert", 10, 2);
        rec.record_success("Insert", 20, 3);

        assert_eq!(rec.durations_for("Insert"), vec![30, 10, 20]);
        assert_eq!(rec.durations_for("Read"), vec![5]);
    }

    #[test]
    fn test_unknown_operation_is_empty() {
        let rec = TimingRecorder::new("memory");
        assert!(rec.durations_for("Missing").is_empty());
        assert!(rec.failures_for("Missing").is_empty());
    }

    #[test]
    fn test_failure_only_operation_hidden_from_successes() {
        let mut rec = TimingRecorder::new("fs");
        rec.record_success("Good", 1, 1);
        rec.record_failure("Bad", "boom", 1);

        assert_eq!(rec.successful_operation_names(), vec!["Good"]);
        assert_eq!(rec.failed_operation_names(), vec!["Bad"]);
        assert_eq!(
            rec.failures_for("Bad"),
            &[Failure {
                sequence: 1,
                cause: "boom".to_string()
            }]
        );
        assert!(!rec.run_result().samples().contains_key("Bad"));
    }

    #[test]
    fn test_warmup_failures_kept_apart() {
        let mut rec = TimingRecorder::new("fs");
        rec.record_warmup_failure("Suite", "cold cache", 1);

        assert!(rec.failed_operation_names().is_empty());
        assert!(rec.successful_operation_names().is_empty());
        assert_eq!(rec.warmup_failures_for("Suite").len(), 1);
    }

    #[test]
    fn test_into_run_result() {
        let mut rec = TimingRecorder::new("memory");
        rec.record_success("Op", 7, 1);
        let result = rec.into_run_result();
        assert_eq!(result.backend, "memory");
        assert_eq!(result.samples()["Op"], vec![7]);
    }
}
