use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod artifact;
pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod harness;
pub mod recorder;
pub mod report;
pub mod runner;
pub mod schema;
pub mod stats;
pub mod suite;
pub mod suites;

pub use error::{BenchError, BenchResult};

/// Reserved operation name under which backend start-up is timed.
pub const INITIALIZATION_OPERATION: &str = "Initialization";

/// Time unit that raw nanosecond samples are converted to for reporting.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    /// Default unit for comparison reports.
    #[default]
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
        }
    }

    fn nanos_per_unit(&self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1.0,
            TimeUnit::Microseconds => 1_000.0,
            TimeUnit::Milliseconds => 1_000_000.0,
            TimeUnit::Seconds => 1_000_000_000.0,
        }
    }

    pub fn from_nanos(&self, nanos: u64) -> f64 {
        nanos as f64 / self.nanos_per_unit()
    }

    pub fn convert_all(&self, nanos: &[u64]) -> Vec<f64> {
        nanos.iter().map(|&n| self.from_nanos(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        assert_eq!(TimeUnit::Nanoseconds.from_nanos(1_500), 1_500.0);
        assert_eq!(TimeUnit::Microseconds.from_nanos(1_500), 1.5);
        assert_eq!(TimeUnit::Milliseconds.from_nanos(2_500_000), 2.5);
        assert_eq!(TimeUnit::Seconds.from_nanos(3_000_000_000), 3.0);
    }

    #[test]
    fn test_convert_all_preserves_order() {
        let converted = TimeUnit::Milliseconds.convert_all(&[3_000_000, 1_000_000, 2_000_000]);
        assert_eq!(converted, vec![3.0, 1.0, 2.0]);
    }
}
