use serde::{Deserialize, Serialize};

use crate::stats::StatisticalSummary;
use crate::TimeUnit;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
    /// Free-form label from `tests.description`.
    pub description: Option<String>,
    pub unit: TimeUnit,
}

impl RunMeta {
    pub fn new(unit: TimeUnit, description: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp_utc: now_utc(),
            git_sha: git_sha_short(),
            description,
            unit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
    pub cpu_model: Option<String>,
}

impl MachineInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1),
            cpu_model: cpu_model(),
        }
    }
}

#[cfg(target_os = "linux")]
fn cpu_model() -> Option<String> {
    let content = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    content
        .lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split(':').nth(1))
        .map(|s| s.trim().to_string())
}

#[cfg(not(target_os = "linux"))]
fn cpu_model() -> Option<String> {
    None
}

/// Seconds since the Unix epoch, prefixed so it is not mistaken for RFC 3339.
pub fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

/// Best-effort commit id from the CI environment.
pub fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSummary {
    pub backend: String,
    #[serde(flatten)]
    pub summary: StatisticalSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    pub operation: String,
    pub backends: Vec<BackendSummary>,
}

/// One box per backend: `[min, lower quartile, median, upper quartile, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSeries {
    pub backend: String,
    pub color: String,
    pub values: Option<[f64; 5]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxChart {
    pub operation: String,
    pub unit: TimeUnit,
    pub series: Vec<BoxSeries>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub run: RunMeta,
    pub machine: MachineInfo,
    /// Number of artifacts the report was built from.
    pub sources: usize,
    pub operations: Vec<OperationReport>,
    pub charts: Vec<BoxChart>,
}
