//! Comparison reports built from an [`AggregateDataset`].
//!
//! Every (operation, backend) pair seen anywhere in the dataset gets a row,
//! so a backend that never produced samples for an operation shows up as
//! `N/A` instead of disappearing from the table.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::aggregate::AggregateDataset;
use crate::error::BenchResult;
use crate::schema::{
    BackendSummary, BoxChart, BoxSeries, ComparisonReport, MachineInfo, OperationReport, RunMeta,
};
use crate::stats::{display_stat, StatisticalSummary};

pub const JSON_REPORT_FILE: &str = "report.json";
pub const TEXT_REPORT_FILE: &str = "report.txt";

const COLOR_SEED: u64 = 0xc0_10_75;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Backend colour assignments for one report build. Colours are stable for
/// a given order of first use and never shared between builds.
#[derive(Debug)]
pub struct ColorMap {
    rng: ChaCha8Rng,
    assigned: BTreeMap<String, String>,
}

impl Default for ColorMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorMap {
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(COLOR_SEED),
            assigned: BTreeMap::new(),
        }
    }

    pub fn color_for(&mut self, backend: &str) -> String {
        if let Some(c) = self.assigned.get(backend) {
            return c.clone();
        }
        // Keep channels away from white so boxes stay visible.
        let [r, g, b]: [u8; 3] = [
            self.rng.gen_range(0..=200),
            self.rng.gen_range(0..=200),
            self.rng.gen_range(0..=200),
        ];
        let color = format!("#{r:02x}{g:02x}{b:02x}");
        self.assigned.insert(backend.to_string(), color.clone());
        color
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

fn box_values(summary: &StatisticalSummary) -> Option<[f64; 5]> {
    Some([
        summary.min?,
        summary.lower_quartile?,
        summary.median?,
        summary.upper_quartile?,
        summary.max?,
    ])
}

pub fn summarize(dataset: &AggregateDataset) -> Vec<OperationReport> {
    let backends = dataset.backends();
    dataset
        .operations()
        .map(|operation| OperationReport {
            operation: operation.to_string(),
            backends: backends
                .iter()
                .map(|backend| BackendSummary {
                    backend: backend.to_string(),
                    summary: dataset.summary(operation, backend),
                })
                .collect(),
        })
        .collect()
}

pub fn build_charts(dataset: &AggregateDataset, colors: &mut ColorMap) -> Vec<BoxChart> {
    let backends = dataset.backends();
    dataset
        .operations()
        .map(|operation| BoxChart {
            operation: operation.to_string(),
            unit: dataset.unit(),
            series: backends
                .iter()
                .map(|backend| BoxSeries {
                    backend: backend.to_string(),
                    color: colors.color_for(backend),
                    values: box_values(&dataset.summary(operation, backend)),
                })
                .collect(),
        })
        .collect()
}

pub fn build_report(dataset: &AggregateDataset, description: Option<String>) -> ComparisonReport {
    let mut colors = ColorMap::new();
    ComparisonReport {
        run: RunMeta::new(dataset.unit(), description),
        machine: MachineInfo::collect(),
        sources: dataset.source_count(),
        operations: summarize(dataset),
        charts: build_charts(dataset, &mut colors),
    }
}

pub fn render_text(report: &ComparisonReport) -> String {
    let unit = report.run.unit.as_str();
    let mut out = String::new();
    if let Some(desc) = &report.run.description {
        let _ = writeln!(out, "{desc}");
    }
    let _ = writeln!(
        out,
        "repobench {} | {} {} ({} cpus) | {} artifact(s) | unit: {unit}",
        report.run.bench_version,
        report.machine.os,
        report.machine.arch,
        report.machine.cpus,
        report.sources,
    );
    let _ = writeln!(out);

    let op_width = report
        .operations
        .iter()
        .map(|o| o.operation.len())
        .chain(std::iter::once("operation".len()))
        .max()
        .unwrap_or(0);
    let backend_width = report
        .operations
        .iter()
        .flat_map(|o| o.backends.iter().map(|b| b.backend.len()))
        .chain(std::iter::once("backend".len()))
        .max()
        .unwrap_or(0);

    let _ = writeln!(
        out,
        "{:<op_width$}  {:<backend_width$}  {:>5}  {:>12}  {:>12}  {:>12}  {:>12}  {:>12}",
        "operation", "backend", "n", "min", "q1", "median", "q3", "max"
    );
    for op in &report.operations {
        for b in &op.backends {
            let s = &b.summary;
            let _ = writeln!(
                out,
                "{:<op_width$}  {:<backend_width$}  {:>5}  {:>12}  {:>12}  {:>12}  {:>12}  {:>12}",
                op.operation,
                b.backend,
                s.samples,
                display_stat(s.min, 3),
                display_stat(s.lower_quartile, 3),
                display_stat(s.median, 3),
                display_stat(s.upper_quartile, 3),
                display_stat(s.max, 3),
            );
        }
    }
    out
}

/// Writes both report flavours into `report_dir` and returns their paths.
pub fn write_reports(report_dir: &Path, report: &ComparisonReport) -> BenchResult<Vec<PathBuf>> {
    fs::create_dir_all(report_dir)?;
    let json_path = report_dir.join(JSON_REPORT_FILE);
    fs::write(&json_path, serde_json::to_string_pretty(report)?)?;
    let text_path = report_dir.join(TEXT_REPORT_FILE);
    fs::write(&text_path, render_text(report))?;
    Ok(vec![json_path, text_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ParsedArtifact;
    use crate::TimeUnit;
    use tempfile::tempdir;

    fn dataset() -> AggregateDataset {
        let mut data = AggregateDataset::new(TimeUnit::Nanoseconds);
        data.merge(&ParsedArtifact {
            backend: "In Memory".into(),
            samples: [("crud".to_string(), vec![1, 2, 3, 4])].into_iter().collect(),
        });
        data.merge(&ParsedArtifact {
            backend: "File System".into(),
            samples: [("import".to_string(), vec![9])].into_iter().collect(),
        });
        data
    }

    #[test]
    fn test_missing_pairs_render_na() {
        let report = build_report(&dataset(), Some("nightly".into()));
        let text = render_text(&report);
        assert!(text.starts_with("nightly\n"));

        let crud_fs = text
            .lines()
            .find(|l| l.starts_with("crud") && l.contains("File System"))
            .unwrap();
        assert!(crud_fs.contains("N/A"));

        let crud_mem = text
            .lines()
            .find(|l| l.starts_with("crud") && l.contains("In Memory"))
            .unwrap();
        assert!(crud_mem.contains("2.500"));
        assert!(!crud_mem.contains("N/A"));
    }

    #[test]
    fn test_chart_series() {
        let mut colors = ColorMap::new();
        let charts = build_charts(&dataset(), &mut colors);
        assert_eq!(charts.len(), 2);

        let crud = &charts[0];
        assert_eq!(crud.operation, "crud");
        let mem = crud.series.iter().find(|s| s.backend == "In Memory").unwrap();
        assert_eq!(mem.values, Some([1.0, 1.5, 2.5, 3.5, 4.0]));
        let fs = crud.series.iter().find(|s| s.backend == "File System").unwrap();
        assert_eq!(fs.values, None);

        // Same backend keeps its colour across charts.
        let fs_import = charts[1]
            .series
            .iter()
            .find(|s| s.backend == "File System")
            .unwrap();
        assert_eq!(fs.color, fs_import.color);
        assert_eq!(colors.len(), 2);
    }

    #[test]
    fn test_colors_scoped_per_build() {
        let mut first = ColorMap::new();
        let a = first.color_for("x");
        let b = first.color_for("y");
        assert_ne!(a, b);
        assert_eq!(a.len(), 7);

        let mut second = ColorMap::new();
        assert!(second.is_empty());
        assert_eq!(second.color_for("x"), a);
    }

    #[test]
    fn test_write_reports() {
        let dir = tempdir().unwrap();
        let report = build_report(&dataset(), None);
        let paths = write_reports(&dir.path().join("out"), &report).unwrap();
        assert_eq!(paths.len(), 2);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(json["sources"], 2);
        assert_eq!(json["run"]["unit"], "nanoseconds");
        assert_eq!(json["operations"][0]["operation"], "crud");
        assert!(json["operations"][0]["backends"][0]["median"].is_null());
    }
}
