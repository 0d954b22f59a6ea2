//! Offline merge of persisted run artifacts into comparison data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::artifact::{read_artifact, ParsedArtifact, ARTIFACT_EXTENSION};
use crate::stats::{StatisticalData, StatisticalSummary};
use crate::TimeUnit;

/// operation -> backend -> samples, in the unit the dataset was loaded with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateDataset {
    unit: TimeUnit,
    data: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    sources: usize,
    skipped: Vec<PathBuf>,
}

impl AggregateDataset {
    pub fn new(unit: TimeUnit) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Appends the raw nanosecond samples of one artifact.
    pub fn merge(&mut self, artifact: &ParsedArtifact) {
        for (operation, nanos) in &artifact.samples {
            self.data
                .entry(operation.clone())
                .or_default()
                .entry(artifact.backend.clone())
                .or_default()
                .extend(self.unit.convert_all(nanos));
        }
        self.sources += 1;
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Every backend seen for any operation, sorted.
    pub fn backends(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self
            .data
            .values()
            .flat_map(|by_backend| by_backend.keys().map(String::as_str))
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    pub fn by_backend(&self, operation: &str) -> Option<&BTreeMap<String, Vec<f64>>> {
        self.data.get(operation)
    }

    pub fn samples(&self, operation: &str, backend: &str) -> &[f64] {
        self.data
            .get(operation)
            .and_then(|m| m.get(backend))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Five-number summary; empty when the pair was never measured.
    pub fn summary(&self, operation: &str, backend: &str) -> StatisticalSummary {
        StatisticalData::new(self.samples(operation, backend)).summary()
    }

    pub fn as_map(&self) -> &BTreeMap<String, BTreeMap<String, Vec<f64>>> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of artifacts merged.
    pub fn source_count(&self) -> usize {
        self.sources
    }

    /// Artifacts that were rejected while loading.
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }
}

pub struct ReportAggregator {
    data_dir: PathBuf,
}

impl ReportAggregator {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Artifact files below the data directory, sorted by path.
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&self.data_dir).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry in data directory");
                    continue;
                }
            };
            let is_artifact = entry.file_type().is_file()
                && entry.path().extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION);
            if is_artifact {
                out.push(entry.path().to_path_buf());
            }
        }
        out.sort();
        out
    }

    /// Loads every artifact below the data directory and converts samples to
    /// `unit`. Sequences for the same (operation, backend) are concatenated in
    /// artifact path order. Unparsable artifacts are logged and skipped.
    pub fn load_performance_data(&self, unit: TimeUnit) -> AggregateDataset {
        let paths = self.artifact_paths();
        debug!(dir = %self.data_dir.display(), artifacts = paths.len(), "aggregating");

        let parsed: Vec<_> = paths
            .par_iter()
            .map(|path| (path, read_artifact(path)))
            .collect();

        let mut dataset = AggregateDataset::new(unit);
        for (path, result) in parsed {
            match result {
                Ok(artifact) => dataset.merge(&artifact),
                Err(e) => {
                    warn!(error = %e, "skipping artifact");
                    dataset.skipped.push(path.clone());
                }
            }
        }
        dataset
    }
}
