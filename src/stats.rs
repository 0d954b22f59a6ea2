//! Five-number summaries for box-and-whisker comparison.
//!
//! Quartiles follow the Tukey hinge method: each hinge is the median of the
//! lower or upper half of the sorted samples, with no interpolation beyond
//! averaging a middle pair. For an odd count the overall median is part of
//! both halves.
//!
//! Every statistic returns `None` when there are no samples. Callers render
//! that as `N/A`; it is never coerced to zero.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct StatisticalData {
    sorted: Vec<f64>,
}

impl StatisticalData {
    /// Sorts a private copy; `samples` is left untouched.
    pub fn new(samples: &[f64]) -> Self {
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        Self { sorted }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn min(&self) -> Option<f64> {
        self.sorted.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.sorted.last().copied()
    }

    pub fn median(&self) -> Option<f64> {
        median_of_sorted(&self.sorted)
    }

    pub fn lower_quartile(&self) -> Option<f64> {
        let (lower, _) = self.halves();
        median_of_sorted(lower)
    }

    pub fn upper_quartile(&self) -> Option<f64> {
        let (_, upper) = self.halves();
        median_of_sorted(upper)
    }

    pub fn summary(&self) -> StatisticalSummary {
        StatisticalSummary {
            samples: self.len(),
            min: self.min(),
            lower_quartile: self.lower_quartile(),
            median: self.median(),
            upper_quartile: self.upper_quartile(),
            max: self.max(),
        }
    }

    fn halves(&self) -> (&[f64], &[f64]) {
        let n = self.sorted.len();
        if n % 2 == 0 {
            self.sorted.split_at(n / 2)
        } else {
            // The median belongs to both halves.
            (&self.sorted[..=n / 2], &self.sorted[n / 2..])
        }
    }
}

fn median_of_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Derived five-number summary for one (operation, backend) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub samples: usize,
    pub min: Option<f64>,
    pub lower_quartile: Option<f64>,
    pub median: Option<f64>,
    pub upper_quartile: Option<f64>,
    pub max: Option<f64>,
}

impl StatisticalSummary {
    pub fn has_data(&self) -> bool {
        self.samples > 0
    }
}

/// Renders a statistic for tables, using `N/A` for the no-data sentinel.
pub fn display_stat(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "N/A".to_string(),
    }
}
