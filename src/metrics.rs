//! Per-library duplication metrics
//!
//! Counts follow the usual MarkDuplicates report: reads in pairs are counted per
//! record and halved when the report is built.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Running counts for one library
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LibraryCounts {
    pub unpaired_reads: u64,
    pub paired_reads: u64,
    pub secondary_or_supplementary: u64,
    pub unmapped: u64,
    pub unpaired_duplicates: u64,
    pub paired_duplicates: u64,
}

/// One row of the metrics report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DuplicationMetrics {
    pub library: String,
    pub unpaired_reads_examined: u64,
    pub read_pairs_examined: u64,
    pub secondary_or_supplementary_rds: u64,
    pub unmapped_reads: u64,
    pub unpaired_read_duplicates: u64,
    pub read_pair_duplicates: u64,
    pub percent_duplication: f64,
    pub estimated_library_size: Option<u64>,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    libraries: BTreeMap<u32, LibraryCounts>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn counts(&mut self, library: u32) -> &mut LibraryCounts {
        self.libraries.entry(library).or_default()
    }

    pub fn add_unpaired(&mut self, library: u32, is_duplicate: bool) {
        let counts = self.counts(library);
        counts.unpaired_reads += 1;
        if is_duplicate {
            counts.unpaired_duplicates += 1;
        }
    }

    /// Counts one read of a pair
    pub fn add_paired_read(&mut self, library: u32, is_duplicate: bool) {
        let counts = self.counts(library);
        counts.paired_reads += 1;
        if is_duplicate {
            counts.paired_duplicates += 1;
        }
    }

    pub fn add_secondary_or_supplementary(&mut self, library: u32) {
        self.counts(library).secondary_or_supplementary += 1;
    }

    pub fn add_unmapped(&mut self, library: u32) {
        self.counts(library).unmapped += 1;
    }

    pub fn get(&self, library: u32) -> LibraryCounts {
        self.libraries.get(&library).copied().unwrap_or_default()
    }

    pub fn total_duplicates(&self) -> u64 {
        self.libraries
            .values()
            .map(|c| c.unpaired_duplicates + c.paired_duplicates)
            .sum()
    }

    /// Builds the report; `names[id]` is the name of library `id`
    pub fn report(&self, names: &[String]) -> Vec<DuplicationMetrics> {
        self.libraries
            .iter()
            .map(|(&id, counts)| {
                let library = names
                    .get(id as usize)
                    .cloned()
                    .unwrap_or_else(|| format!("library-{id}"));
                DuplicationMetrics::from_counts(library, counts)
            })
            .collect()
    }
}

impl DuplicationMetrics {
    pub fn from_counts(library: String, counts: &LibraryCounts) -> Self {
        let read_pairs_examined = counts.paired_reads / 2;
        let read_pair_duplicates = counts.paired_duplicates / 2;

        let examined = counts.unpaired_reads + counts.paired_reads;
        let percent_duplication = if examined == 0 {
            0.0
        } else {
            (counts.unpaired_duplicates + counts.paired_duplicates) as f64 / examined as f64
        };

        Self {
            library,
            unpaired_reads_examined: counts.unpaired_reads,
            read_pairs_examined,
            secondary_or_supplementary_rds: counts.secondary_or_supplementary,
            unmapped_reads: counts.unmapped,
            unpaired_read_duplicates: counts.unpaired_duplicates,
            read_pair_duplicates,
            percent_duplication,
            estimated_library_size: estimate_library_size(
                read_pairs_examined,
                read_pairs_examined - read_pair_duplicates,
            ),
        }
    }
}

/// Lander-Waterman style library size estimate from pair counts
///
/// Solves `c / x - 1 + exp(-n / x) = 0` for `x` by bisection, where `n` is the number
/// of read pairs and `c` the number of unique pairs. `None` when there are no
/// duplicates to learn from.
pub fn estimate_library_size(read_pairs: u64, unique_read_pairs: u64) -> Option<u64> {
    if read_pairs == 0 || unique_read_pairs >= read_pairs || unique_read_pairs == 0 {
        return None;
    }

    let n = read_pairs as f64;
    let c = unique_read_pairs as f64;
    let f = |x: f64| c / x - 1.0 + (-n / x).exp();

    let mut lo = 1.0;
    let mut hi = 100.0;
    if f(lo * c) < 0.0 {
        return None;
    }
    while f(hi * c) > 0.0 {
        hi *= 10.0;
    }

    for _ in 0..40 {
        let mid = (lo + hi) / 2.0;
        let u = f(mid * c);
        if u == 0.0 {
            break;
        } else if u > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    Some((c * (lo + hi) / 2.0) as u64)
}

/// Writes the report as a tab-delimited file
pub fn write_metrics(path: &Path, metrics: &[DuplicationMetrics]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("failed to create metrics file {}", path.display()))?;
    for row in metrics {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
