// Command-line argument parsing
use std::path::PathBuf;

use clap::Parser;

use crate::config::MarkerConfig;
use crate::error::Result;
use crate::scoring::{DEFAULT_QUALITY_THRESHOLD, ScoringStrategy};

#[derive(Parser, Debug, Clone)]
#[command(name = "mcmarkdup", about = "Single-pass duplicate marking using mate CIGARs (Rust)")]
pub struct Args {
    /// Coordinate-sorted input BAM
    #[arg(short, long)]
    pub input: PathBuf,
    #[arg(short, long)]
    pub output: PathBuf,
    /// Tab-delimited duplication metrics file
    #[arg(short, long)]
    pub metrics: Option<PathBuf>,
    /// Distance behind the leading read at which groups are closed; derived from the data if omitted
    #[arg(long)]
    pub minimum_distance: Option<u32>,
    #[arg(long, default_value_t = DEFAULT_QUALITY_THRESHOLD)]
    pub quality_threshold: u8,
    #[arg(long, value_enum, default_value_t = ScoringStrategy::SumOfBaseQualities)]
    pub scoring_strategy: ScoringStrategy,
    #[arg(short = 'r', long)]
    pub remove_duplicates: bool,
    /// Decode input on the marking thread instead of a read-ahead thread
    #[arg(long)]
    pub single_threaded: bool,
    /// Records per read-ahead batch
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,
}

impl Args {
    /// Validated engine configuration
    pub fn marker_config(&self) -> Result<MarkerConfig> {
        let config = MarkerConfig {
            minimum_distance: self.minimum_distance,
            quality_threshold: self.quality_threshold,
            scoring_strategy: self.scoring_strategy,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["mcmarkdup", "-i", "in.bam", "-o", "out.bam"]).unwrap();
        assert_eq!(args.input, PathBuf::from("in.bam"));
        assert_eq!(args.metrics, None);
        assert!(!args.remove_duplicates);
        assert!(!args.single_threaded);
        assert_eq!(args.batch_size, 256);

        let config = args.marker_config().unwrap();
        assert_eq!(config, MarkerConfig::default());
    }

    #[test]
    fn test_all_options() {
        let args = Args::try_parse_from([
            "mcmarkdup",
            "--input",
            "in.bam",
            "--output",
            "out.bam",
            "--metrics",
            "m.txt",
            "--minimum-distance",
            "990",
            "--quality-threshold",
            "20",
            "--scoring-strategy",
            "sum-of-base-qualities",
            "-r",
            "--single-threaded",
        ])
        .unwrap();
        assert_eq!(args.metrics, Some(PathBuf::from("m.txt")));
        assert!(args.remove_duplicates);
        assert!(args.single_threaded);

        let config = args.marker_config().unwrap();
        assert_eq!(config.minimum_distance, Some(990));
        assert_eq!(config.quality_threshold, 20);
    }

    #[test]
    fn test_out_of_range_quality_threshold_is_rejected() {
        let args = Args::try_parse_from([
            "mcmarkdup",
            "-i",
            "in.bam",
            "-o",
            "out.bam",
            "--quality-threshold",
            "120",
        ])
        .unwrap();
        assert!(args.marker_config().is_err());
    }
}
