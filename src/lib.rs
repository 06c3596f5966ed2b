//! mcmarkdup - single-pass, mate-CIGAR-aware duplicate marking for coordinate-sorted BAM files
//!
//! Duplicates are found in one streaming pass: every paired read carries its mate's
//! CIGAR (`MC` tag), so both unclipped 5' ends of a pair are known as soon as the
//! first read is seen. Groups are closed once the stream has moved a minimum
//! distance past them, and records are written back in input order.
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use mcmarkdup::{Args, run_markdup};
//!
//! let args = Args::parse_from(["mcmarkdup", "-i", "input.bam", "-o", "output.bam"]);
//! run_markdup(&args)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! The engine itself works on any sorted stream of [`ReadRecord`]s through
//! [`DuplicateMarker`] or the [`MarkDuplicates`] iterator adapter.

pub mod args;
pub mod config;
pub mod coordinates;
pub mod distance;
pub mod error;
pub mod flush;
pub mod io;
pub mod key;
pub mod marker;
pub mod metrics;
pub mod output;
pub mod record;
pub mod resolver;
pub mod run;
pub mod scoring;
pub mod tracker;
pub mod utils;

// Re-export commonly used items
pub use args::Args;
pub use config::MarkerConfig;
pub use error::{MarkdupError, Result};
pub use marker::{DuplicateMarker, MarkDuplicates};
pub use output::Marked;
pub use record::{MateInfo, ReadRecord, Strand};
pub use run::{RunSummary, run_markdup};
pub use scoring::ScoringStrategy;
