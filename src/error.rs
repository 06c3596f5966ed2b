//! Error types for the duplicate marking engine.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, MarkdupError>;

/// Fatal conditions that abort a marking run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkdupError {
    /// A record arrived behind the flush watermark, so a group it could belong to
    /// may already have been emitted
    #[error(
        "Found read '{read_name}' at {reference_id}:{position} with enough 5' clipping that duplicates may \
         have been missed (minimum distance {minimum_distance}); please retry with a minimum distance \
         of at least {required}"
    )]
    MinimumDistanceTooSmall {
        /// Name of the offending read
        read_name: String,
        /// Reference index of the offending read
        reference_id: usize,
        /// Unclipped position that fell behind the watermark
        position: i64,
        /// Minimum distance in effect
        minimum_distance: u32,
        /// Smallest minimum distance that would have covered this read
        required: u32,
    },

    /// A record cannot be placed by the coordinate model
    #[error("Malformed record '{read_name}': {reason}")]
    MalformedRecord {
        /// Name of the offending read
        read_name: String,
        /// What is wrong with it
        reason: String,
    },

    /// The input is not sorted by (reference, alignment start)
    #[error("Input is not coordinate sorted: read '{read_name}' at {current} follows {previous}")]
    UnsortedInput {
        /// Name of the offending read
        read_name: String,
        /// Position of the preceding record
        previous: String,
        /// Position of the offending record
        current: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },
}
