//! Engine configuration

use crate::error::{MarkdupError, Result};
use crate::scoring::{DEFAULT_QUALITY_THRESHOLD, ScoringStrategy};

/// Highest base quality representable in SAM
pub const MAX_QUALITY: u8 = 93;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerConfig {
    /// Fixed minimum distance; derived from the data when `None`
    pub minimum_distance: Option<u32>,
    pub quality_threshold: u8,
    pub scoring_strategy: ScoringStrategy,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            minimum_distance: None,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            scoring_strategy: ScoringStrategy::default(),
        }
    }
}

impl MarkerConfig {
    pub fn with_minimum_distance(mut self, distance: u32) -> Self {
        self.minimum_distance = Some(distance);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.quality_threshold > MAX_QUALITY {
            return Err(MarkdupError::InvalidParameter {
                parameter: "quality-threshold".to_string(),
                reason: format!("{} exceeds the maximum base quality {MAX_QUALITY}", self.quality_threshold),
            });
        }
        Ok(())
    }
}
