//! Safe-flush controller
//!
//! Tracks the leading edge of the sorted stream (largest unclipped start seen on the
//! current reference) and the watermark behind which no new group member can appear.

use crate::distance::MinimumDistance;
use crate::error::{MarkdupError, Result};
use crate::key::ReadEnd;

/// Everything strictly before `position` on `reference_id` is finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    pub reference_id: usize,
    pub position: i64,
}

impl Watermark {
    /// Whether a group anchored at `anchor` can no longer gain members
    #[inline]
    pub fn covers(&self, anchor: &ReadEnd) -> bool {
        anchor.reference_id < self.reference_id
            || (anchor.reference_id == self.reference_id && anchor.position < self.position)
    }
}

#[derive(Debug)]
pub struct FlushController {
    distance: MinimumDistance,
    reference_id: Option<usize>,
    edge: i64,
    watermark: Option<Watermark>,
}

impl FlushController {
    pub fn new(distance: MinimumDistance) -> Self {
        Self { distance, reference_id: None, edge: i64::MIN, watermark: None }
    }

    pub fn distance(&self) -> &MinimumDistance {
        &self.distance
    }

    pub fn watermark(&self) -> Option<Watermark> {
        self.watermark
    }

    /// Moves to a new reference; returns true when the previous one is left behind
    pub fn enter_reference(&mut self, reference_id: usize) -> bool {
        if self.reference_id == Some(reference_id) {
            return false;
        }
        let left = self.reference_id.is_some();
        self.reference_id = Some(reference_id);
        self.edge = i64::MIN;
        self.watermark = None;
        left
    }

    /// Fails if a group member at `position` could belong to an already finalized group
    pub fn check(&self, read_name: &str, reference_id: usize, position: i64) -> Result<()> {
        let Some(watermark) = self.watermark else {
            return Ok(());
        };
        if reference_id != watermark.reference_id || position >= watermark.position {
            return Ok(());
        }
        let required = u32::try_from(self.edge - position).unwrap_or(u32::MAX);
        Err(MarkdupError::MinimumDistanceTooSmall {
            read_name: read_name.to_string(),
            reference_id,
            position,
            minimum_distance: self.distance.get(),
            required,
        })
    }

    /// Advances the leading edge with a record's unclipped start; returns the new watermark
    pub fn advance(&mut self, unclipped_start: i64) -> Option<Watermark> {
        let reference_id = self.reference_id?;
        self.edge = self.edge.max(unclipped_start);
        let position = self.edge - i64::from(self.distance.get());
        // the watermark never moves backwards, even when the auto distance grows
        let position = self.watermark.map_or(position, |w| w.position.max(position));
        let watermark = Watermark { reference_id, position };
        self.watermark = Some(watermark);
        Some(watermark)
    }
}
