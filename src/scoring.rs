//! Scoring strategy and the ranking used to pick a group's representative

use std::cmp::Ordering;

use bstr::BString;
use clap::ValueEnum;

use crate::coordinates::reference_span;
use crate::record::ReadRecord;

/// Default base quality threshold for [`ScoringStrategy::SumOfBaseQualities`]
pub const DEFAULT_QUALITY_THRESHOLD: u8 = 15;

/// How a read or pair is scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ScoringStrategy {
    /// Sum of base qualities at or above the quality threshold
    #[default]
    SumOfBaseQualities,
}

impl ScoringStrategy {
    /// Score of a single read
    #[inline]
    pub fn score(&self, quality_scores: &[u8], threshold: u8) -> u32 {
        match self {
            ScoringStrategy::SumOfBaseQualities => quality_scores
                .iter()
                .filter(|&&q| q >= threshold)
                .map(|&q| u32::from(q))
                .sum(),
        }
    }

    /// Rank of a fragment or first-seen pair record
    ///
    /// For pairs the inline mate score (`ms`) and the `MC` span are added in. When either
    /// is missing, the mate adds its own value once it joins the group.
    pub fn rank(&self, record: &ReadRecord, threshold: u8, ordinal: u64) -> Rank {
        let mut score = self.score(&record.quality_scores, threshold);
        let mut reference_length = reference_span(&record.cigar) as u64;

        if record.has_mapped_mate() {
            if let Some(mate) = &record.mate {
                score += mate.score.unwrap_or(0);
                reference_length += mate.cigar.as_deref().map_or(0, reference_span) as u64;
            }
        }

        Rank {
            score,
            reference_length,
            name: record.name.clone(),
            ordinal,
        }
    }
}

/// Orders duplicate candidates; the greatest rank is kept as the representative
///
/// Higher score wins, then larger combined reference length, then the
/// lexicographically smaller name, then the earlier input ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rank {
    pub score: u32,
    pub reference_length: u64,
    pub name: BString,
    pub ordinal: u64,
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| self.reference_length.cmp(&other.reference_length))
            .then_with(|| other.name.cmp(&self.name))
            .then_with(|| other.ordinal.cmp(&self.ordinal))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::parse_cigar;
    use crate::record::{MateInfo, Strand};
    use noodles::core::Position;

    fn rank(score: u32, reference_length: u64, name: &str, ordinal: u64) -> Rank {
        Rank { score, reference_length, name: name.into(), ordinal }
    }

    #[test]
    fn test_sum_of_base_qualities_respects_threshold() {
        let quals = [10, 14, 15, 30, 40];
        assert_eq!(ScoringStrategy::SumOfBaseQualities.score(&quals, 15), 85);
        assert_eq!(ScoringStrategy::SumOfBaseQualities.score(&quals, 0), 109);
        assert_eq!(ScoringStrategy::SumOfBaseQualities.score(&[], 15), 0);
    }

    #[test]
    fn test_higher_score_wins() {
        assert!(rank(100, 10, "b", 1) > rank(99, 500, "a", 0));
    }

    #[test]
    fn test_reference_length_breaks_score_ties() {
        assert!(rank(100, 100, "READX", 1) > rank(100, 95, "READY", 0));
    }

    #[test]
    fn test_smaller_name_breaks_remaining_ties() {
        assert!(rank(100, 100, "READA", 1) > rank(100, 100, "READB", 0));
        assert!(rank(100, 100, "READ10", 0) > rank(100, 100, "READ9", 1));
    }

    #[test]
    fn test_ordinal_is_final_tie_break() {
        assert!(rank(1, 1, "same", 3) > rank(1, 1, "same", 7));
    }

    #[test]
    fn test_pair_rank_adds_mate_span_and_score() {
        let record = ReadRecord::builder()
            .name("READY")
            .mapped(1, Position::try_from(1).unwrap(), parse_cigar(b"50M", "READY").unwrap())
            .quality_scores(vec![30; 50])
            .mate(MateInfo {
                reference_id: 1,
                alignment_start: Position::try_from(105).unwrap(),
                strand: Strand::Reverse,
                cigar: Some(parse_cigar(b"5I45M", "READY").unwrap()),
                score: Some(1500),
            })
            .build();

        let r = ScoringStrategy::SumOfBaseQualities.rank(&record, DEFAULT_QUALITY_THRESHOLD, 4);
        assert_eq!(r.score, 3000);
        assert_eq!(r.reference_length, 95);
        assert_eq!(r.ordinal, 4);
    }
}
