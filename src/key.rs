//! Duplicate keys
//!
//! Ordering of the derived `Ord` impls follows the field order: reference, position, strand.

use noodles::core::Position;

use crate::coordinates::{unclipped_five_prime, validate_cigar};
use crate::error::{MarkdupError, Result};
use crate::record::{ReadRecord, Strand};

/// Unclipped 5' end of one read
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadEnd {
    pub reference_id: usize,
    pub position: i64,
    pub strand: Strand,
}

/// Second end of a duplicate key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MateEnd {
    /// Unpaired read, or paired read whose mate is unmapped
    Fragment,
    /// Mate end derived from the inline mate CIGAR
    Mate(ReadEnd),
    /// Mate is mapped but carries no CIGAR, so only its alignment start is known
    Unresolved {
        reference_id: usize,
        alignment_start: Position,
        strand: Strand,
    },
}

/// Grouping key shared by duplicates of one another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DuplicateKey {
    pub library: u32,
    pub first: ReadEnd,
    pub second: MateEnd,
}

impl DuplicateKey {
    pub fn fragment(library: u32, end: ReadEnd) -> Self {
        Self { library, first: end, second: MateEnd::Fragment }
    }

    /// Key of a pair whose mate end is known; the ends are stored lower first
    pub fn pair(library: u32, a: ReadEnd, b: ReadEnd) -> Self {
        let (first, second) = if b < a { (b, a) } else { (a, b) };
        Self { library, first, second: MateEnd::Mate(second) }
    }

    pub fn is_pair(&self) -> bool {
        !matches!(self.second, MateEnd::Fragment)
    }
}

/// Key of a record together with the end that bounds when its group can close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub key: DuplicateKey,
    pub anchor: ReadEnd,
}

/// The record's own unclipped 5' end
pub fn read_end(record: &ReadRecord) -> Result<ReadEnd> {
    let (reference_id, start) = match (record.reference_id, record.alignment_start) {
        (Some(id), Some(start)) => (id, start),
        _ => {
            return Err(MarkdupError::MalformedRecord {
                read_name: record.display_name(),
                reason: "mapped record has no reference or alignment start".to_string(),
            });
        }
    };

    validate_cigar(&record.cigar).map_err(|reason| MarkdupError::MalformedRecord {
        read_name: record.display_name(),
        reason,
    })?;

    let strand = record.strand();
    Ok(ReadEnd {
        reference_id,
        position: unclipped_five_prime(start, &record.cigar, strand),
        strand,
    })
}

/// Derives the duplicate key of a fragment or first-seen pair record
///
/// The anchor is the lower key end when the mate is still ahead on the same
/// reference, and the record's own end otherwise.
pub fn placement(record: &ReadRecord) -> Result<Placement> {
    let own = read_end(record)?;

    let mate = match record.mate.as_ref().filter(|_| record.has_mapped_mate()) {
        Some(mate) => mate,
        None => {
            return Ok(Placement {
                key: DuplicateKey::fragment(record.library, own),
                anchor: own,
            });
        }
    };

    let key = match &mate.cigar {
        Some(cigar) => {
            validate_cigar(cigar).map_err(|reason| MarkdupError::MalformedRecord {
                read_name: record.display_name(),
                reason: format!("mate CIGAR: {reason}"),
            })?;
            let mate_end = ReadEnd {
                reference_id: mate.reference_id,
                position: unclipped_five_prime(mate.alignment_start, cigar, mate.strand),
                strand: mate.strand,
            };
            DuplicateKey::pair(record.library, own, mate_end)
        }
        None => DuplicateKey {
            library: record.library,
            first: own,
            second: MateEnd::Unresolved {
                reference_id: mate.reference_id,
                alignment_start: mate.alignment_start,
                strand: mate.strand,
            },
        },
    };

    let mate_ahead = record.alignment_start.is_some_and(|start| {
        mate.reference_id == own.reference_id && mate.alignment_start >= start
    });
    let anchor = if mate_ahead && key.first.reference_id == own.reference_id {
        key.first.min(own)
    } else {
        own
    };

    Ok(Placement { key, anchor })
}
