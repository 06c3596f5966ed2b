//! Read records as seen by the duplicate marking engine
//!
//! A [`ReadRecord`] carries the alignment fields the engine needs, including the
//! inline mate summary (`MateInfo`) that makes single-pass marking possible.

use bstr::BString;
use noodles::core::Position;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::cigar::Op;

/// Strand of an aligned read
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn from_reverse(is_reverse: bool) -> Self {
        if is_reverse { Strand::Reverse } else { Strand::Forward }
    }
}

/// Alignment summary of a read's mate, carried on the read itself
///
/// `cigar` comes from the `MC` tag and `score` from the `ms` tag; either may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MateInfo {
    pub reference_id: usize,
    pub alignment_start: Position,
    pub strand: Strand,
    pub cigar: Option<Vec<Op>>,
    pub score: Option<u32>,
}

/// One aligned read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub name: BString,
    pub library: u32,
    pub flags: Flags,
    pub reference_id: Option<usize>,
    pub alignment_start: Option<Position>,
    pub cigar: Vec<Op>,
    pub quality_scores: Vec<u8>,
    pub mate: Option<MateInfo>,
}

impl ReadRecord {
    pub fn builder() -> ReadRecordBuilder {
        ReadRecordBuilder::default()
    }

    #[inline]
    pub fn strand(&self) -> Strand {
        Strand::from_reverse(self.flags.is_reverse_complemented())
    }

    /// Whether the record takes part in duplicate marking at all
    ///
    /// Unmapped, secondary and supplementary records are forwarded untouched.
    pub fn is_primary_mapped(&self) -> bool {
        !self.flags.is_unmapped()
            && !self.flags.is_secondary()
            && !self.flags.is_supplementary()
            && self.reference_id.is_some()
            && self.alignment_start.is_some()
    }

    /// Whether the record is one end of a pair with both ends mapped
    pub fn has_mapped_mate(&self) -> bool {
        self.flags.is_segmented() && !self.flags.is_mate_unmapped() && self.mate.is_some()
    }

    pub fn display_name(&self) -> String {
        self.name.to_string()
    }

    /// `reference:start` for diagnostics
    pub fn locus(&self) -> String {
        match (self.reference_id, self.alignment_start) {
            (Some(id), Some(start)) => format!("{}:{}", id, usize::from(start)),
            (Some(id), None) => format!("{id}:*"),
            _ => "*".to_string(),
        }
    }
}

/// Builder for [`ReadRecord`], mostly useful when the record does not come from a BAM file
#[derive(Debug, Default)]
pub struct ReadRecordBuilder {
    name: BString,
    library: u32,
    flags: Flags,
    reference_id: Option<usize>,
    alignment_start: Option<Position>,
    cigar: Vec<Op>,
    quality_scores: Vec<u8>,
    mate: Option<MateInfo>,
}

impl ReadRecordBuilder {
    pub fn name<N: Into<BString>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    pub fn library(mut self, library: u32) -> Self {
        self.library = library;
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn reverse(mut self, is_reverse: bool) -> Self {
        self.flags.set(Flags::REVERSE_COMPLEMENTED, is_reverse);
        self
    }

    pub fn mapped(mut self, reference_id: usize, alignment_start: Position, cigar: Vec<Op>) -> Self {
        self.reference_id = Some(reference_id);
        self.alignment_start = Some(alignment_start);
        self.cigar = cigar;
        self
    }

    pub fn quality_scores(mut self, quality_scores: Vec<u8>) -> Self {
        self.quality_scores = quality_scores;
        self
    }

    /// Marks the record as paired with a mapped mate described by `mate`
    pub fn mate(mut self, mate: MateInfo) -> Self {
        self.flags.insert(Flags::SEGMENTED);
        self.flags.remove(Flags::MATE_UNMAPPED);
        self.flags
            .set(Flags::MATE_REVERSE_COMPLEMENTED, mate.strand == Strand::Reverse);
        self.mate = Some(mate);
        self
    }

    pub fn build(self) -> ReadRecord {
        ReadRecord {
            name: self.name,
            library: self.library,
            flags: self.flags,
            reference_id: self.reference_id,
            alignment_start: self.alignment_start,
            cigar: self.cigar,
            quality_scores: self.quality_scores,
            mate: self.mate,
        }
    }
}
