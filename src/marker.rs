//! Stream driver
//!
//! [`DuplicateMarker`] consumes coordinate-sorted records one at a time, keeps the
//! open duplicate groups, finalizes them once the flush controller proves them
//! complete, and releases every record in input order with its decision.

use std::collections::HashMap;

use bstr::BString;

use crate::config::MarkerConfig;
use crate::coordinates::{leading_clip, read_length, reference_span, unclipped_start};
use crate::distance::MinimumDistance;
use crate::error::{MarkdupError, Result};
use crate::flush::FlushController;
use crate::key::{self, DuplicateKey};
use crate::metrics::MetricsCollector;
use crate::output::{Marked, OutputBuffer};
use crate::record::ReadRecord;
use crate::resolver;
use crate::tracker::{DuplicateGroup, GroupState, Member, PendingGroups};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MateId {
    library: u32,
    name: BString,
}

/// What a second-seen pair record inherits from its mate
///
/// `needs_score` and `needs_span` are set when the first-seen record carried no
/// `ms` or `MC` summary, so the arriving mate adds its own score or span.
#[derive(Debug, Clone, Copy)]
enum MateState {
    Pending { key: DuplicateKey, member: usize, needs_score: bool, needs_span: bool },
    Decided(bool),
}

/// Sort position; unplaced records sort after every placed one
type SortPosition = (bool, usize, usize);

fn sort_position(record: &ReadRecord) -> SortPosition {
    (
        record.reference_id.is_none(),
        record.reference_id.unwrap_or(0),
        record.alignment_start.map_or(0, usize::from),
    )
}

fn format_sort_position(p: &SortPosition) -> String {
    if p.0 { "*".to_string() } else { format!("{}:{}", p.1, p.2) }
}

/// Whether the mate of a first-seen pair record is still to come in sort order
fn mate_expected(record: &ReadRecord) -> bool {
    match (&record.mate, record.reference_id, record.alignment_start) {
        (Some(mate), Some(reference_id), Some(start)) => {
            (mate.reference_id, mate.alignment_start) >= (reference_id, start)
        }
        _ => false,
    }
}

/// Single-pass duplicate marking state machine
///
/// `P` is an opaque payload released with each record's decision.
#[derive(Debug)]
pub struct DuplicateMarker<P> {
    config: MarkerConfig,
    flush: FlushController,
    groups: PendingGroups,
    output: OutputBuffer<P>,
    mates: HashMap<MateId, MateState>,
    metrics: MetricsCollector,
    next_ordinal: u64,
    last_position: Option<SortPosition>,
}

impl<P> DuplicateMarker<P> {
    pub fn new(config: MarkerConfig) -> Result<Self> {
        Self::with_distance(config, MinimumDistance::from_config(config.minimum_distance))
    }

    /// Builds a marker around a shared minimum distance cell
    pub fn with_distance(config: MarkerConfig, distance: MinimumDistance) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            flush: FlushController::new(distance),
            groups: PendingGroups::new(),
            output: OutputBuffer::new(),
            mates: HashMap::new(),
            metrics: MetricsCollector::new(),
            next_ordinal: 0,
            last_position: None,
        })
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn minimum_distance(&self) -> u32 {
        self.flush.distance().get()
    }

    /// Number of groups still open
    pub fn pending_groups(&self) -> usize {
        self.groups.len()
    }

    /// Number of records held back waiting for a decision
    pub fn buffered_records(&self) -> usize {
        self.output.len()
    }

    /// Feeds the next record of the sorted stream
    pub fn push(&mut self, read: ReadRecord, payload: P) -> Result<()> {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.check_sorted(&read)?;

        if !read.is_primary_mapped() {
            if read.flags.is_secondary() || read.flags.is_supplementary() {
                self.metrics.add_secondary_or_supplementary(read.library);
            } else {
                self.metrics.add_unmapped(read.library);
            }
            if read.reference_id.is_none() {
                // unplaced reads come last; nothing mapped can follow
                self.flush_all();
            }
            self.output.push_resolved(ordinal, payload, false);
            return Ok(());
        }

        let own = key::read_end(&read)?;
        let start = read.alignment_start.ok_or_else(|| MarkdupError::MalformedRecord {
            read_name: read.display_name(),
            reason: "mapped record has no alignment start".to_string(),
        })?;
        let unclipped = unclipped_start(start, &read.cigar);

        if self.flush.enter_reference(own.reference_id) {
            self.flush_all();
        }
        self.flush
            .distance()
            .observe(read_length(&read.cigar), leading_clip(&read.cigar));

        if read.has_mapped_mate() {
            let id = MateId { library: read.library, name: read.name.clone() };
            match self.mates.remove(&id) {
                Some(MateState::Decided(is_duplicate)) => {
                    self.metrics.add_paired_read(read.library, is_duplicate);
                    self.output.push_resolved(ordinal, payload, is_duplicate);
                    self.advance(unclipped);
                    return Ok(());
                }
                Some(MateState::Pending { key, member, needs_score, needs_span }) => {
                    match self.groups.member_mut(&key, member) {
                        Some(member) => {
                            if needs_score {
                                member.rank.score += self
                                    .config
                                    .scoring_strategy
                                    .score(&read.quality_scores, self.config.quality_threshold);
                            }
                            if needs_span {
                                member.rank.reference_length += reference_span(&read.cigar) as u64;
                            }
                            member.ordinals.push(ordinal);
                            self.output.push_pending(ordinal, payload);
                        }
                        None => {
                            log::warn!("mate of '{}' lost its group; leaving it unmarked", id.name);
                            self.output.push_resolved(ordinal, payload, false);
                        }
                    }
                    self.advance(unclipped);
                    return Ok(());
                }
                None => {}
            }
        }

        let name = read.display_name();
        self.flush.check(&name, own.reference_id, unclipped)?;
        let placement = key::placement(&read)?;
        self.flush
            .check(&name, placement.anchor.reference_id, placement.anchor.position)?;

        let rank = self
            .config
            .scoring_strategy
            .rank(&read, self.config.quality_threshold, ordinal);
        let is_pair = placement.key.is_pair();
        let member = Member {
            rank,
            library: read.library,
            name: read.name.clone(),
            is_pair,
            ordinals: vec![ordinal],
            is_duplicate: None,
        };
        let index = self.groups.add(placement.key, placement.anchor, member);

        if is_pair && mate_expected(&read) {
            let (needs_score, needs_span) = read
                .mate
                .as_ref()
                .map_or((false, false), |mate| (mate.score.is_none(), mate.cigar.is_none()));
            self.mates.insert(
                MateId { library: read.library, name: read.name },
                MateState::Pending { key: placement.key, member: index, needs_score, needs_span },
            );
        }

        self.output.push_pending(ordinal, payload);
        self.advance(unclipped);
        Ok(())
    }

    /// Releases the next record in input order once its decision is known
    pub fn pop(&mut self) -> Option<Marked<P>> {
        self.output.pop()
    }

    /// Ends the stream: every open group is finalized regardless of distance
    pub fn finish(&mut self) {
        self.flush_all();
        debug_assert!(self.output.is_fully_resolved());

        let orphans = self
            .mates
            .values()
            .filter(|state| matches!(state, MateState::Decided(_)))
            .count();
        if orphans > 0 {
            log::warn!("{orphans} paired reads never met their mate in the input");
        }
        self.mates.clear();
    }

    fn check_sorted(&mut self, read: &ReadRecord) -> Result<()> {
        let current = sort_position(read);
        if let Some(previous) = self.last_position {
            if current < previous {
                return Err(MarkdupError::UnsortedInput {
                    read_name: read.display_name(),
                    previous: format_sort_position(&previous),
                    current: format_sort_position(&current),
                });
            }
        }
        self.last_position = Some(current);
        Ok(())
    }

    fn advance(&mut self, unclipped: i64) {
        if let Some(watermark) = self.flush.advance(unclipped) {
            while let Some(group) = self.groups.pop_covered(&watermark) {
                self.emit(group);
            }
        }
    }

    fn flush_all(&mut self) {
        while let Some(group) = self.groups.pop_next() {
            self.emit(group);
        }
    }

    fn emit(&mut self, mut group: DuplicateGroup) {
        resolver::resolve(&mut group);

        for member in &group.members {
            let is_duplicate = member.is_duplicate.unwrap_or(false);
            for &ordinal in &member.ordinals {
                self.output.resolve(ordinal, is_duplicate);
                if member.is_pair {
                    self.metrics.add_paired_read(member.library, is_duplicate);
                } else {
                    self.metrics.add_unpaired(member.library, is_duplicate);
                }
            }
            if member.is_pair && !member.mate_seen() {
                let id = MateId { library: member.library, name: member.name.clone() };
                if let Some(state) = self.mates.get_mut(&id) {
                    *state = MateState::Decided(is_duplicate);
                }
            }
        }

        group.transition(GroupState::Emitted);
    }
}

/// Iterator adapter marking duplicates over a fallible stream of `(record, payload)`
///
/// Stops after the first error.
pub struct MarkDuplicates<I, P> {
    inner: I,
    marker: DuplicateMarker<P>,
    exhausted: bool,
    failed: bool,
}

impl<I, P> MarkDuplicates<I, P> {
    pub fn new(inner: I, config: MarkerConfig) -> Result<Self> {
        Ok(Self::with_marker(inner, DuplicateMarker::new(config)?))
    }

    pub fn with_marker(inner: I, marker: DuplicateMarker<P>) -> Self {
        Self { inner, marker, exhausted: false, failed: false }
    }

    pub fn marker(&self) -> &DuplicateMarker<P> {
        &self.marker
    }
}

impl<I, P, E> Iterator for MarkDuplicates<I, P>
where
    I: Iterator<Item = std::result::Result<(ReadRecord, P), E>>,
    E: From<MarkdupError>,
{
    type Item = std::result::Result<Marked<P>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(marked) = self.marker.pop() {
                return Some(Ok(marked));
            }
            if self.exhausted {
                return None;
            }
            match self.inner.next() {
                Some(Ok((read, payload))) => {
                    if let Err(e) = self.marker.push(read, payload) {
                        self.failed = true;
                        return Some(Err(e.into()));
                    }
                }
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => {
                    self.exhausted = true;
                    self.marker.finish();
                }
            }
        }
    }
}
