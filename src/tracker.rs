//! Pending-group tracker
//!
//! Open duplicate groups live in a table keyed by [`DuplicateKey`]. A min-heap over
//! the groups' anchors yields them in flush order.

use std::collections::{BinaryHeap, HashMap};

use bstr::BString;

use crate::flush::Watermark;
use crate::key::{DuplicateKey, ReadEnd};
use crate::scoring::Rank;

/// Lifecycle of a duplicate group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// More members may still arrive
    Open,
    /// No more members can arrive and a representative has been chosen
    Finalized,
    /// Decisions handed to the output
    Emitted,
}

/// A fragment, or a pair represented by its first-seen record
#[derive(Debug, Clone)]
pub struct Member {
    pub rank: Rank,
    pub library: u32,
    pub name: BString,
    pub is_pair: bool,
    /// Input ordinals of the member's records; a pair gains its second once the mate arrives
    pub ordinals: Vec<u64>,
    pub is_duplicate: Option<bool>,
}

impl Member {
    pub fn mate_seen(&self) -> bool {
        self.ordinals.len() > 1
    }
}

#[derive(Debug)]
pub struct DuplicateGroup {
    pub key: DuplicateKey,
    pub anchor: ReadEnd,
    pub state: GroupState,
    pub members: Vec<Member>,
}

impl DuplicateGroup {
    fn new(key: DuplicateKey, anchor: ReadEnd) -> Self {
        Self { key, anchor, state: GroupState::Open, members: Vec::with_capacity(1) }
    }

    pub fn transition(&mut self, next: GroupState) {
        debug_assert!(
            matches!(
                (self.state, next),
                (GroupState::Open, GroupState::Finalized) | (GroupState::Finalized, GroupState::Emitted)
            ),
            "illegal group transition {:?} -> {next:?}",
            self.state
        );
        self.state = next;
    }
}

/// Flush queue entry, ordered so that `BinaryHeap` pops the lowest anchor first
#[derive(Debug, PartialEq, Eq)]
struct FlushItem {
    anchor: ReadEnd,
    seq: u64,
    key: DuplicateKey,
}

impl Ord for FlushItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.anchor, other.seq).cmp(&(self.anchor, self.seq))
    }
}

impl PartialOrd for FlushItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct PendingGroups {
    open: HashMap<DuplicateKey, DuplicateGroup>,
    queue: BinaryHeap<FlushItem>,
    next_seq: u64,
}

impl PendingGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Adds a member to the group for `key`, opening it at `anchor` if needed
    ///
    /// Returns the member's index within the group.
    pub fn add(&mut self, key: DuplicateKey, anchor: ReadEnd, member: Member) -> usize {
        let group = self.open.entry(key).or_insert_with(|| {
            self.queue.push(FlushItem { anchor, seq: self.next_seq, key });
            self.next_seq += 1;
            DuplicateGroup::new(key, anchor)
        });
        group.members.push(member);
        group.members.len() - 1
    }

    pub fn member_mut(&mut self, key: &DuplicateKey, index: usize) -> Option<&mut Member> {
        self.open.get_mut(key).and_then(|group| group.members.get_mut(index))
    }

    /// Removes and returns the next group whose anchor is behind `watermark`
    pub fn pop_covered(&mut self, watermark: &Watermark) -> Option<DuplicateGroup> {
        let next = self.queue.peek()?;
        if !watermark.covers(&next.anchor) {
            return None;
        }
        self.pop_next()
    }

    /// Removes and returns the open group with the lowest anchor
    pub fn pop_next(&mut self) -> Option<DuplicateGroup> {
        let item = self.queue.pop()?;
        self.open.remove(&item.key)
    }
}
