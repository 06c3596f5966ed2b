//! Duplicate resolver: picks the representative of a finalized group

use crate::tracker::{DuplicateGroup, GroupState};

/// Marks every member of `group` and finalizes it
///
/// The best-ranked member is kept; all others become duplicates. Returns the
/// index of the kept member, or `None` for an empty group.
pub fn resolve(group: &mut DuplicateGroup) -> Option<usize> {
    let best = group
        .members
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.rank.cmp(&b.rank))
        .map(|(i, _)| i);

    for (i, member) in group.members.iter_mut().enumerate() {
        member.is_duplicate = Some(Some(i) != best);
    }

    if group.members.len() > 1 {
        log::debug!(
            "group {:?} resolved: kept '{}' out of {} members",
            group.key,
            best.map(|i| group.members[i].name.to_string()).unwrap_or_default(),
            group.members.len()
        );
    }

    group.transition(GroupState::Finalized);
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{DuplicateKey, ReadEnd};
    use crate::record::Strand;
    use crate::scoring::Rank;
    use crate::tracker::{Member, PendingGroups};

    fn member(name: &str, score: u32, reference_length: u64, ordinal: u64) -> Member {
        Member {
            rank: Rank { score, reference_length, name: name.into(), ordinal },
            library: 0,
            name: name.into(),
            is_pair: false,
            ordinals: vec![ordinal],
            is_duplicate: None,
        }
    }

    fn group_of(members: Vec<Member>) -> DuplicateGroup {
        let end = ReadEnd { reference_id: 0, position: 1, strand: Strand::Forward };
        let key = DuplicateKey::fragment(0, end);
        let mut groups = PendingGroups::new();
        for m in members {
            groups.add(key, end, m);
        }
        groups.pop_next().unwrap()
    }

    fn flags(group: &DuplicateGroup) -> Vec<bool> {
        group.members.iter().map(|m| m.is_duplicate.unwrap()).collect()
    }

    #[test]
    fn test_singleton_is_never_duplicate() {
        let mut group = group_of(vec![member("only", 0, 0, 0)]);
        assert_eq!(resolve(&mut group), Some(0));
        assert_eq!(flags(&group), vec![false]);
        assert_eq!(group.state, GroupState::Finalized);
    }

    #[test]
    fn test_highest_score_kept() {
        let mut group = group_of(vec![
            member("a", 50, 100, 0),
            member("b", 70, 100, 1),
            member("c", 40, 100, 2),
        ]);
        assert_eq!(resolve(&mut group), Some(1));
        assert_eq!(flags(&group), vec![true, false, true]);
    }

    #[test]
    fn test_exactly_one_kept_when_all_tie() {
        let mut group = group_of(vec![
            member("READB", 10, 10, 0),
            member("READA", 10, 10, 1),
            member("READC", 10, 10, 2),
        ]);
        resolve(&mut group);
        assert_eq!(flags(&group), vec![true, false, true]);
    }

    #[test]
    fn test_choice_is_independent_of_member_order() {
        let members = vec![member("x", 5, 90, 0), member("y", 5, 100, 1), member("z", 4, 200, 2)];
        let mut forward = group_of(members.clone());
        let mut reversed = group_of(members.into_iter().rev().collect());
        resolve(&mut forward);
        resolve(&mut reversed);
        let kept = |g: &DuplicateGroup| {
            g.members.iter().find(|m| m.is_duplicate == Some(false)).unwrap().name.clone()
        };
        assert_eq!(kept(&forward), "y");
        assert_eq!(kept(&reversed), "y");
    }
}
