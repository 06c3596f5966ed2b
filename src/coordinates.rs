//! Coordinate model: unclipped 5' positions from alignment start, CIGAR and strand
//!
//! All positions are 1-based and signed, since an unclipped start can fall before
//! the first base of the reference.

use noodles::core::Position;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;

use crate::error::{MarkdupError, Result};
use crate::record::Strand;

#[inline]
fn is_clip(kind: Kind) -> bool {
    matches!(kind, Kind::SoftClip | Kind::HardClip)
}

/// Total length of the soft/hard clips before the first non-clip operation
pub fn leading_clip(cigar: &[Op]) -> usize {
    cigar
        .iter()
        .take_while(|op| is_clip(op.kind()))
        .map(|op| op.len())
        .sum()
}

/// Total length of the soft/hard clips after the last reference-consuming operation
pub fn trailing_clip(cigar: &[Op]) -> usize {
    let mut clipped = 0;
    let mut saw_ref_op = false;
    for op in cigar {
        if op.kind().consumes_reference() {
            clipped = 0;
            saw_ref_op = true;
        } else if is_clip(op.kind()) && saw_ref_op {
            clipped += op.len();
        }
    }
    clipped
}

/// Number of reference bases covered by the alignment (M, D, N, =, X)
pub fn reference_span(cigar: &[Op]) -> usize {
    cigar
        .iter()
        .filter(|op| op.kind().consumes_reference())
        .map(|op| op.len())
        .sum()
}

/// Number of read bases, including soft clips
pub fn read_length(cigar: &[Op]) -> usize {
    cigar
        .iter()
        .filter(|op| op.kind().consumes_read())
        .map(|op| op.len())
        .sum()
}

/// Alignment start minus the leading clips
pub fn unclipped_start(alignment_start: Position, cigar: &[Op]) -> i64 {
    usize::from(alignment_start) as i64 - leading_clip(cigar) as i64
}

/// Inclusive alignment end plus the trailing clips
pub fn unclipped_end(alignment_start: Position, cigar: &[Op]) -> i64 {
    usize::from(alignment_start) as i64 + reference_span(cigar) as i64 - 1
        + trailing_clip(cigar) as i64
}

/// Unclipped position of the read's 5' end
///
/// For forward reads this is the unclipped start, for reverse reads the unclipped end.
#[inline]
pub fn unclipped_five_prime(alignment_start: Position, cigar: &[Op], strand: Strand) -> i64 {
    match strand {
        Strand::Forward => unclipped_start(alignment_start, cigar),
        Strand::Reverse => unclipped_end(alignment_start, cigar),
    }
}

/// Checks that the coordinate model can place a read with this CIGAR
pub fn validate_cigar(cigar: &[Op]) -> std::result::Result<(), String> {
    if let Some(op) = cigar.iter().find(|op| op.len() == 0) {
        return Err(format!("zero-length CIGAR operation {:?}", op.kind()));
    }
    if reference_span(cigar) == 0 {
        return Err("CIGAR consumes no reference bases".to_string());
    }
    Ok(())
}

fn kind_from_byte(b: u8) -> Option<Kind> {
    let kind = match b {
        b'M' => Kind::Match,
        b'I' => Kind::Insertion,
        b'D' => Kind::Deletion,
        b'N' => Kind::Skip,
        b'S' => Kind::SoftClip,
        b'H' => Kind::HardClip,
        b'P' => Kind::Pad,
        b'=' => Kind::SequenceMatch,
        b'X' => Kind::SequenceMismatch,
        _ => return None,
    };
    Some(kind)
}

/// Parses SAM CIGAR text such as `6S42M28S`
///
/// Used for the `MC` tag. `read_name` only feeds the error message.
pub fn parse_cigar(text: &[u8], read_name: &str) -> Result<Vec<Op>> {
    let malformed = |reason: String| MarkdupError::MalformedRecord {
        read_name: read_name.to_string(),
        reason,
    };

    if text.is_empty() || text == b"*" {
        return Err(malformed("empty mate CIGAR".to_string()));
    }

    let mut ops = Vec::new();
    let mut len: Option<usize> = None;
    for &b in text {
        if b.is_ascii_digit() {
            let digit = usize::from(b - b'0');
            let next = len
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|n| n.checked_add(digit))
                .ok_or_else(|| malformed("CIGAR operation length overflows".to_string()))?;
            len = Some(next);
        } else {
            let kind = kind_from_byte(b).ok_or_else(|| {
                malformed(format!("invalid CIGAR operation '{}'", char::from(b)))
            })?;
            let n = len
                .take()
                .ok_or_else(|| malformed(format!("CIGAR operation '{}' has no length", char::from(b))))?;
            if n == 0 {
                return Err(malformed(format!("zero-length CIGAR operation '{}'", char::from(b))));
            }
            ops.push(Op::new(kind, n));
        }
    }

    if len.is_some() {
        return Err(malformed("CIGAR ends with a dangling length".to_string()));
    }

    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(n: usize) -> Position {
        Position::try_from(n).unwrap()
    }

    fn cigar(s: &str) -> Vec<Op> {
        parse_cigar(s.as_bytes(), "test").unwrap()
    }

    #[test]
    fn test_forward_subtracts_leading_clips() {
        assert_eq!(unclipped_five_prime(pos(2000), &cigar("10S100M"), Strand::Forward), 1990);
        assert_eq!(unclipped_five_prime(pos(12), &cigar("6S42M28S"), Strand::Forward), 6);
        assert_eq!(unclipped_five_prime(pos(100), &cigar("5H3S20M"), Strand::Forward), 92);
    }

    #[test]
    fn test_forward_can_go_below_one() {
        assert_eq!(unclipped_five_prime(pos(5), &cigar("10S40M"), Strand::Forward), -5);
    }

    #[test]
    fn test_reverse_adds_span_and_trailing_clips() {
        // 46 + 73 - 1
        assert_eq!(unclipped_five_prime(pos(46), &cigar("3S73M"), Strand::Reverse), 118);
        assert_eq!(unclipped_five_prime(pos(51), &cigar("8S68M"), Strand::Reverse), 118);
        assert_eq!(unclipped_five_prime(pos(100), &cigar("50M10S"), Strand::Reverse), 159);
        assert_eq!(unclipped_five_prime(pos(3000), &cigar("2000S100M"), Strand::Reverse), 3099);
    }

    #[test]
    fn test_reverse_counts_deletions_and_skips_but_not_insertions() {
        assert_eq!(unclipped_end(pos(105), &cigar("5I45M")), 149);
        assert_eq!(unclipped_end(pos(1), &cigar("10M5D10M100N10M2S")), 137);
    }

    #[test]
    fn test_unclipped_start_is_strand_independent() {
        assert_eq!(unclipped_start(pos(3000), &cigar("2000S100M")), 1000);
    }

    #[test]
    fn test_spans_and_lengths() {
        let ops = cigar("5H3S20M2I4D10M6S");
        assert_eq!(leading_clip(&ops), 8);
        assert_eq!(trailing_clip(&ops), 6);
        assert_eq!(reference_span(&ops), 34);
        assert_eq!(read_length(&ops), 41);
    }

    #[test]
    fn test_validate_cigar() {
        assert!(validate_cigar(&cigar("100M")).is_ok());
        assert!(validate_cigar(&[Op::new(Kind::Match, 0)]).is_err());
        assert!(validate_cigar(&cigar("10S")).is_err());
        assert!(validate_cigar(&[]).is_err());
    }

    #[test]
    fn test_parse_cigar_rejects_garbage() {
        assert!(parse_cigar(b"", "r").is_err());
        assert!(parse_cigar(b"*", "r").is_err());
        assert!(parse_cigar(b"10Q", "r").is_err());
        assert!(parse_cigar(b"M", "r").is_err());
        assert!(parse_cigar(b"10M5", "r").is_err());
        assert!(parse_cigar(b"0M", "r").is_err());
    }

    #[test]
    fn test_parse_cigar_error_is_malformed_record() {
        match parse_cigar(b"12Z", "readX") {
            Err(MarkdupError::MalformedRecord { read_name, .. }) => assert_eq!(read_name, "readX"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
