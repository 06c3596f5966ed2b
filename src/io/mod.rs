//! BAM file I/O utilities
//!
//! Conversion of BAM records into engine [`ReadRecord`]s, library lookup from the
//! header, and output of records with their duplicate flag rewritten in place.

pub mod read_ahead;

use std::collections::HashMap;
use std::io::{self, Write};

use anyhow::Result;
use bstr::BString;
use noodles::bam;
use noodles::sam::alignment::io::Write as SamWrite;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::data::field::{Tag, Value};
use noodles::sam::header::Header as SamHeader;
use noodles::sam::header::record::value::map::read_group::tag as rg_tag;

use crate::coordinates::parse_cigar;
use crate::error::MarkdupError;
use crate::record::{MateInfo, ReadRecord, Strand};

pub use read_ahead::ReadAheadReader;

/// Offset of the flag field in a serialized BAM record
///
/// block_size (4) + ref_id (4) + pos (4) + l_read_name (1) + mapq (1) + bin (2) + n_cigar_op (2)
pub const FLAG_OFFSET: usize = 18;

/// The DUPLICATE flag bit in BAM format
pub const DUPLICATE_FLAG: u16 = 0x400;

/// Library name used for records without a usable read group
pub const UNKNOWN_LIBRARY: &str = "Unknown Library";

const MATE_CIGAR: Tag = Tag::new(b'M', b'C');
const MATE_SCORE: Tag = Tag::new(b'm', b's');

/// Maps read group ids to numeric library ids
///
/// Id 0 is always [`UNKNOWN_LIBRARY`]; read groups sharing an `LB` share an id.
#[derive(Debug, Clone)]
pub struct LibraryIndex {
    by_read_group: HashMap<Vec<u8>, u32>,
    names: Vec<String>,
}

impl LibraryIndex {
    pub fn from_header(header: &SamHeader) -> Self {
        let mut names = vec![UNKNOWN_LIBRARY.to_string()];
        let mut ids: HashMap<String, u32> = HashMap::from([(UNKNOWN_LIBRARY.to_string(), 0)]);
        let mut by_read_group = HashMap::new();

        for (id, rg) in header.read_groups() {
            let library = rg
                .other_fields()
                .get(&rg_tag::LIBRARY)
                .map_or_else(|| UNKNOWN_LIBRARY.to_string(), |lb| lb.to_string());
            let library_id = *ids.entry(library.clone()).or_insert_with(|| {
                names.push(library);
                (names.len() - 1) as u32
            });
            by_read_group.insert(id.to_vec(), library_id);
        }

        Self { by_read_group, names }
    }

    /// Library id for a read group id; unknown read groups map to 0
    pub fn library_id(&self, read_group: Option<&[u8]>) -> u32 {
        read_group
            .and_then(|rg| self.by_read_group.get(rg))
            .copied()
            .unwrap_or(0)
    }

    /// Library names indexed by id
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

fn malformed(read_name: &BString, reason: impl Into<String>) -> MarkdupError {
    MarkdupError::MalformedRecord { read_name: read_name.to_string(), reason: reason.into() }
}

/// Error mapper that owns the read name, so the name itself can still be moved
fn io_malformed(read_name: String) -> impl Fn(io::Error) -> MarkdupError {
    move |e| MarkdupError::MalformedRecord { read_name: read_name.clone(), reason: e.to_string() }
}

/// Builds the engine view of a BAM record
pub fn to_read_record(
    record: &bam::Record,
    libraries: &LibraryIndex,
) -> std::result::Result<ReadRecord, MarkdupError> {
    let flags = record.flags();
    let name: BString = record.name().map(|n| n.to_vec().into()).unwrap_or_default();
    if name.is_empty() && flags.is_segmented() {
        return Err(malformed(&name, "paired read has no name"));
    }
    let bad = io_malformed(name.to_string());

    let data = record.data();
    let read_group = match data.get(&Tag::READ_GROUP).transpose().map_err(&bad)? {
        Some(Value::String(rg)) => Some(rg.to_vec()),
        _ => None,
    };

    let cigar: Vec<Op> = record.cigar().iter().collect::<io::Result<_>>().map_err(&bad)?;
    let mate = if flags.is_segmented() && !flags.is_mate_unmapped() {
        Some(mate_info(record, &name)?)
    } else {
        None
    };

    Ok(ReadRecord {
        library: libraries.library_id(read_group.as_deref()),
        flags,
        reference_id: record.reference_sequence_id().transpose().map_err(&bad)?,
        alignment_start: record.alignment_start().transpose().map_err(&bad)?,
        cigar,
        quality_scores: record.quality_scores().as_ref().to_vec(),
        mate,
        name,
    })
}

fn mate_info(record: &bam::Record, name: &BString) -> std::result::Result<MateInfo, MarkdupError> {
    let bad = io_malformed(name.to_string());
    let reference_id = record.mate_reference_sequence_id().transpose().map_err(&bad)?;
    let alignment_start = record.mate_alignment_start().transpose().map_err(&bad)?;
    let (Some(reference_id), Some(alignment_start)) = (reference_id, alignment_start) else {
        return Err(malformed(name, "mate is flagged as mapped but has no position"));
    };

    let data = record.data();
    let cigar = match data.get(&MATE_CIGAR).transpose().map_err(&bad)? {
        Some(Value::String(text)) => Some(parse_cigar(text, &name.to_string())?),
        Some(_) => return Err(malformed(name, "MC tag is not a string")),
        None => None,
    };
    let score = data
        .get(&MATE_SCORE)
        .transpose()
        .map_err(&bad)?
        .and_then(|v| v.as_int())
        .and_then(|v| u32::try_from(v).ok());

    Ok(MateInfo {
        reference_id,
        alignment_start,
        strand: Strand::from_reverse(record.flags().is_mate_reverse_complemented()),
        cigar,
        score,
    })
}

/// Modify the DUPLICATE flag in a serialized BAM record
///
/// Returns the modified flag value.
#[inline]
pub fn toggle_duplicate_flag(data: &mut [u8], is_duplicate: bool) -> Option<u16> {
    if data.len() < FLAG_OFFSET + 2 {
        return None;
    }

    let flag = u16::from_le_bytes([data[FLAG_OFFSET], data[FLAG_OFFSET + 1]]);
    let new_flag = if is_duplicate { flag | DUPLICATE_FLAG } else { flag & !DUPLICATE_FLAG };

    data[FLAG_OFFSET..FLAG_OFFSET + 2].copy_from_slice(&new_flag.to_le_bytes());
    Some(new_flag)
}

/// Write the BAM header to an uncompressed sink (usually a BGZF writer)
pub fn write_header<W: Write>(writer: &mut W, header: &SamHeader) -> Result<()> {
    let mut header_buf = Vec::new();
    {
        let mut writer = bam::io::Writer::from(&mut header_buf);
        writer.write_header(header)?;
    }
    writer.write_all(&header_buf)?;
    Ok(())
}

/// Serialize an alignment record to BAM bytes, including its block size
pub fn record_to_bytes(header: &SamHeader, record: &dyn noodles::sam::alignment::Record) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    {
        let mut writer = bam::io::Writer::from(&mut data);
        writer.write_alignment_record(header, record)?;
    }
    Ok(data)
}

/// Write a record with its DUPLICATE flag set to `is_duplicate`
pub fn write_marked<W: Write>(
    writer: &mut W,
    header: &SamHeader,
    record: &bam::Record,
    is_duplicate: bool,
) -> Result<()> {
    let mut data = record_to_bytes(header, record)?;
    toggle_duplicate_flag(&mut data, is_duplicate);
    writer.write_all(&data)?;
    Ok(())
}
