//! BAM-to-BAM duplicate marking run

use std::fs::File;
use std::io;
use std::time::Instant;

use anyhow::{Context, Result};
use noodles::bam;
use noodles::bgzf::io::Writer as BgzfWriter;

use crate::args::Args;
use crate::io::{LibraryIndex, ReadAheadReader, to_read_record, write_header, write_marked};
use crate::marker::{DuplicateMarker, MarkDuplicates};
use crate::metrics::write_metrics;
use crate::utils::{format_duration, format_duration_verbose, percent};

const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Totals of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records: u64,
    pub duplicates: u64,
    pub removed: u64,
}

pub fn run_markdup(args: &Args) -> Result<RunSummary> {
    let total_start = Instant::now();
    let config = args.marker_config()?;

    let mut reader = bam::io::reader::Builder::default()
        .build_from_path(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let header = reader.read_header().context("failed to read BAM header")?;
    let libraries = LibraryIndex::from_header(&header);

    log::info!(
        "marking duplicates in {} ({} libraries, minimum distance {}){}",
        args.input.display(),
        libraries.names().len() - 1,
        config.minimum_distance.map_or_else(|| "auto".to_string(), |d| d.to_string()),
        if args.single_threaded { " (single-threaded mode)" } else { "" }
    );

    let records: Box<dyn Iterator<Item = io::Result<bam::Record>> + '_> = if args.single_threaded {
        Box::new(reader.records())
    } else {
        Box::new(ReadAheadReader::spawn(reader, args.batch_size))
    };
    let input = records.map(|result| -> Result<_> {
        let record = result.context("failed to read BAM record")?;
        let read = to_read_record(&record, &libraries)?;
        Ok((read, record))
    });
    let mut marked = MarkDuplicates::with_marker(input, DuplicateMarker::new(config)?);

    let out_file = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut writer = BgzfWriter::new(out_file);
    write_header(&mut writer, &header)?;

    let mut summary = RunSummary::default();
    for result in marked.by_ref() {
        let item = result.context("duplicate marking failed")?;
        summary.records += 1;
        if summary.records % PROGRESS_INTERVAL == 0 {
            log::info!(
                "  processed {} records, {} duplicates so far",
                summary.records,
                summary.duplicates
            );
        }

        if item.is_duplicate {
            summary.duplicates += 1;
            if args.remove_duplicates {
                summary.removed += 1;
                continue;
            }
        }
        write_marked(&mut writer, &header, &item.record, item.is_duplicate)?;
    }
    writer.finish().context("failed to finish output BAM")?;

    let marker = marked.marker();
    if let Some(path) = &args.metrics {
        let report = marker.metrics().report(libraries.names());
        write_metrics(path, &report)?;
        log::info!("wrote metrics for {} libraries to {}", report.len(), path.display());
    }

    log::info!(
        "  found {} duplicates among {} records ({:.2}%), final minimum distance {}",
        marker.metrics().total_duplicates(),
        summary.records,
        percent(marker.metrics().total_duplicates(), summary.records),
        marker.minimum_distance()
    );
    if args.remove_duplicates {
        log::info!("  removed {} duplicates from the output", summary.removed);
    }
    let (total_m, total_s) = format_duration(total_start.elapsed());
    log::info!(
        "done in {total_m} min {total_s} sec ({})",
        format_duration_verbose(total_start.elapsed())
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarkdupError;
    use crate::io::record_to_bytes;
    use bstr::BString;
    use noodles::core::Position;
    use noodles::sam::alignment::RecordBuf;
    use noodles::sam::alignment::record::Flags;
    use noodles::sam::alignment::record::cigar::Op;
    use noodles::sam::alignment::record::cigar::op::Kind;
    use noodles::sam::alignment::record::data::field::Tag;
    use noodles::sam::alignment::record_buf::data::field::Value;
    use noodles::sam::alignment::record_buf::{Cigar, Data, QualityScores, Sequence};
    use noodles::sam::header::record::value::Map;
    use noodles::sam::header::record::value::map::read_group::tag as rg_tag;
    use noodles::sam::header::record::value::map::{ReadGroup, ReferenceSequence};
    use std::io::Write;
    use std::num::NonZeroUsize;
    use std::path::Path;

    fn fragment(name: &str, start: usize, ops: Vec<Op>, reverse: bool, qual: u8) -> RecordBuf {
        let len: usize = ops.iter().filter(|op| op.kind().consumes_read()).map(|op| op.len()).sum();
        let data: Data = [(Tag::READ_GROUP, Value::from("rg1"))].into_iter().collect();
        let mut flags = Flags::empty();
        flags.set(Flags::REVERSE_COMPLEMENTED, reverse);
        RecordBuf::builder()
            .set_name(BString::from(name))
            .set_flags(flags)
            .set_reference_sequence_id(0)
            .set_alignment_start(Position::try_from(start).unwrap())
            .set_cigar(Cigar::from(ops))
            .set_sequence(Sequence::from(vec![b'A'; len]))
            .set_quality_scores(QualityScores::from(vec![qual; len]))
            .set_data(data)
            .build()
    }

    fn write_input(path: &Path, records: &[RecordBuf]) {
        let rg = Map::<ReadGroup>::builder().insert(rg_tag::LIBRARY, String::from("libA")).build().unwrap();
        let header = noodles::sam::Header::builder()
            .add_reference_sequence("chr1", Map::<ReferenceSequence>::new(NonZeroUsize::new(100_000).unwrap()))
            .add_read_group("rg1", rg)
            .build();
        let mut writer = BgzfWriter::new(File::create(path).unwrap());
        write_header(&mut writer, &header).unwrap();
        for record in records {
            writer.write_all(&record_to_bytes(&header, record).unwrap()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn read_output(path: &Path) -> Vec<(String, bool)> {
        let mut reader = bam::io::reader::Builder::default().build_from_path(path).unwrap();
        reader.read_header().unwrap();
        reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r.name().unwrap().to_string(), r.flags().is_duplicate())
            })
            .collect()
    }

    fn args_for(dir: &Path) -> Args {
        Args {
            input: dir.join("in.bam"),
            output: dir.join("out.bam"),
            metrics: Some(dir.join("metrics.txt")),
            minimum_distance: None,
            quality_threshold: 15,
            scoring_strategy: Default::default(),
            remove_duplicates: false,
            single_threaded: false,
            batch_size: 2,
        }
    }

    fn duplicate_fragments() -> Vec<RecordBuf> {
        vec![
            fragment("a", 100, vec![Op::new(Kind::Match, 50)], false, 20),
            fragment("b", 100, vec![Op::new(Kind::Match, 50)], false, 30),
            fragment("c", 103, vec![Op::new(Kind::SoftClip, 3), Op::new(Kind::Match, 47)], false, 30),
            fragment("d", 400, vec![Op::new(Kind::Match, 50)], true, 30),
        ]
    }

    #[test]
    fn test_marks_duplicates_and_writes_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let args = args_for(dir.path());
        write_input(&args.input, &duplicate_fragments());

        let summary = run_markdup(&args).unwrap();
        assert_eq!(summary, RunSummary { records: 4, duplicates: 2, removed: 0 });

        assert_eq!(
            read_output(&args.output),
            vec![
                ("a".to_string(), true),
                ("b".to_string(), false),
                ("c".to_string(), true),
                ("d".to_string(), false),
            ]
        );

        let metrics = std::fs::read_to_string(args.metrics.as_ref().unwrap()).unwrap();
        let row = metrics.lines().nth(1).unwrap();
        assert!(row.starts_with("libA\t4\t0\t0\t0\t2\t0\t0.5\t"), "row was {row}");
    }

    #[test]
    fn test_single_threaded_remove_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args_for(dir.path());
        args.single_threaded = true;
        args.remove_duplicates = true;
        args.metrics = None;
        write_input(&args.input, &duplicate_fragments());

        let summary = run_markdup(&args).unwrap();
        assert_eq!(summary.removed, 2);
        assert_eq!(
            read_output(&args.output),
            vec![("b".to_string(), false), ("d".to_string(), false)]
        );
    }

    #[test]
    fn test_insufficient_distance_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args_for(dir.path());
        args.minimum_distance = Some(989);
        write_input(
            &args.input,
            &[
                fragment("r1", 1000, vec![Op::new(Kind::Match, 100)], false, 30),
                fragment("r2", 2000, vec![Op::new(Kind::SoftClip, 10), Op::new(Kind::Match, 100)], false, 30),
                fragment("r3", 3000, vec![Op::new(Kind::SoftClip, 2000), Op::new(Kind::Match, 100)], true, 30),
            ],
        );

        let err = run_markdup(&args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MarkdupError>(),
            Some(MarkdupError::MinimumDistanceTooSmall { required: 990, .. })
        ));

        args.minimum_distance = Some(990);
        assert_eq!(run_markdup(&args).unwrap().duplicates, 0);
    }
}
