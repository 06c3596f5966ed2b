//! Background read-ahead of BAM records
//!
//! A reader thread decodes records and sends them to the marking thread in batches
//! over a bounded channel. Decode errors travel through the channel and end the
//! stream.

use std::io::{self, Read};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use noodles::bam;

/// Number of batches buffered in the channel
const CHANNEL_CAPACITY: usize = 16;

type Batch = io::Result<Vec<bam::Record>>;

pub struct ReadAheadReader {
    receiver: Option<Receiver<Batch>>,
    handle: Option<JoinHandle<()>>,
    batch: std::vec::IntoIter<bam::Record>,
    done: bool,
}

impl ReadAheadReader {
    /// Starts reading `reader` (positioned after the header) on a background thread
    pub fn spawn<R>(reader: bam::io::Reader<R>, batch_size: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let batch_size = batch_size.max(1);
        let handle = thread::spawn(move || reader_thread(reader, tx, batch_size));

        Self { receiver: Some(rx), handle: Some(handle), batch: Vec::new().into_iter(), done: false }
    }
}

fn reader_thread<R: Read>(mut reader: bam::io::Reader<R>, tx: Sender<Batch>, batch_size: usize) {
    let mut batch = Vec::with_capacity(batch_size);
    loop {
        let mut record = bam::Record::default();
        match reader.read_record(&mut record) {
            Ok(0) => {
                if !batch.is_empty() {
                    let _ = tx.send(Ok(batch));
                }
                break;
            }
            Ok(_) => {
                batch.push(record);
                if batch.len() >= batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    if tx.send(Ok(full)).is_err() {
                        // receiver dropped
                        break;
                    }
                }
            }
            Err(e) => {
                if !batch.is_empty() {
                    let _ = tx.send(Ok(std::mem::take(&mut batch)));
                }
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

impl Iterator for ReadAheadReader {
    type Item = io::Result<bam::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.batch.next() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            match self.receiver.as_ref()?.recv() {
                Ok(Ok(batch)) => self.batch = batch.into_iter(),
                Ok(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Err(_) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

impl Drop for ReadAheadReader {
    fn drop(&mut self) {
        // unblock the reader thread before joining it
        drop(self.receiver.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("read-ahead thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{record_to_bytes, write_header};
    use bstr::BString;
    use noodles::bgzf::io::Writer as BgzfWriter;
    use noodles::core::Position;
    use noodles::sam::alignment::RecordBuf;
    use noodles::sam::alignment::record::cigar::Op;
    use noodles::sam::alignment::record::cigar::op::Kind;
    use noodles::sam::alignment::record_buf::{Cigar, QualityScores, Sequence};
    use noodles::sam::header::record::value::Map;
    use noodles::sam::header::record::value::map::ReferenceSequence;
    use std::io::Write;
    use std::num::NonZeroUsize;

    fn write_bam(path: &std::path::Path, n: usize) {
        let header = noodles::sam::Header::builder()
            .add_reference_sequence("chr1", Map::<ReferenceSequence>::new(NonZeroUsize::new(1_000_000).unwrap()))
            .build();
        let mut writer = BgzfWriter::new(std::fs::File::create(path).unwrap());
        write_header(&mut writer, &header).unwrap();
        for i in 0..n {
            let record = RecordBuf::builder()
                .set_name(BString::from(format!("r{i}")))
                .set_reference_sequence_id(0)
                .set_alignment_start(Position::try_from(i + 1).unwrap())
                .set_cigar(Cigar::from(vec![Op::new(Kind::Match, 4)]))
                .set_sequence(Sequence::from(b"ACGT".to_vec()))
                .set_quality_scores(QualityScores::from(vec![30; 4]))
                .build();
            writer.write_all(&record_to_bytes(&header, &record).unwrap()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_reads_every_record_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.bam");
        write_bam(&path, 1000);

        let mut reader = bam::io::reader::Builder::default().build_from_path(&path).unwrap();
        reader.read_header().unwrap();
        let names: Vec<String> = ReadAheadReader::spawn(reader, 7)
            .map(|r| r.unwrap().name().unwrap().to_string())
            .collect();

        assert_eq!(names.len(), 1000);
        assert_eq!(names[0], "r0");
        assert_eq!(names[999], "r999");
    }

    #[test]
    fn test_dropping_early_stops_reader_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.bam");
        write_bam(&path, 5000);

        let mut reader = bam::io::reader::Builder::default().build_from_path(&path).unwrap();
        reader.read_header().unwrap();
        let mut ahead = ReadAheadReader::spawn(reader, 1);
        assert!(ahead.next().is_some());
        drop(ahead);
    }
}
