//! # Chunk Producer
//!
//! Enumerates log files, reads them line by line and feeds fixed-size
//! chunks into the bounded task queue.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::Sender;
use tracing::{info, warn};

use crate::chunk::{Chunker, LogChunk};
use crate::constants::PROGRESS_EVERY_CHUNKS;
use crate::source::{self, FileMatcher, ReadError, TextDecoder};
use crate::stats::FileError;

#[derive(Debug, Clone, Default)]
pub struct ProducerSummary {
    pub files_matched: u64,
    pub files_processed: u64,
    pub files_skipped: u64,
    pub chunks_emitted: u64,
    pub lines_read: u64,
    pub warnings: Vec<FileError>,
    pub cancelled: bool,
}

pub struct ChunkProducer {
    pub dir: PathBuf,
    pub matcher: FileMatcher,
    pub decoder: TextDecoder,
    pub lines_per_chunk: usize,
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

enum FileOutcome {
    Done,
    /// Keep going with the next file.
    Skipped,
    /// The run must stop producing.
    Stop,
}

impl ChunkProducer {
    pub fn spawn(self, tx: Sender<LogChunk>) -> io::Result<thread::JoinHandle<ProducerSummary>> {
        thread::Builder::new()
            .name("logsift-producer".to_string())
            .spawn(move || self.run(tx))
    }

    /// Produce every chunk, then drop `tx` so workers see the channel close.
    pub fn run(&self, tx: Sender<LogChunk>) -> ProducerSummary {
        let mut summary = ProducerSummary::default();

        let files = match source::discover(&self.dir, &self.matcher) {
            Ok(files) => files,
            Err(err) => {
                warn!("cannot list {}: {err}", self.dir.display());
                summary.warnings.push(FileError {
                    file: self.dir.display().to_string(),
                    message: err.to_string(),
                });
                Vec::new()
            }
        };
        if files.is_empty() {
            warn!("no log files matched in {}", self.dir.display());
        }
        summary.files_matched = files.len() as u64;

        for (file_index, path) in files.iter().enumerate() {
            match self.produce_file(file_index, path, &tx, &mut summary) {
                FileOutcome::Done => summary.files_processed += 1,
                FileOutcome::Skipped => summary.files_skipped += 1,
                FileOutcome::Stop => break,
            }
        }

        drop(tx);
        info!(
            "producer finished files={} skipped={} chunks={} lines={}",
            summary.files_processed,
            summary.files_skipped,
            summary.chunks_emitted,
            summary.lines_read
        );
        summary
    }

    fn cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn produce_file(
        &self,
        file_index: usize,
        path: &Path,
        tx: &Sender<LogChunk>,
        summary: &mut ProducerSummary,
    ) -> FileOutcome {
        let mut lines = match source::open_lines(path, self.decoder) {
            Ok(lines) => lines,
            Err(err) => {
                warn!("skipping {}: {err}", path.display());
                summary.warnings.push(FileError {
                    file: path.display().to_string(),
                    message: err.to_string(),
                });
                return FileOutcome::Skipped;
            }
        };

        let mut chunker =
            Chunker::new(file_index, Arc::new(path.to_path_buf()), self.lines_per_chunk);
        while let Some(line) = lines.next() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    // Chunks already sent for this file stay in the run.
                    warn!(
                        "skipping rest of {} after {} chunks: {err}",
                        path.display(),
                        chunker.chunks_emitted()
                    );
                    summary.warnings.push(FileError {
                        file: path.display().to_string(),
                        message: err.to_string(),
                    });
                    summary.lines_read += match &err {
                        ReadError::Decode { line, .. } => line.saturating_sub(1),
                        ReadError::Io { .. } => lines.lines_read(),
                    };
                    return FileOutcome::Skipped;
                }
            };
            if let Some(chunk) = chunker.push(line) {
                if !self.send(chunk, tx, summary) {
                    return FileOutcome::Stop;
                }
            }
        }
        summary.lines_read += lines.lines_read();

        if let Some(chunk) = chunker.finish() {
            if !self.send(chunk, tx, summary) {
                return FileOutcome::Stop;
            }
        }
        FileOutcome::Done
    }

    fn send(&self, chunk: LogChunk, tx: &Sender<LogChunk>, summary: &mut ProducerSummary) -> bool {
        if self.cancelled() {
            if !summary.cancelled {
                info!(
                    "cancel requested; producer stops after {} chunks",
                    summary.chunks_emitted
                );
            }
            summary.cancelled = true;
            return false;
        }
        let chunk_id = chunk.id.clone();
        if let Err(err) = tx.send(chunk) {
            warn!("task channel closed while sending chunk {chunk_id}: {err}");
            return false;
        }
        summary.chunks_emitted += 1;
        if summary.chunks_emitted % PROGRESS_EVERY_CHUNKS == 0 {
            info!(
                "chunks sent={} file={}",
                summary.chunks_emitted,
                chunk_id.file.display()
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::{bounded, unbounded};

    use super::*;
    use crate::config::DecodePolicy;

    fn producer(dir: &Path, per_chunk: usize, policy: DecodePolicy) -> ChunkProducer {
        ChunkProducer {
            dir: dir.to_path_buf(),
            matcher: FileMatcher::new(&["*.log".to_string()]).expect("matcher"),
            decoder: TextDecoder::for_label("utf-8", policy).expect("decoder"),
            lines_per_chunk: per_chunk,
            cancel_flag: None,
        }
    }

    fn write_lines(path: &Path, count: usize) {
        let body: String = (0..count).map(|i| format!("line {i}\n")).collect();
        std::fs::write(path, body).expect("write");
    }

    #[test]
    fn emits_chunks_in_file_then_line_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_lines(&dir.path().join("b.log"), 5);
        write_lines(&dir.path().join("a.log"), 7);
        std::fs::write(dir.path().join("empty.log"), "").expect("write");
        std::fs::write(dir.path().join("ignored.txt"), "x\n").expect("write");

        let (tx, rx) = unbounded();
        let summary = producer(dir.path(), 3, DecodePolicy::Replace).run(tx);
        let chunks: Vec<LogChunk> = rx.iter().collect();

        assert_eq!(summary.files_matched, 3);
        assert_eq!(summary.files_processed, 3);
        assert_eq!(summary.chunks_emitted, 5);
        assert_eq!(summary.lines_read, 12);
        let layout: Vec<(String, u64, usize)> = chunks
            .iter()
            .map(|c| {
                (
                    c.id.file.file_name().unwrap().to_string_lossy().to_string(),
                    c.id.seq,
                    c.len(),
                )
            })
            .collect();
        assert_eq!(
            layout,
            vec![
                ("a.log".to_string(), 0, 3),
                ("a.log".to_string(), 1, 3),
                ("a.log".to_string(), 2, 1),
                ("b.log".to_string(), 0, 3),
                ("b.log".to_string(), 1, 2),
            ]
        );
    }

    #[test]
    fn strict_decode_failure_skips_rest_of_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.log"), b"one\ntwo\nthree\n\xFF\nfive\n").expect("write");
        write_lines(&dir.path().join("b.log"), 2);

        let (tx, rx) = unbounded();
        let summary = producer(dir.path(), 2, DecodePolicy::Strict).run(tx);
        let chunks: Vec<LogChunk> = rx.iter().collect();

        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].file.ends_with("a.log"));
        // one full chunk from a.log before the bad line, one from b.log
        assert_eq!(chunks.len(), 2);
        assert_eq!(summary.chunks_emitted, 2);
        assert_eq!(summary.lines_read, 5);
    }

    #[test]
    fn back_pressure_blocks_until_consumed() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_lines(&dir.path().join("a.log"), 50);

        let (tx, rx) = bounded(1);
        let handle = producer(dir.path(), 5, DecodePolicy::Replace)
            .spawn(tx)
            .expect("spawn");
        let mut seen = 0;
        for chunk in rx {
            assert_eq!(chunk.id.seq, seen);
            seen += 1;
        }
        let summary = handle.join().expect("join");
        assert_eq!(seen, 10);
        assert_eq!(summary.chunks_emitted, 10);
    }

    #[test]
    fn cancel_flag_stops_emission() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_lines(&dir.path().join("a.log"), 10);

        let mut p = producer(dir.path(), 2, DecodePolicy::Replace);
        p.cancel_flag = Some(Arc::new(AtomicBool::new(true)));
        let (tx, rx) = unbounded();
        let summary = p.run(tx);
        assert!(summary.cancelled);
        assert_eq!(summary.chunks_emitted, 0);
        assert_eq!(rx.iter().count(), 0);
    }
}
