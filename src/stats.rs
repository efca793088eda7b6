//! # Chunk Statistics
//!
//! Typed partial results and the fixed per-field merge rules used to fold
//! them into one aggregate.
//!
//! | field            | rule            |
//! |------------------|-----------------|
//! | `lines_total`    | sum             |
//! | `by_level`       | key-wise sum    |
//! | `ip_counts`      | key-wise sum    |
//! | `errors_by_day`  | key-wise sum    |
//! | `pattern_counts` | key-wise sum    |
//! | `errors`         | concatenate     |
//! | `analyzer`       | first seen wins |

use std::collections::BTreeMap;

use serde::Serialize;

use crate::chunk::ChunkId;

pub const LEVELS: [&str; 3] = ["INFO", "WARNING", "ERROR"];

/// An analysis failure attached to the chunk it happened on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkError {
    pub file: String,
    pub seq: u64,
    pub first_line: u64,
    pub message: String,
}

impl ChunkError {
    pub fn new(chunk: &ChunkId, first_line: u64, message: impl Into<String>) -> Self {
        Self {
            file: chunk.file.display().to_string(),
            seq: chunk.seq,
            first_line,
            message: message.into(),
        }
    }
}

/// Statistics for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartialResult {
    pub lines_total: u64,
    pub by_level: BTreeMap<String, u64>,
    pub ip_counts: BTreeMap<String, u64>,
    pub errors_by_day: BTreeMap<String, u64>,
    pub pattern_counts: BTreeMap<String, u64>,
    pub errors: Vec<ChunkError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
}

impl PartialResult {
    /// A partial for a chunk whose analysis failed. Its lines still count.
    pub fn failed(error: ChunkError, lines_total: u64) -> Self {
        Self {
            lines_total,
            errors: vec![error],
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn merge(&mut self, other: PartialResult) {
        self.lines_total += other.lines_total;
        sum_into(&mut self.by_level, other.by_level);
        sum_into(&mut self.ip_counts, other.ip_counts);
        sum_into(&mut self.errors_by_day, other.errors_by_day);
        sum_into(&mut self.pattern_counts, other.pattern_counts);
        self.errors.extend(other.errors);
        if self.analyzer.is_none() {
            self.analyzer = other.analyzer;
        }
    }
}

fn sum_into(acc: &mut BTreeMap<String, u64>, part: BTreeMap<String, u64>) {
    for (key, count) in part {
        *acc.entry(key).or_insert(0) += count;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpCount {
    pub ip: String,
    pub count: u64,
}

/// A file the producer could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file: String,
    pub message: String,
}

/// Every partial of a run folded together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    #[serde(flatten)]
    pub totals: PartialResult,
    pub chunks_total: u64,
    pub chunks_ok: u64,
    pub chunks_failed: u64,
    pub files_processed: u64,
    pub file_errors: Vec<FileError>,
}

impl Default for AggregateResult {
    fn default() -> Self {
        let mut totals = PartialResult::default();
        for level in LEVELS {
            totals.by_level.insert(level.to_string(), 0);
        }
        Self {
            totals,
            chunks_total: 0,
            chunks_ok: 0,
            chunks_failed: 0,
            files_processed: 0,
            file_errors: Vec::new(),
        }
    }
}

impl AggregateResult {
    pub fn absorb(&mut self, part: PartialResult) {
        self.chunks_total += 1;
        if part.is_error() {
            self.chunks_failed += 1;
        } else {
            self.chunks_ok += 1;
        }
        self.totals.merge(part);
    }

    pub fn lines_total(&self) -> u64 {
        self.totals.lines_total
    }

    /// Busiest addresses, ties broken by address so the order is stable.
    pub fn top_ips(&self, n: usize) -> Vec<IpCount> {
        let mut ips: Vec<IpCount> = self
            .totals
            .ip_counts
            .iter()
            .map(|(ip, count)| IpCount {
                ip: ip.clone(),
                count: *count,
            })
            .collect();
        ips.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
        ips.truncate(n);
        ips
    }
}
