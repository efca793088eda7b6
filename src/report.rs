//! # Report Writer
//!
//! Serializes the aggregate of a run, plus timing and run parameters, to a
//! timestamped JSON file that never overwrites an earlier report.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::constants::TOP_IPS;
use crate::stats::{AggregateResult, IpCount};

/// Filename collisions tried before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no free report name after {attempts} attempts in {dir}")]
    NoFreeName { dir: PathBuf, attempts: u32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunParams {
    pub run_id: String,
    pub tool_version: String,
    pub config_hash: String,
    pub log_dir: String,
    pub lines_per_chunk: usize,
    pub workers: usize,
    pub encoding: String,
    pub decode_errors: String,
    pub patterns: Vec<String>,
    pub match_patterns: BTreeMap<String, String>,
    pub monitor: bool,
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    #[serde(flatten)]
    pub data: &'a AggregateResult,
    pub top_ips: Vec<IpCount>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub generated_at: DateTime<Local>,
    pub duration_seconds: f64,
    pub cancelled: bool,
    pub output_path: String,
    pub params: &'a RunParams,
}

impl<'a> Report<'a> {
    pub fn new(
        data: &'a AggregateResult,
        params: &'a RunParams,
        started_at: DateTime<Local>,
        finished_at: DateTime<Local>,
        duration_seconds: f64,
        cancelled: bool,
    ) -> Self {
        Self {
            data,
            top_ips: data.top_ips(TOP_IPS),
            started_at,
            finished_at,
            generated_at: Local::now(),
            duration_seconds,
            cancelled,
            output_path: String::new(),
            params,
        }
    }
}

/// Where reports go and how they are named.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    stem: String,
    extension: String,
}

impl ReportWriter {
    /// A relative `output` is placed under `info_dir`; an absolute one keeps its own directory.
    pub fn new(info_dir: &Path, output: &Path) -> Self {
        let target = if output.is_absolute() {
            output.to_path_buf()
        } else {
            info_dir.join(output)
        };
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| info_dir.to_path_buf());
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "info".to_string());
        let extension = target
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "json".to_string());
        Self {
            dir,
            stem,
            extension,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<stem>_<timestamp>[_<n>].<ext>`
    pub fn file_name(&self, timestamp: &DateTime<Local>, attempt: u32) -> String {
        let ts = timestamp.format("%Y%m%dT%H%M%S");
        if attempt == 0 {
            format!("{}_{}.{}", self.stem, ts, self.extension)
        } else {
            format!("{}_{}_{}.{}", self.stem, ts, attempt, self.extension)
        }
    }

    /// Create a fresh file and write the report to it. Existing files are never touched.
    pub fn write(&self, report: &mut Report<'_>) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ReportError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let timestamp = report.generated_at;
        let (path, file) = self.create_unique(&timestamp)?;
        report.output_path = path.display().to_string();

        persist(path, file, &*report)
    }

    fn create_unique(&self, timestamp: &DateTime<Local>) -> Result<(PathBuf, File), ReportError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(self.file_name(timestamp, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(ReportError::Io { path, source }),
            }
        }
        Err(ReportError::NoFreeName {
            dir: self.dir.clone(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }
}

/// Write `value` as pretty JSON into the freshly created `file`. A failed
/// write removes the file so no truncated report is left behind.
fn persist<T: Serialize + ?Sized>(
    path: PathBuf,
    file: File,
    value: &T,
) -> Result<PathBuf, ReportError> {
    let mut writer = BufWriter::new(file);
    let written = serde_json::to_writer_pretty(&mut writer, value)
        .map_err(ReportError::from)
        .and_then(|()| {
            writer
                .write_all(b"\n")
                .and_then(|()| writer.flush())
                .map_err(|source| ReportError::Io {
                    path: path.clone(),
                    source,
                })
        });
    drop(writer);
    match written {
        Ok(()) => Ok(path),
        Err(err) => {
            if let Err(rm) = std::fs::remove_file(&path) {
                warn!("could not remove partial report {}: {rm}", path.display());
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::Value;

    use super::*;

    fn params() -> RunParams {
        RunParams {
            run_id: "test".into(),
            tool_version: "0.0.0".into(),
            config_hash: String::new(),
            log_dir: "logs".into(),
            lines_per_chunk: 300,
            workers: 4,
            encoding: "UTF-8".into(),
            decode_errors: "replace".into(),
            patterns: vec!["*".into()],
            match_patterns: BTreeMap::new(),
            monitor: false,
        }
    }

    #[test]
    fn names_embed_timestamp_and_disambiguator() {
        let writer = ReportWriter::new(Path::new("info"), Path::new("resultado.json"));
        let ts = Local.with_ymd_and_hms(2025, 10, 8, 9, 5, 3).unwrap();
        assert_eq!(writer.file_name(&ts, 0), "resultado_20251008T090503.json");
        assert_eq!(writer.file_name(&ts, 2), "resultado_20251008T090503_2.json");
        assert_eq!(writer.dir(), Path::new("info"));
    }

    #[test]
    fn output_without_extension_gets_json() {
        let writer = ReportWriter::new(Path::new("out"), Path::new("report"));
        let ts = Local.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(writer.file_name(&ts, 0), "report_20250101T000000.json");
    }

    #[test]
    fn absolute_output_keeps_its_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("custom").join("run.json");
        let writer = ReportWriter::new(Path::new("ignored"), &output);
        assert_eq!(writer.dir(), dir.path().join("custom"));
    }

    #[test]
    fn repeated_writes_never_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ReportWriter::new(dir.path(), Path::new("info.json"));
        let aggregate = AggregateResult::default();
        let params = params();
        let now = Local::now();

        let mut first = Report::new(&aggregate, &params, now, now, 0.5, false);
        let mut second = Report::new(&aggregate, &params, now, now, 0.5, false);
        second.generated_at = first.generated_at;

        let a = writer.write(&mut first).expect("first");
        let b = writer.write(&mut second).expect("second");
        assert_ne!(a, b);
        assert!(a.exists() && b.exists());

        let json: Value =
            serde_json::from_str(&std::fs::read_to_string(&b).expect("read")).expect("json");
        assert_eq!(json["output_path"], Value::String(b.display().to_string()));
        assert_eq!(json["lines_total"], 0);
        assert_eq!(json["duration_seconds"], 0.5);
        assert_eq!(json["by_level"]["ERROR"], 0);
        assert_eq!(json["params"]["workers"], 4);
        assert!(json["top_ips"].as_array().expect("array").is_empty());
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ReportWriter::new(dir.path(), Path::new("info.json"));
        let ts = Local.with_ymd_and_hms(2025, 4, 2, 8, 0, 0).unwrap();

        let (path, file) = writer.create_unique(&ts).expect("create");
        let err = persist(path.clone(), file, &Unserializable).unwrap_err();
        assert!(matches!(err, ReportError::Serde(_)));
        assert!(!path.exists());

        // the name is free again for the next attempt
        let (again, _file) = writer.create_unique(&ts).expect("create again");
        assert_eq!(again, path);
    }

    #[test]
    fn unwritable_dir_is_a_report_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not dir").expect("write");
        let writer = ReportWriter::new(&blocker, Path::new("info.json"));
        let aggregate = AggregateResult::default();
        let params = params();
        let now = Local::now();
        let mut report = Report::new(&aggregate, &params, now, now, 0.0, false);
        assert!(matches!(
            writer.write(&mut report),
            Err(ReportError::Io { .. })
        ));
    }
}
