//! Shared helpers for pipeline integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use logsift::config::AnalyzerConfig;

/// A scratch workspace with a `logs/` input dir and an `info/` report dir.
pub struct Workspace {
    pub root: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir(root.path().join("logs")).expect("logs dir");
        Self { root }
    }

    pub fn logs(&self) -> PathBuf {
        self.root.path().join("logs")
    }

    pub fn info(&self) -> PathBuf {
        self.root.path().join("info")
    }

    pub fn write_log(&self, name: &str, body: impl AsRef<[u8]>) -> PathBuf {
        let path = self.logs().join(name);
        fs::write(&path, body).expect("write log");
        path
    }

    /// `count` lines cycling through INFO, WARNING and ERROR.
    pub fn write_numbered(&self, name: &str, count: usize) -> PathBuf {
        let body: String = (0..count)
            .map(|i| {
                let level = ["INFO", "WARNING", "ERROR"][i % 3];
                format!("2025-03-0{} 10:00:00 [{level}] 10.0.0.{} line {i}\n", i % 2 + 1, i % 5)
            })
            .collect();
        self.write_log(name, body)
    }

    pub fn config(&self, workers: usize, lines_per_chunk: usize) -> AnalyzerConfig {
        let mut cfg = AnalyzerConfig::for_dir(self.logs());
        cfg.run_id = "integration".to_string();
        cfg.info_dir = self.info();
        cfg.workers = workers;
        cfg.lines_per_chunk = lines_per_chunk;
        cfg
    }

    pub fn reports(&self) -> Vec<PathBuf> {
        list_files(&self.info())
    }
}

pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

pub fn read_json(path: &Path) -> serde_json::Value {
    let text = fs::read_to_string(path).expect("read report");
    serde_json::from_str(&text).expect("report json")
}
