use std::path::PathBuf;

use clap::Parser;

use crate::config::{AnalyzerConfig, DecodePolicy};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Directory holding the log files to analyze
    #[arg(short, long)]
    pub log_dir: Option<PathBuf>,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Lines per chunk
    #[arg(long)]
    pub lines_per_chunk: Option<usize>,

    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Text encoding of the log files (WHATWG label)
    #[arg(long)]
    pub encoding: Option<String>,

    /// Skip files containing undecodable bytes instead of replacing them
    #[arg(long)]
    pub strict_decode: bool,

    /// Sample CPU and memory while workers run
    #[arg(long)]
    pub monitor: bool,

    /// Monitor sampling interval, in milliseconds
    #[arg(long)]
    pub monitor_interval_ms: Option<u64>,

    /// File name glob; may be repeated
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,

    /// Named regex counted per line, as NAME=REGEX; may be repeated
    #[arg(long = "match", value_parser = parse_match)]
    pub matches: Vec<(String, String)>,

    /// Directory for report files
    #[arg(long)]
    pub info_dir: Option<PathBuf>,

    /// Report file name; a timestamp is inserted before the extension
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl CliOptions {
    /// Flags given on the command line win over the config file.
    pub fn apply(&self, cfg: &mut AnalyzerConfig) {
        if let Some(dir) = &self.log_dir {
            cfg.log_dir = Some(dir.clone());
        }
        if let Some(n) = self.lines_per_chunk {
            cfg.lines_per_chunk = n;
        }
        if let Some(n) = self.workers {
            cfg.workers = n;
        }
        if let Some(encoding) = &self.encoding {
            cfg.encoding = encoding.clone();
        }
        if self.strict_decode {
            cfg.decode_errors = DecodePolicy::Strict;
        }
        if self.monitor {
            cfg.monitor = true;
        }
        if let Some(ms) = self.monitor_interval_ms {
            cfg.monitor_interval_ms = ms;
        }
        if !self.patterns.is_empty() {
            cfg.patterns = self.patterns.clone();
        }
        for (name, regex) in &self.matches {
            cfg.match_patterns.insert(name.clone(), regex.clone());
        }
        if let Some(dir) = &self.info_dir {
            cfg.info_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            cfg.output = output.clone();
        }
    }
}

fn parse_match(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, regex)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), regex.to_string()))
        }
        _ => Err(format!("expected NAME=REGEX, got {raw:?}")),
    }
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
