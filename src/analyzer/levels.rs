use once_cell::sync::Lazy;
use regex::Regex;

use crate::analyzer::{AnalysisError, ChunkAnalyzer, PatternSet};
use crate::stats::{LEVELS, PartialResult};

static LEVEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(INFO|WARN(?:ING)?|ERROR)\b").expect("level regex"));
static IP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").expect("ip regex"));
static ERROR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bERROR\b").expect("error regex"));
static DAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("day regex"));

/// Counts severity levels, client addresses, errors per day and named pattern hits.
#[derive(Debug, Default)]
pub struct LevelStatsAnalyzer;

impl LevelStatsAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

fn normalize_level(raw: &str) -> &'static str {
    let upper = raw.to_ascii_uppercase();
    if upper.starts_with("WARN") {
        "WARNING"
    } else if upper == "ERROR" {
        "ERROR"
    } else {
        "INFO"
    }
}

impl ChunkAnalyzer for LevelStatsAnalyzer {
    fn name(&self) -> &str {
        "level-stats"
    }

    fn analyze(
        &self,
        lines: &[String],
        patterns: &PatternSet,
    ) -> Result<PartialResult, AnalysisError> {
        let mut out = PartialResult {
            analyzer: Some(self.name().to_string()),
            ..PartialResult::default()
        };
        for level in LEVELS {
            out.by_level.insert(level.to_string(), 0);
        }

        for line in lines {
            out.lines_total += 1;
            if line.trim().is_empty() {
                continue;
            }

            if let Some(m) = LEVEL_RE.captures(line).and_then(|c| c.get(1)) {
                *out.by_level
                    .entry(normalize_level(m.as_str()).to_string())
                    .or_insert(0) += 1;
            }

            if let Some(ip) = IP_RE.find(line) {
                *out.ip_counts.entry(ip.as_str().to_string()).or_insert(0) += 1;
            }

            if ERROR_RE.is_match(line) {
                if let Some(day) = DAY_RE.find(line) {
                    *out.errors_by_day
                        .entry(day.as_str().to_string())
                        .or_insert(0) += 1;
                }
            }

            for (name, re) in patterns.iter() {
                if re.is_match(line) {
                    *out.pattern_counts.entry(name.to_string()).or_insert(0) += 1;
                }
            }
        }

        Ok(out)
    }
}
