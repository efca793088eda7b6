pub mod levels;

use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;

use crate::config::{AnalyzerConfig, ConfigError};
use crate::stats::PartialResult;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Failed(String),
    #[error("analyzer panicked: {0}")]
    Panicked(String),
}

/// Named regexes matched against every line.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<(String, Regex)>,
}

impl PatternSet {
    pub fn compile(patterns: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|(name, expr)| {
                Regex::new(expr)
                    .map(|re| (name.clone(), re))
                    .map_err(|e| ConfigError::MatchPattern {
                        name: name.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Regex)> {
        self.patterns.iter().map(|(name, re)| (name.as_str(), re))
    }

    pub fn names(&self) -> Vec<&str> {
        self.patterns.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// Turns the lines of one chunk into a partial result.
///
/// Implementations must not rely on state shared with other chunks; the
/// same analyzer is called concurrently from every worker.
pub trait ChunkAnalyzer: Send + Sync {
    fn name(&self) -> &str;
    fn analyze(
        &self,
        lines: &[String],
        patterns: &PatternSet,
    ) -> Result<PartialResult, AnalysisError>;
}

pub fn build_analyzer(_cfg: &AnalyzerConfig) -> Box<dyn ChunkAnalyzer> {
    Box::new(levels::LevelStatsAnalyzer::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_named_patterns() {
        let mut raw = BTreeMap::new();
        raw.insert("timeout".to_string(), r"(?i)timed? ?out".to_string());
        raw.insert("disk".to_string(), r"disk usage".to_string());
        let set = PatternSet::compile(&raw).expect("compile");
        assert_eq!(set.names(), vec!["disk", "timeout"]);
    }

    #[test]
    fn bad_regex_is_a_config_error() {
        let mut raw = BTreeMap::new();
        raw.insert("broken".to_string(), "(".to_string());
        let err = PatternSet::compile(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::MatchPattern { ref name, .. } if name == "broken"));
    }
}
