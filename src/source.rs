//! # Log Sources
//!
//! File discovery by glob pattern and line-oriented decoding of log files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use thiserror::Error;
use tracing::warn;

use crate::config::{ConfigError, DecodePolicy};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: invalid {encoding} byte sequence")]
    Decode {
        path: PathBuf,
        line: u64,
        encoding: &'static str,
    },
}

/// File-name matcher built from shell-style glob patterns.
#[derive(Debug, Clone)]
pub struct FileMatcher {
    patterns: Vec<glob::Pattern>,
}

impl FileMatcher {
    /// An empty pattern list matches every file.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| ConfigError::FilePattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(file_name))
    }
}

/// Regular files directly inside `dir` whose name matches, sorted by path.
pub fn discover(dir: &Path, matcher: &FileMatcher) -> Result<Vec<PathBuf>, ReadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ReadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry in {}: {err}", dir.display());
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        if matcher.matches(&name.to_string_lossy()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Decodes raw line bytes under one encoding and error policy.
#[derive(Debug, Clone, Copy)]
pub struct TextDecoder {
    encoding: &'static Encoding,
    policy: DecodePolicy,
}

impl TextDecoder {
    /// Only ASCII-compatible encodings are accepted, since lines are split on `\n` bytes.
    pub fn for_label(label: &str, policy: DecodePolicy) -> Result<Self, ConfigError> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| ConfigError::Encoding(label.to_string()))?;
        if encoding == encoding_rs::REPLACEMENT || !encoding.is_ascii_compatible() {
            return Err(ConfigError::Encoding(label.to_string()));
        }
        Ok(Self { encoding, policy })
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// `None` when the bytes are malformed and the policy is strict.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self.policy {
            DecodePolicy::Replace => {
                let (text, _had_errors) = self.encoding.decode_without_bom_handling(bytes);
                Some(text.into_owned())
            }
            DecodePolicy::Strict => self
                .encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
        }
    }
}

/// Iterator over the decoded lines of one file. Line terminators are stripped.
pub struct LineReader<R> {
    inner: R,
    decoder: TextDecoder,
    path: PathBuf,
    line_no: u64,
    buf: Vec<u8>,
    failed: bool,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R, decoder: TextDecoder, path: PathBuf) -> Self {
        Self {
            inner,
            decoder,
            path,
            line_no: 0,
            buf: Vec::new(),
            failed: false,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.line_no
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = Result<String, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.buf.clear();
        match self.inner.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                let mut bytes = self.buf.as_slice();
                if let Some(rest) = bytes.strip_suffix(b"\n") {
                    bytes = rest;
                }
                if let Some(rest) = bytes.strip_suffix(b"\r") {
                    bytes = rest;
                }
                if self.line_no == 1 && self.decoder.encoding == encoding_rs::UTF_8 {
                    if let Some(rest) = bytes.strip_prefix(b"\xEF\xBB\xBF") {
                        bytes = rest;
                    }
                }
                match self.decoder.decode(bytes) {
                    Some(line) => Some(Ok(line)),
                    None => {
                        self.failed = true;
                        Some(Err(ReadError::Decode {
                            path: self.path.clone(),
                            line: self.line_no,
                            encoding: self.decoder.name(),
                        }))
                    }
                }
            }
            Err(source) => {
                self.failed = true;
                Some(Err(ReadError::Io {
                    path: self.path.clone(),
                    source,
                }))
            }
        }
    }
}

pub fn open_lines(
    path: &Path,
    decoder: TextDecoder,
) -> Result<LineReader<BufReader<File>>, ReadError> {
    let file = File::open(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(LineReader::new(
        BufReader::new(file),
        decoder,
        path.to_path_buf(),
    ))
}
