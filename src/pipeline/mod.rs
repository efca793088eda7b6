//! # Pipeline Module
//!
//! Orchestrates a run: chunk production, the worker pool, result collection,
//! the optional resource monitor and the final report.

pub mod collector;
pub mod events;
pub mod producer;
pub mod workers;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use chrono::Local;
use crossbeam_channel::bounded;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analyzer::{self, ChunkAnalyzer, PatternSet};
use crate::chunk::LogChunk;
use crate::config::{AnalyzerConfig, ConfigError, DecodePolicy};
use crate::constants::{CHANNEL_CAPACITY_MULTIPLIER, MIN_CHANNEL_CAPACITY};
use crate::monitor::{self, MonitorSummary, ResourceProbe, SysinfoProbe};
use crate::report::{Report, ReportError, ReportWriter, RunParams};
use crate::source::{FileMatcher, TextDecoder};
use crate::stats::AggregateResult;

use collector::CollectorOutcome;
use events::WorkerMessage;
use producer::{ChunkProducer, ProducerSummary};
use workers::WorkerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Configured,
    Monitoring,
    Running,
    Collecting,
    Finalized,
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn {what} thread: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Everything a run produced. The aggregate is available even when the
/// report could not be written.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub aggregate: AggregateResult,
    pub report_path: Result<PathBuf, ReportError>,
    pub duration: Duration,
    pub producer: ProducerSummary,
    pub monitor: Option<MonitorSummary>,
    pub cancelled: bool,
}

type ProbeFactory = Arc<dyn Fn() -> Box<dyn ResourceProbe> + Send + Sync>;

pub struct LogAnalyzer {
    cfg: AnalyzerConfig,
    config_hash: String,
    log_dir: PathBuf,
    matcher: FileMatcher,
    decoder: TextDecoder,
    patterns: Arc<PatternSet>,
    analyzer: Arc<dyn ChunkAnalyzer>,
    probe_factory: ProbeFactory,
    cancel_flag: Option<Arc<AtomicBool>>,
    phase: RunPhase,
}

impl LogAnalyzer {
    /// Validate `cfg` and use the built-in analyzer.
    pub fn new(cfg: AnalyzerConfig) -> Result<Self, ConfigError> {
        let analyzer: Arc<dyn ChunkAnalyzer> = Arc::from(analyzer::build_analyzer(&cfg));
        Self::with_analyzer(cfg, analyzer)
    }

    pub fn with_analyzer(
        cfg: AnalyzerConfig,
        analyzer: Arc<dyn ChunkAnalyzer>,
    ) -> Result<Self, ConfigError> {
        let log_dir = cfg.validate()?.to_path_buf();
        let matcher = FileMatcher::new(&cfg.patterns)?;
        let decoder = TextDecoder::for_label(&cfg.encoding, cfg.decode_errors)?;
        let patterns = Arc::new(PatternSet::compile(&cfg.match_patterns)?);

        let cpus = num_cpus::get();
        if cfg.workers > cpus {
            warn!("workers={} exceeds available cpus={cpus}", cfg.workers);
        }
        info!(
            "configuration run_id={} log_dir={} lines_per_chunk={} workers={} encoding={} decode_errors={:?} monitor={} patterns={:?} match_patterns={:?} info_dir={} output={} analyzer={}",
            cfg.run_id,
            log_dir.display(),
            cfg.lines_per_chunk,
            cfg.workers,
            decoder.name(),
            cfg.decode_errors,
            cfg.monitor,
            cfg.patterns,
            patterns.names(),
            cfg.info_dir.display(),
            cfg.output.display(),
            analyzer.name()
        );

        Ok(Self {
            cfg,
            config_hash: String::new(),
            log_dir,
            matcher,
            decoder,
            patterns,
            analyzer,
            probe_factory: Arc::new(|| -> Box<dyn ResourceProbe> {
                Box::new(SysinfoProbe::new())
            }),
            cancel_flag: None,
            phase: RunPhase::Configured,
        })
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Raising the flag stops chunk production; queued chunks still finish.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn with_probe<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ResourceProbe> + Send + Sync + 'static,
    {
        self.probe_factory = Arc::new(factory);
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, next: RunPhase) {
        debug!("phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Run the whole pipeline and write the report.
    ///
    /// Only thread spawn failures are returned as errors; unreadable files
    /// and failing chunks are recorded in the aggregate.
    pub fn analyze(&mut self) -> Result<AnalysisOutcome, AnalyzeError> {
        self.phase = RunPhase::Configured;
        let started_at = Local::now();
        let clock = Instant::now();
        let worker_count = self.cfg.workers;

        let task_cap = worker_count
            .saturating_mul(CHANNEL_CAPACITY_MULTIPLIER)
            .max(MIN_CHANNEL_CAPACITY);
        let (task_tx, task_rx) = bounded::<LogChunk>(task_cap);
        let (result_tx, result_rx) = bounded::<WorkerMessage>(task_cap * 2);

        let handles: Vec<WorkerHandle> = (0..worker_count).map(WorkerHandle::new).collect();

        let monitor = if self.cfg.monitor {
            self.enter(RunPhase::Monitoring);
            let interval = Duration::from_millis(self.cfg.monitor_interval_ms.max(1));
            let probe = (self.probe_factory)();
            let handle = monitor::spawn(handles.clone(), interval, probe).map_err(|source| {
                AnalyzeError::Spawn {
                    what: "monitor",
                    source,
                }
            })?;
            Some(handle)
        } else {
            None
        };

        self.enter(RunPhase::Running);
        let pool = workers::spawn_workers(
            &handles,
            self.analyzer.clone(),
            self.patterns.clone(),
            task_rx,
            result_tx,
        )
        .map_err(|source| AnalyzeError::Spawn {
            what: "worker",
            source,
        })?;

        let producer = ChunkProducer {
            dir: self.log_dir.clone(),
            matcher: self.matcher.clone(),
            decoder: self.decoder,
            lines_per_chunk: self.cfg.lines_per_chunk,
            cancel_flag: self.cancel_flag.clone(),
        }
        .spawn(task_tx)
        .map_err(|source| AnalyzeError::Spawn {
            what: "producer",
            source,
        })?;

        self.enter(RunPhase::Collecting);
        let CollectorOutcome {
            mut aggregate,
            per_worker,
            workers_finished,
        } = collector::collect(&result_rx, worker_count);
        drop(result_rx);

        let summary = match producer.join() {
            Ok(summary) => summary,
            Err(_) => {
                warn!("producer thread panicked");
                ProducerSummary::default()
            }
        };
        pool.join();

        if workers_finished < worker_count {
            warn!("only {workers_finished} of {worker_count} workers reported finished");
        }
        if summary.chunks_emitted != aggregate.chunks_total {
            warn!(
                "chunk accounting mismatch emitted={} collected={}",
                summary.chunks_emitted, aggregate.chunks_total
            );
        }
        debug!("chunks per worker {per_worker:?}");
        aggregate.files_processed = summary.files_processed;
        aggregate.file_errors = summary.warnings.clone();
        info!(
            "collected chunks={} ok={} failed={} lines={}",
            aggregate.chunks_total,
            aggregate.chunks_ok,
            aggregate.chunks_failed,
            aggregate.lines_total()
        );

        self.enter(RunPhase::Finalized);
        let monitor_summary = monitor.map(|m| m.stop());
        let finished_at = Local::now();
        let duration = clock.elapsed();
        let cancelled = summary.cancelled;

        let params = self.run_params();
        let mut report = Report::new(
            &aggregate,
            &params,
            started_at,
            finished_at,
            duration.as_secs_f64(),
            cancelled,
        );
        let writer = ReportWriter::new(&self.cfg.info_dir, &self.cfg.output);
        let report_path = writer.write(&mut report);
        match &report_path {
            Ok(path) => info!("report written to {}", path.display()),
            Err(err) => warn!("report write failed: {err}"),
        }
        info!("analysis finished in {:.2}s", duration.as_secs_f64());

        Ok(AnalysisOutcome {
            aggregate,
            report_path,
            duration,
            producer: summary,
            monitor: monitor_summary,
            cancelled,
        })
    }

    fn run_params(&self) -> RunParams {
        RunParams {
            run_id: self.cfg.run_id.clone(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self.config_hash.clone(),
            log_dir: self.log_dir.display().to_string(),
            lines_per_chunk: self.cfg.lines_per_chunk,
            workers: self.cfg.workers,
            encoding: self.decoder.name().to_string(),
            decode_errors: match self.cfg.decode_errors {
                DecodePolicy::Replace => "replace".to_string(),
                DecodePolicy::Strict => "strict".to_string(),
            },
            patterns: self.cfg.patterns.clone(),
            match_patterns: self.cfg.match_patterns.clone(),
            monitor: self.cfg.monitor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_bad_config_before_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = AnalyzerConfig::for_dir(dir.path());
        cfg.encoding = "not-an-encoding".into();
        assert!(matches!(
            LogAnalyzer::new(cfg),
            Err(ConfigError::Encoding(_))
        ));

        let mut cfg = AnalyzerConfig::for_dir(dir.path());
        cfg.match_patterns.insert("bad".into(), "(".into());
        assert!(matches!(
            LogAnalyzer::new(cfg),
            Err(ConfigError::MatchPattern { .. })
        ));
    }

    #[test]
    fn analyze_walks_every_phase() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logs = dir.path().join("logs");
        std::fs::create_dir(&logs).expect("mkdir");
        std::fs::write(logs.join("a.log"), "2025-01-01 [INFO] 10.0.0.1 hi\n").expect("write");

        let mut cfg = AnalyzerConfig::for_dir(&logs);
        cfg.info_dir = dir.path().join("info");
        cfg.workers = 2;
        let mut analyzer = LogAnalyzer::new(cfg).expect("analyzer");
        assert_eq!(analyzer.phase(), RunPhase::Configured);

        let outcome = analyzer.analyze().expect("analyze");
        assert_eq!(analyzer.phase(), RunPhase::Finalized);
        assert_eq!(outcome.aggregate.lines_total(), 1);
        assert_eq!(outcome.aggregate.chunks_total, 1);
        assert!(outcome.monitor.is_none());
        assert!(outcome.report_path.expect("report").starts_with(dir.path().join("info")));
    }
}
