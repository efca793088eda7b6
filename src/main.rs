use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use logsift::config::{self, ConfigError};
use logsift::pipeline::{AnalyzeError, LogAnalyzer};
use logsift::{cli, logging};

const EXIT_CONFIG: u8 = 1;
const EXIT_REPORT: u8 = 2;

fn main() -> ExitCode {
    let cli_opts = cli::parse();
    logging::init_logging(cli_opts.json_logs);

    let loaded = match config::load_config(cli_opts.config_path.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => return config_failure(&err),
    };
    let mut cfg = loaded.config;
    cli_opts.apply(&mut cfg);

    info!(
        "starting run_id={} log_dir={}",
        cfg.run_id,
        cfg.log_dir
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            cancel.store(true, Ordering::Relaxed);
        }) {
            warn!("failed to install ctrl-c handler: {err}");
        }
    }

    let mut analyzer = match LogAnalyzer::new(cfg) {
        Ok(analyzer) => analyzer
            .with_config_hash(loaded.config_hash)
            .with_cancel_flag(cancel),
        Err(err) => return config_failure(&err),
    };

    let outcome = match analyzer.analyze() {
        Ok(outcome) => outcome,
        Err(AnalyzeError::Config(err)) => return config_failure(&err),
        Err(err) => {
            error!("{:#}", anyhow::Error::new(err));
            return ExitCode::FAILURE;
        }
    };

    if outcome.cancelled {
        warn!("run was cancelled; report covers a partial input");
    }
    match outcome.report_path {
        Ok(path) => {
            info!("logsift run finished report={}", path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{:#}", anyhow::Error::new(err).context("writing report"));
            ExitCode::from(EXIT_REPORT)
        }
    }
}

fn config_failure(err: &ConfigError) -> ExitCode {
    error!("configuration error: {err}");
    ExitCode::from(EXIT_CONFIG)
}
