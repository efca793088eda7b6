//! # Resource Monitor
//!
//! Background sampling of system-wide and per-worker CPU/memory while the
//! pipeline runs. Samples are emitted as log lines and never fed back into
//! the analysis.

use std::fmt;
use std::io;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use sysinfo::{Pid, System};
use thiserror::Error;
use tracing::{info, warn};

use crate::constants::MIB;
use crate::pipeline::workers::{WorkerHandle, WorkerState};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("os id {0} no longer exists")]
    Vanished(u32),
    #[error("metrics unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemUsage {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerUsage {
    pub cpu_percent: f32,
    pub rss_mib: f64,
}

/// Source of resource readings. Implementations must never panic on a
/// vanished id; they report an error instead.
pub trait ResourceProbe: Send {
    fn system(&mut self) -> SystemUsage;
    fn worker(&mut self, os_id: u32) -> Result<WorkerUsage, ProbeError>;
}

/// `sysinfo` backed probe.
///
/// Workers are threads, so the id is a thread id; memory is that of the
/// whole process.
pub struct SysinfoProbe {
    sys: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut sys = System::new();
        // The first CPU reading is a baseline and always zero.
        sys.refresh_cpu();
        Self { sys }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn system(&mut self) -> SystemUsage {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        let memory_percent = if total > 0 {
            (self.sys.used_memory() as f64 / total as f64 * 100.0) as f32
        } else {
            0.0
        };
        SystemUsage {
            cpu_percent: self.sys.global_cpu_info().cpu_usage(),
            memory_percent,
        }
    }

    fn worker(&mut self, os_id: u32) -> Result<WorkerUsage, ProbeError> {
        let pid = Pid::from_u32(os_id);
        if !self.sys.refresh_process(pid) {
            return Err(ProbeError::Vanished(os_id));
        }
        let process = self.sys.process(pid).ok_or(ProbeError::Vanished(os_id))?;
        Ok(WorkerUsage {
            cpu_percent: process.cpu_usage(),
            rss_mib: process.memory() as f64 / MIB as f64,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkerObservation {
    Starting,
    Alive(WorkerUsage),
    Terminated,
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct WorkerSample {
    pub name: String,
    pub os_id: Option<u32>,
    pub observation: WorkerObservation,
}

/// One monitor tick.
#[derive(Debug, Clone)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub system: SystemUsage,
    pub workers: Vec<WorkerSample>,
}

impl Sample {
    pub fn take(workers: &[WorkerHandle], probe: &mut dyn ResourceProbe) -> Self {
        let system = probe.system();
        let workers = workers
            .iter()
            .map(|handle| {
                let os_id = handle.os_id();
                let observation = match (handle.state(), os_id) {
                    (WorkerState::Terminated, _) => WorkerObservation::Terminated,
                    (WorkerState::Starting, _) | (WorkerState::Running, None) => {
                        WorkerObservation::Starting
                    }
                    (WorkerState::Running, Some(id)) => match probe.worker(id) {
                        Ok(usage) => WorkerObservation::Alive(usage),
                        // The thread may exit between the state read and the probe.
                        Err(ProbeError::Vanished(_)) => WorkerObservation::Terminated,
                        Err(ProbeError::Unavailable(_)) => WorkerObservation::Unavailable,
                    },
                };
                WorkerSample {
                    name: handle.name.clone(),
                    os_id,
                    observation,
                }
            })
            .collect();
        Self {
            timestamp: Local::now(),
            system,
            workers,
        }
    }

    pub fn observations(&self) -> Vec<WorkerObservation> {
        self.workers.iter().map(|w| w.observation).collect()
    }

    pub fn all_terminated(&self) -> bool {
        self.workers
            .iter()
            .all(|w| w.observation == WorkerObservation::Terminated)
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "monitor cpu_system={:.1}% mem_system={:.1}%",
            self.system.cpu_percent, self.system.memory_percent
        )?;
        for worker in &self.workers {
            write!(f, " | {}", worker.name)?;
            if let Some(id) = worker.os_id {
                write!(f, " tid={id}")?;
            }
            match worker.observation {
                WorkerObservation::Starting => write!(f, " starting")?,
                WorkerObservation::Alive(usage) => write!(
                    f,
                    " cpu={:.1}% mem={:.1}MiB",
                    usage.cpu_percent, usage.rss_mib
                )?,
                WorkerObservation::Terminated => write!(f, " terminated")?,
                WorkerObservation::Unavailable => write!(f, " unavailable")?,
            }
        }
        Ok(())
    }
}

/// Log the first live reading of each worker next to the system usage at
/// that moment. Returns the indexes announced by this call.
fn announce_first_readings(sample: &Sample, announced: &mut [bool]) -> Vec<usize> {
    let mut fresh = Vec::new();
    for (idx, (worker, seen)) in sample.workers.iter().zip(announced.iter_mut()).enumerate() {
        if *seen {
            continue;
        }
        if let WorkerObservation::Alive(usage) = worker.observation {
            *seen = true;
            fresh.push(idx);
            info!(
                "{} first reading tid={} cpu_system={:.1}% mem_system={:.1}% rss={:.1}MiB",
                worker.name,
                worker.os_id.unwrap_or_default(),
                sample.system.cpu_percent,
                sample.system.memory_percent,
                usage.rss_mib
            );
        }
    }
    fresh
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signaled,
    AllTerminated,
    /// The monitor thread panicked.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSummary {
    pub ticks: u64,
    pub tracked: usize,
    pub stop_reason: StopReason,
    /// Per worker, in handle order, as seen by the last sample.
    pub last_observations: Vec<WorkerObservation>,
}

pub struct MonitorHandle {
    stop_tx: Sender<()>,
    join: thread::JoinHandle<MonitorSummary>,
    tracked: usize,
}

impl MonitorHandle {
    /// Signal the monitor and wait for its thread.
    pub fn stop(self) -> MonitorSummary {
        let _ = self.stop_tx.send(());
        drop(self.stop_tx);
        match self.join.join() {
            Ok(summary) => summary,
            Err(_) => {
                warn!("monitor thread panicked");
                MonitorSummary {
                    ticks: 0,
                    tracked: self.tracked,
                    stop_reason: StopReason::Failed,
                    last_observations: Vec::new(),
                }
            }
        }
    }
}

/// Start sampling `workers` every `interval` on a dedicated thread.
pub fn spawn(
    workers: Vec<WorkerHandle>,
    interval: Duration,
    mut probe: Box<dyn ResourceProbe>,
) -> io::Result<MonitorHandle> {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let tracked = workers.len();
    info!(
        "monitor started tracking={tracked} interval_ms={}",
        interval.as_millis()
    );

    let join = thread::Builder::new()
        .name("logsift-monitor".to_string())
        .spawn(move || {
            let mut ticks = 0u64;
            let mut announced = vec![false; workers.len()];
            loop {
                let sample = Sample::take(&workers, probe.as_mut());
                ticks += 1;
                info!("{sample}");
                announce_first_readings(&sample, &mut announced);
                if sample.all_terminated() {
                    info!("monitor stopping: all workers terminated");
                    return MonitorSummary {
                        ticks,
                        tracked,
                        stop_reason: StopReason::AllTerminated,
                        last_observations: sample.observations(),
                    };
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        // Workers are joined before the stop signal, so this
                        // sample records how each one ended.
                        let last = Sample::take(&workers, probe.as_mut());
                        ticks += 1;
                        info!("{last}");
                        info!("monitor stopping: signaled");
                        return MonitorSummary {
                            ticks,
                            tracked,
                            stop_reason: StopReason::Signaled,
                            last_observations: last.observations(),
                        };
                    }
                }
            }
        })?;

    Ok(MonitorHandle {
        stop_tx,
        join,
        tracked,
    })
}
