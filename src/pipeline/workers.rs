//! # Pipeline Workers
//!
//! Worker thread spawning, lifecycle tracking and the per-chunk fault boundary.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::analyzer::{AnalysisError, ChunkAnalyzer, PatternSet};
use crate::chunk::LogChunk;
use crate::stats::{ChunkError, PartialResult};

use super::events::WorkerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Terminated,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Starting,
            1 => WorkerState::Running,
            _ => WorkerState::Terminated,
        }
    }
}

#[derive(Debug)]
struct WorkerStatus {
    state: AtomicU8,
    /// 0 until the worker thread has started.
    os_id: AtomicU32,
}

impl WorkerStatus {
    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Identity and lifecycle of one worker.
///
/// Cloned handles observe the same worker; only the worker thread itself
/// changes the state.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub id: usize,
    pub name: String,
    status: Arc<WorkerStatus>,
}

impl WorkerHandle {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            name: format!("worker-{id}"),
            status: Arc::new(WorkerStatus {
                state: AtomicU8::new(WorkerState::Starting as u8),
                os_id: AtomicU32::new(0),
            }),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.status.state.load(Ordering::Acquire))
    }

    /// OS thread id of the worker, once it is running.
    pub fn os_id(&self) -> Option<u32> {
        match self.status.os_id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }
}

/// Marks the worker terminated however its thread exits.
struct TerminateOnDrop(Arc<WorkerStatus>);

impl Drop for TerminateOnDrop {
    fn drop(&mut self) {
        self.0.set_state(WorkerState::Terminated);
    }
}

#[cfg(target_os = "linux")]
fn current_os_thread_id() -> u32 {
    // SAFETY: gettid has no preconditions and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as u32 }
}

#[cfg(not(target_os = "linux"))]
fn current_os_thread_id() -> u32 {
    std::process::id()
}

pub struct WorkerPool {
    handles: Vec<WorkerHandle>,
    joins: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Wait for every worker thread to exit.
    pub fn join(self) {
        for (handle, join) in self.handles.iter().zip(self.joins) {
            if join.join().is_err() {
                warn!("{} exited by panic", handle.name);
            }
        }
    }
}

/// Spawn one thread per handle. Each drains `rx` until the channel closes.
pub fn spawn_workers(
    handles: &[WorkerHandle],
    analyzer: Arc<dyn ChunkAnalyzer>,
    patterns: Arc<PatternSet>,
    rx: Receiver<LogChunk>,
    result_tx: Sender<WorkerMessage>,
) -> io::Result<WorkerPool> {
    let mut joins = Vec::with_capacity(handles.len());

    for handle in handles {
        let analyzer = analyzer.clone();
        let patterns = patterns.clone();
        let rx = rx.clone();
        let result_tx = result_tx.clone();
        let status = handle.status.clone();
        let worker_id = handle.id;
        let name = handle.name.clone();

        let join = thread::Builder::new()
            .name(format!("logsift-{name}"))
            .spawn(move || {
                let _guard = TerminateOnDrop(status.clone());
                let os_id = current_os_thread_id();
                status.os_id.store(os_id, Ordering::Release);
                status.set_state(WorkerState::Running);
                info!("{name} started os_tid={os_id}");

                let mut processed = 0u64;
                for chunk in rx {
                    let result = run_chunk(analyzer.as_ref(), &patterns, &chunk);
                    debug!("{name} finished chunk {}", chunk.id);
                    let message = WorkerMessage::Partial {
                        worker_id,
                        chunk: chunk.id,
                        result,
                    };
                    if let Err(err) = result_tx.send(message) {
                        warn!("result channel closed while {name} was sending: {err}");
                        break;
                    }
                    processed += 1;
                }

                status.set_state(WorkerState::Terminated);
                info!("{name} terminated processed={processed}");
                let _ = result_tx.send(WorkerMessage::Finished {
                    worker_id,
                    processed,
                });
            })?;
        joins.push(join);
    }

    Ok(WorkerPool {
        handles: handles.to_vec(),
        joins,
    })
}

/// Analyze one chunk. Errors and panics become an error entry in the result.
pub fn run_chunk(
    analyzer: &dyn ChunkAnalyzer,
    patterns: &PatternSet,
    chunk: &LogChunk,
) -> PartialResult {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        analyzer.analyze(&chunk.lines, patterns)
    }));
    let err = match outcome {
        Ok(Ok(result)) => return result,
        Ok(Err(err)) => err,
        Err(payload) => AnalysisError::Panicked(panic_message(payload.as_ref())),
    };
    warn!("chunk {} failed: {err}", chunk.id);
    PartialResult::failed(
        ChunkError::new(&chunk.id, chunk.first_line, err.to_string()),
        chunk.len() as u64,
    )
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
