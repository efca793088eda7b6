//! # Result Collector
//!
//! Drains the result channel and folds partial results into the aggregate.

use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use crate::stats::AggregateResult;

use super::events::WorkerMessage;

#[derive(Debug, Clone)]
pub struct CollectorOutcome {
    pub aggregate: AggregateResult,
    /// Chunks processed per worker, as reported in each `Finished` marker.
    pub per_worker: Vec<u64>,
    pub workers_finished: usize,
}

/// Block until all `workers` have sent their `Finished` marker, or every
/// sender is gone.
pub fn collect(rx: &Receiver<WorkerMessage>, workers: usize) -> CollectorOutcome {
    let mut aggregate = AggregateResult::default();
    let mut per_worker = vec![0u64; workers];
    let mut finished = 0usize;

    while finished < workers {
        match rx.recv() {
            Ok(WorkerMessage::Partial {
                worker_id,
                chunk,
                result,
            }) => {
                debug!("collected chunk {chunk} from worker-{worker_id}");
                aggregate.absorb(result);
            }
            Ok(WorkerMessage::Finished {
                worker_id,
                processed,
            }) => {
                if let Some(slot) = per_worker.get_mut(worker_id) {
                    *slot = processed;
                }
                finished += 1;
            }
            Err(_) => {
                warn!("result channel closed with {finished} of {workers} workers finished");
                break;
            }
        }
    }

    CollectorOutcome {
        aggregate,
        per_worker,
        workers_finished: finished,
    }
}
