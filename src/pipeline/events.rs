//! # Pipeline Events
//!
//! Messages that flow from workers to the result collector.

use crate::chunk::ChunkId;
use crate::stats::PartialResult;

#[derive(Debug)]
pub enum WorkerMessage {
    /// Analysis output for one chunk
    Partial {
        worker_id: usize,
        chunk: ChunkId,
        result: PartialResult,
    },
    /// Last message a worker sends before exiting
    Finished { worker_id: usize, processed: u64 },
}
