//! Shared tuning constants.

pub const DEFAULT_LINES_PER_CHUNK: usize = 300;
pub const DEFAULT_WORKERS: usize = 4;

/// Task queue slots per worker.
pub const CHANNEL_CAPACITY_MULTIPLIER: usize = 4;
pub const MIN_CHANNEL_CAPACITY: usize = 4;

/// Emit a producer progress line every this many chunks.
pub const PROGRESS_EVERY_CHUNKS: u64 = 100;

/// Number of addresses kept in the report's `top_ips` list.
pub const TOP_IPS: usize = 10;

pub const MIB: u64 = 1024 * 1024;
