pub mod analyzer;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod constants;
pub mod logging;
pub mod monitor;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod stats;
