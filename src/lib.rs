//! procscope samples one process's CPU and memory consumption from /proc,
//! turns consecutive counter snapshots into per-interval deltas, and streams
//! them over a bounded channel to a reporter.

pub mod config;
pub mod dmesg;
pub mod ecu;
pub mod monitor;
pub mod procfs;
pub mod report;
