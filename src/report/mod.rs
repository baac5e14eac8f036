//! Consumers for the monitor and kernel log channels.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dmesg::Message;
use crate::ecu::Instance;
use crate::monitor::measure::Measure;

/// Receive measures until the channel closes, logging each one normalized
/// to percentages and compute units.
///
/// A closed channel means the monitor hit a terminal read failure; a clean
/// stop leaves the channel open and this task is simply never woken again.
pub async fn run(mut measures: mpsc::Receiver<Measure>, instance: Option<&'static Instance>) {
    while let Some(measure) = measures.recv().await {
        info!(
            user_pct = measure.user_percent(),
            system_pct = measure.system_percent(),
            idle_pct = measure.idle_percent(),
            user_ecu = measure.user_compute_units(instance),
            system_ecu = measure.system_compute_units(instance),
            memory_kb = measure.memory_kb,
            "sample",
        );
    }

    warn!("measure channel closed");
}

/// Log kernel ring buffer messages as they arrive.
pub async fn log_kernel_messages(mut messages: mpsc::Receiver<Message>) {
    while let Some(message) = messages.recv().await {
        info!(
            level = message.level,
            timestamp = %message.timestamp,
            "kernel: {}",
            message.text,
        );
    }
}
