pub mod measure;

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::MonitorConfig;
use crate::procfs::{ReadError, UsageReader};

use self::measure::{Measure, RawSnapshot};

/// Lock-free delivery counters for a running monitor.
#[derive(Debug, Default)]
pub struct MonitorStats {
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl MonitorStats {
    /// Measures delivered to the output channel.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Measures discarded because the output channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Continuous monitoring session for one process.
///
/// Construction preflights the accounting files and fails outright if they
/// cannot be read; on success a background task samples once per interval
/// and publishes [`Measure`] values to the returned channel. The channel is
/// bounded and sends never block: when the consumer falls behind, the newest
/// sample is dropped.
///
/// The channel closes only when a read fails mid-session. A deliberate
/// [`stop`](Monitor::stop) halts sampling but leaves the channel open, so a
/// close always means failure.
pub struct Monitor {
    pid: u32,
    stats: Arc<MonitorStats>,
    // Holds a sender across a deliberate stop so the channel stays open; the
    // sampler clears it on a terminal read failure.
    keepalive: Arc<Mutex<Option<mpsc::Sender<Measure>>>>,
    cancel: CancellationToken,
}

impl Monitor {
    /// Preflight the accounting files for `pid` and start sampling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<R>(
        reader: R,
        pid: u32,
        cfg: &MonitorConfig,
    ) -> Result<(Self, mpsc::Receiver<Measure>), ReadError>
    where
        R: UsageReader + 'static,
    {
        // Preflight: if the counters are unreadable now, fail before any
        // task is spawned. The successful reads seed the previous snapshot.
        let process = reader.process_usage(pid)?;
        let system = reader.system_usage()?;
        let previous = RawSnapshot {
            process,
            system,
            resident_kb: 0,
        };

        let (tx, rx) = mpsc::channel(cfg.channel_capacity);
        let stats = Arc::new(MonitorStats::default());
        let keepalive = Arc::new(Mutex::new(Some(tx.clone())));
        let cancel = CancellationToken::new();

        let task = SamplerTask {
            reader,
            pid,
            interval: cfg.interval,
            previous,
            tx,
            stats: Arc::clone(&stats),
            keepalive: Arc::clone(&keepalive),
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        debug!(pid, interval = ?cfg.interval, "monitor started");

        Ok((
            Self {
                pid,
                stats,
                keepalive,
                cancel,
            },
            rx,
        ))
    }

    /// Delivery counters for this session.
    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Whether the sampler has hit a terminal read failure and closed the
    /// output channel.
    pub fn is_terminated(&self) -> bool {
        self.keepalive.lock().is_none()
    }

    /// Halt sampling. The stop is observed at the next tick boundary; a tick
    /// already reading counters completes first. Does not close the output
    /// channel.
    pub fn stop(&self) {
        debug!(pid = self.pid, "stop requested");
        self.cancel.cancel();
    }
}

struct SamplerTask<R> {
    reader: R,
    pid: u32,
    interval: Duration,
    previous: RawSnapshot,
    tx: mpsc::Sender<Measure>,
    stats: Arc<MonitorStats>,
    keepalive: Arc<Mutex<Option<mpsc::Sender<Measure>>>>,
    cancel: CancellationToken,
}

impl<R: UsageReader> SamplerTask<R> {
    async fn run(mut self) {
        // First tick one full interval after start, not immediately.
        let start = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(pid = self.pid, "monitor stopped");
                    return;
                }
                _ = interval.tick() => {
                    if self.tick().is_break() {
                        return;
                    }
                }
            }
        }
    }

    /// One serial sample: read, diff against the previous snapshot, publish.
    fn tick(&mut self) -> ControlFlow<()> {
        let curr = match self.read_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(pid = self.pid, error = %e, "read failed, closing output");
                // Dropping every sender closes the channel. A deliberate
                // stop never takes this path.
                self.keepalive.lock().take();
                return ControlFlow::Break(());
            }
        };

        let measure = Measure::between(&self.previous, &curr);

        match self.tx.try_send(measure) {
            Ok(()) => {
                self.stats.emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                // Liveness over completeness: never wait for the consumer.
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(pid = self.pid, "output full, dropping measure");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(pid = self.pid, "consumer gone, stopping monitor");
                return ControlFlow::Break(());
            }
        }

        self.previous = curr;
        ControlFlow::Continue(())
    }

    fn read_snapshot(&self) -> Result<RawSnapshot, ReadError> {
        let process = self.reader.process_usage(self.pid)?;
        let resident_kb = self.reader.process_memory(self.pid)?;
        let system = self.reader.system_usage()?;
        Ok(RawSnapshot {
            process,
            system,
            resident_kb,
        })
    }
}
