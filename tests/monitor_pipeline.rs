//! End-to-end monitor behavior driven through a scripted usage reader.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::timeout;

use procscope::config::MonitorConfig;
use procscope::monitor::Monitor;
use procscope::procfs::{ProcessTicks, ReadError, SystemTicks, UsageReader};

const PID: u32 = 4242;

#[derive(Debug, Clone, Copy)]
enum Step {
    Snapshot {
        process: ProcessTicks,
        system: SystemTicks,
        resident_kb: u64,
    },
    Fail,
}

fn snapshot(
    user: u64,
    system: u64,
    sys_user: u64,
    sys_system: u64,
    sys_idle: u64,
    resident_kb: u64,
) -> Step {
    Step::Snapshot {
        process: ProcessTicks { user, system },
        system: SystemTicks {
            user: sys_user,
            system: sys_system,
            idle: sys_idle,
        },
        resident_kb,
    }
}

/// Serves a fixed sequence of snapshots, one per sampling round. The last
/// step repeats forever; a `Fail` step makes every read error.
struct ScriptedReader {
    steps: Mutex<VecDeque<Step>>,
}

impl ScriptedReader {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
        }
    }

    fn current(&self) -> Step {
        *self
            .steps
            .lock()
            .expect("script lock")
            .front()
            .expect("script exhausted")
    }

    // The sampler reads system usage last in every round; use that read to
    // advance the script.
    fn advance(&self) {
        let mut steps = self.steps.lock().expect("script lock");
        if steps.len() > 1 {
            steps.pop_front();
        }
    }
}

impl UsageReader for ScriptedReader {
    fn process_usage(&self, pid: u32) -> Result<ProcessTicks, ReadError> {
        match self.current() {
            Step::Snapshot { process, .. } => Ok(process),
            Step::Fail => Err(ReadError::NotFound { pid }),
        }
    }

    fn process_memory(&self, pid: u32) -> Result<u64, ReadError> {
        match self.current() {
            Step::Snapshot { resident_kb, .. } => Ok(resident_kb),
            Step::Fail => Err(ReadError::NotFound { pid }),
        }
    }

    fn system_usage(&self) -> Result<SystemTicks, ReadError> {
        let step = self.current();
        self.advance();
        match step {
            Step::Snapshot { system, .. } => Ok(system),
            Step::Fail => Err(ReadError::NotFound { pid: PID }),
        }
    }
}

fn test_config(capacity: usize) -> MonitorConfig {
    MonitorConfig {
        interval: Duration::from_millis(20),
        channel_capacity: capacity,
    }
}

#[tokio::test(start_paused = true)]
async fn measures_flow_in_tick_order() {
    let reader = ScriptedReader::new(vec![
        snapshot(100, 50, 1000, 500, 2000, 0),
        snapshot(152, 89, 1152, 689, 2100, 534),
        snapshot(200, 100, 1300, 800, 2200, 600),
    ]);

    let (monitor, mut rx) =
        Monitor::start(reader, PID, &test_config(8)).expect("preflight succeeds");

    let first = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first measure in time")
        .expect("channel open");
    assert_eq!(first.user, 52);
    assert_eq!(first.system, 39);
    assert_eq!(first.user_total, 152);
    assert_eq!(first.system_total, 189);
    assert_eq!(first.idle_total, 100);
    assert_eq!(first.memory_kb, 534);
    assert!((first.user_percent() - 100.0 * 52.0 / 441.0).abs() < 1e-9);

    let second = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("second measure in time")
        .expect("channel open");
    assert_eq!(second.user, 48);
    assert_eq!(second.system, 11);
    assert_eq!(second.user_total, 148);
    assert_eq!(second.system_total, 111);
    assert_eq!(second.memory_kb, 600);

    assert!(monitor.stats().emitted() >= 2);
    assert!(!monitor.is_terminated());
}

#[tokio::test]
async fn preflight_failure_fails_construction() {
    let reader = ScriptedReader::new(vec![Step::Fail]);

    let result = Monitor::start(reader, PID, &test_config(1));
    assert!(matches!(result, Err(ReadError::NotFound { pid: PID })));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn preflight_fails_for_missing_process() {
    use procscope::procfs::ProcReader;

    // No real pid gets anywhere near u32::MAX.
    let result = Monitor::start(ProcReader, u32::MAX, &test_config(1));
    assert!(matches!(result, Err(ReadError::NotFound { .. })));
}

#[tokio::test(start_paused = true)]
async fn stop_halts_sampling_without_closing_channel() {
    let reader = ScriptedReader::new(vec![
        snapshot(100, 50, 1000, 500, 2000, 0),
        snapshot(152, 89, 1152, 689, 2100, 534),
        snapshot(200, 100, 1300, 800, 2200, 600),
    ]);

    let (monitor, mut rx) =
        Monitor::start(reader, PID, &test_config(8)).expect("preflight succeeds");

    let _first = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first measure in time")
        .expect("channel open");

    monitor.stop();

    // Give the sampler several would-be ticks to prove it stopped.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Drain anything that raced the stop, then confirm silence.
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Still empty, and open: only a read failure closes the channel.
    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    assert!(!monitor.is_terminated());
}

#[tokio::test(start_paused = true)]
async fn read_failure_closes_channel() {
    let reader = ScriptedReader::new(vec![
        snapshot(100, 50, 1000, 500, 2000, 0),
        snapshot(152, 89, 1152, 689, 2100, 534),
        Step::Fail,
    ]);

    let (monitor, mut rx) =
        Monitor::start(reader, PID, &test_config(8)).expect("preflight succeeds");

    let first = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first measure in time")
        .expect("channel open");
    assert_eq!(first.user, 52);

    // The next sampling round hits the failing read; the channel closes.
    let closed = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("close in time");
    assert!(closed.is_none());
    assert!(monitor.is_terminated());
}

#[tokio::test(start_paused = true)]
async fn full_channel_drops_newest_sample() {
    let reader = ScriptedReader::new(vec![
        snapshot(100, 50, 1000, 500, 2000, 0),
        snapshot(110, 55, 1100, 550, 2010, 400),
        snapshot(120, 60, 1200, 600, 2020, 410),
        snapshot(130, 65, 1300, 650, 2030, 420),
    ]);

    // Reference capacity: one buffered measure.
    let (monitor, mut rx) =
        Monitor::start(reader, PID, &test_config(1)).expect("preflight succeeds");

    // Four ticks pass with nobody receiving: the first fills the buffer,
    // the rest are dropped without blocking the sampler.
    tokio::time::sleep(Duration::from_millis(90)).await;

    assert_eq!(monitor.stats().emitted(), 1);
    assert_eq!(monitor.stats().dropped(), 3);

    // The buffered measure is the oldest one, not the newest.
    let buffered = rx.try_recv().expect("one buffered measure");
    assert_eq!(buffered.user, 10);
    assert_eq!(buffered.memory_kb, 400);

    assert!(!monitor.is_terminated());
}
