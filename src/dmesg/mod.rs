//! Kernel message ring buffer access and streaming.

mod parse;

pub use parse::{parse_message, Message, ParseError};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::DmesgConfig;

/// Errors from reading the kernel message ring buffer.
#[derive(Debug, Error)]
pub enum DmesgError {
    #[error("reading kernel ring buffer: {0}")]
    Klog(std::io::Error),

    #[error("reading /proc/stat: {0}")]
    Io(std::io::Error),

    #[error("no btime line in /proc/stat")]
    NoBootTime,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("kernel ring buffer access is not supported on this platform")]
    Unsupported,
}

/// Find the system boot time in `/proc/stat` content: the `btime` line
/// carries it as seconds since the epoch. Ring buffer timestamps are
/// relative to boot, so this anchors them to wall-clock time.
pub fn boot_time(stat_text: &str) -> Option<DateTime<Utc>> {
    for line in stat_text.lines() {
        if let Some(rest) = line.strip_prefix("btime ") {
            let secs = rest.trim().parse::<i64>().ok()?;
            return DateTime::from_timestamp(secs, 0);
        }
    }
    None
}

/// Parse a full ring buffer snapshot into messages.
///
/// Lines starting with a space continue the previous message. Messages
/// without a timestamp of their own inherit the previous one; timestamped
/// messages are shifted from boot-relative to absolute time.
pub fn parse_buffer(boot: DateTime<Utc>, data: &str) -> Result<Vec<Message>, DmesgError> {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    let mut messages: Vec<Message> = Vec::new();
    let mut last_timestamp = epoch;

    for line in data.lines() {
        if let Some(rest) = line.strip_prefix(' ') {
            let Some(last) = messages.last_mut() else {
                return Err(ParseError::DanglingContinuation.into());
            };
            last.text.push_str(rest);
            continue;
        }

        let mut message = parse_message(line)?;
        if message.timestamp == epoch {
            message.timestamp = last_timestamp;
        } else {
            message.timestamp = message
                .timestamp
                .checked_add_signed(TimeDelta::seconds(boot.timestamp()))
                .ok_or(ParseError::TimestampRange)?;
            last_timestamp = message.timestamp;
        }

        messages.push(message);
    }

    Ok(messages)
}

/// Kernel ring buffer reader; remembers the boot time needed to make
/// message timestamps absolute.
pub struct KernelLog {
    boot: DateTime<Utc>,
}

impl KernelLog {
    #[cfg(target_os = "linux")]
    pub fn new() -> Result<Self, DmesgError> {
        let stat = std::fs::read_to_string("/proc/stat").map_err(DmesgError::Io)?;
        let boot = boot_time(&stat).ok_or(DmesgError::NoBootTime)?;
        Ok(Self { boot })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn new() -> Result<Self, DmesgError> {
        Err(DmesgError::Unsupported)
    }

    /// Current contents of the kernel message ring buffer, parsed.
    pub fn messages(&self) -> Result<Vec<Message>, DmesgError> {
        let data = self.current()?;
        parse_buffer(self.boot, &data)
    }

    #[cfg(target_os = "linux")]
    fn current(&self) -> Result<String, DmesgError> {
        // SYSLOG_ACTION_* values per klogctl(2); libc does not name them.
        const SYSLOG_ACTION_READ_ALL: libc::c_int = 3;
        const SYSLOG_ACTION_SIZE_BUFFER: libc::c_int = 10;

        let size = unsafe { libc::klogctl(SYSLOG_ACTION_SIZE_BUFFER, std::ptr::null_mut(), 0) };
        if size < 0 {
            return Err(DmesgError::Klog(std::io::Error::last_os_error()));
        }

        let mut buffer = vec![0u8; size as usize];
        let read = unsafe {
            libc::klogctl(
                SYSLOG_ACTION_READ_ALL,
                buffer.as_mut_ptr().cast::<libc::c_char>(),
                size,
            )
        };
        if read < 0 {
            return Err(DmesgError::Klog(std::io::Error::last_os_error()));
        }

        buffer.truncate(read as usize);
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    #[cfg(not(target_os = "linux"))]
    fn current(&self) -> Result<String, DmesgError> {
        Err(DmesgError::Unsupported)
    }
}

/// Start a background task that polls the ring buffer and sends each new
/// message to the returned channel.
///
/// Read errors after startup are logged and retried on the next poll; only
/// a failure to set up the reader is returned here.
pub fn stream(
    cfg: &DmesgConfig,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<Message>, DmesgError> {
    let log = KernelLog::new()?;
    let (tx, rx) = mpsc::channel(cfg.channel_capacity);
    let poll_interval = cfg.poll_interval;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Resume strictly after the newest message already delivered.
        let mut last_seen: Option<DateTime<Utc>> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("kernel log stream stopped");
                    return;
                }
                _ = interval.tick() => {
                    let messages = match log.messages() {
                        Ok(messages) => messages,
                        Err(e) => {
                            warn!(error = %e, "kernel log read failed, will retry");
                            continue;
                        }
                    };

                    for message in messages {
                        if last_seen.is_some_and(|seen| message.timestamp <= seen) {
                            continue;
                        }
                        last_seen = Some(message.timestamp);
                        if tx.send(message).await.is_err() {
                            debug!("kernel log consumer gone, stopping stream");
                            return;
                        }
                    }
                }
            }
        }
    });

    Ok(rx)
}
