//! Process and system CPU accounting from the /proc filesystem.
//!
//! Parsing is split from I/O: the `parse_*` functions are pure transforms
//! over the text of a single accounting file, and [`ProcReader`] wires them
//! to the live `/proc` tree. Everything is in kernel jiffies except resident
//! memory, which is reported in kB.

use thiserror::Error;

/// Errors from reading or parsing process accounting data.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("process {pid} not found")]
    NotFound { pid: u32 },

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}: expected at least {expected} fields, got {got}")]
    NotEnoughFields {
        file: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{file}: field {value:?} is not an unsigned number")]
    BadField { file: &'static str, value: String },

    #[error("no aggregate \"cpu\" line in system stat data")]
    NoCpuLine,

    #[error("process accounting is not supported on this platform")]
    Unsupported,
}

/// CPU time one process has accumulated, split by mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessTicks {
    pub user: u64,
    pub system: u64,
}

/// CPU time the whole machine has accumulated since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemTicks {
    pub user: u64,
    pub system: u64,
    pub idle: u64,
}

/// Source of raw usage counters for the sampler.
///
/// `ProcReader` is the real implementation; tests substitute scripted fakes.
pub trait UsageReader: Send + Sync {
    /// Read the per-process user/system tick counters.
    fn process_usage(&self, pid: u32) -> Result<ProcessTicks, ReadError>;

    /// Read the process's resident memory size in kB.
    fn process_memory(&self, pid: u32) -> Result<u64, ReadError>;

    /// Read the machine-wide user/system/idle tick counters.
    fn system_usage(&self) -> Result<SystemTicks, ReadError>;
}

/// Parse the utime/stime counters out of `/proc/<pid>/stat` content.
///
/// Per proc(5) these are fields 14 and 15. The comm field is a parenthesized
/// group but contains no whitespace in the common case, so plain
/// whitespace splitting keeps the field positions stable.
pub fn parse_process_ticks(text: &str) -> Result<ProcessTicks, ReadError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() < 15 {
        return Err(ReadError::NotEnoughFields {
            file: "stat",
            expected: 15,
            got: fields.len(),
        });
    }

    Ok(ProcessTicks {
        user: parse_u64("stat", fields[13])?,
        system: parse_u64("stat", fields[14])?,
    })
}

/// Parse the resident set size out of `/proc/<pid>/statm` content.
///
/// Per proc(5) this is field 2.
pub fn parse_resident_kb(text: &str) -> Result<u64, ReadError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(ReadError::NotEnoughFields {
            file: "statm",
            expected: 2,
            got: fields.len(),
        });
    }

    parse_u64("statm", fields[1])
}

/// Parse the machine-wide counters out of `/proc/stat` content.
///
/// Only the aggregate line matters: its first token is exactly `cpu`
/// (per-core lines are `cpu0`, `cpu1`, ... and must not match). The token
/// sequence after the marker is user, nice, system, idle; nice time counts
/// as user time.
pub fn parse_system_ticks(text: &str) -> Result<SystemTicks, ReadError> {
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() != Some(&"cpu") {
            continue;
        }

        if fields.len() < 5 {
            return Err(ReadError::NotEnoughFields {
                file: "stat",
                expected: 5,
                got: fields.len(),
            });
        }

        let user = parse_u64("stat", fields[1])?;
        let nice = parse_u64("stat", fields[2])?;
        let system = parse_u64("stat", fields[3])?;
        let idle = parse_u64("stat", fields[4])?;

        return Ok(SystemTicks {
            user: user.saturating_add(nice),
            system,
            idle,
        });
    }

    Err(ReadError::NoCpuLine)
}

fn parse_u64(file: &'static str, value: &str) -> Result<u64, ReadError> {
    value.parse::<u64>().map_err(|_| ReadError::BadField {
        file,
        value: value.to_string(),
    })
}

/// Reads accounting data from the local /proc tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcReader;

#[cfg(target_os = "linux")]
impl UsageReader for ProcReader {
    fn process_usage(&self, pid: u32) -> Result<ProcessTicks, ReadError> {
        let text = read_pid_file(pid, "stat")?;
        parse_process_ticks(&text)
    }

    fn process_memory(&self, pid: u32) -> Result<u64, ReadError> {
        let text = read_pid_file(pid, "statm")?;
        parse_resident_kb(&text)
    }

    fn system_usage(&self) -> Result<SystemTicks, ReadError> {
        let path = "/proc/stat";
        let text = std::fs::read_to_string(path).map_err(|source| ReadError::Io {
            path: path.to_string(),
            source,
        })?;
        parse_system_ticks(&text)
    }
}

#[cfg(target_os = "linux")]
fn read_pid_file(pid: u32, name: &str) -> Result<String, ReadError> {
    let path = format!("/proc/{pid}/{name}");
    std::fs::read_to_string(&path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => ReadError::NotFound { pid },
        _ => ReadError::Io { path, source },
    })
}

#[cfg(not(target_os = "linux"))]
impl UsageReader for ProcReader {
    fn process_usage(&self, _pid: u32) -> Result<ProcessTicks, ReadError> {
        Err(ReadError::Unsupported)
    }

    fn process_memory(&self, _pid: u32) -> Result<u64, ReadError> {
        Err(ReadError::Unsupported)
    }

    fn system_usage(&self) -> Result<SystemTicks, ReadError> {
        Err(ReadError::Unsupported)
    }
}
