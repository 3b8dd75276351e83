#[cfg(test)]
mod test;

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CpuModel;

/// How the measurement target is selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileMode {
    /// All processes, on every CPU in the configured list.
    SystemWide,
    /// An already-running process given by pid.
    TrackPid,
    /// A command we launch and follow until it exits.
    Subprocess,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cannot use multiple measurement modes simultaneously")]
    ConflictingModes,
    #[error("specify either --system-wide, --pid <PID>, or a command to execute")]
    MissingMode,
    #[error("system-wide measurement requires a duration greater than 0")]
    MissingDuration,
    #[error("invalid CPU id list: {0:?}")]
    InvalidCpuList(String),
}

/// Validated profiling options, lowered from the command line before any
/// counter is opened.
#[derive(Debug)]
pub struct ProfileConfig {
    pub mode: ProfileMode,
    /// Measurement window; `None` means run until the target exits
    /// (per-process modes only).
    pub duration_secs: Option<u64>,
    /// Group rotation interval.
    pub interval_ms: u64,
    /// CPUs measured in system-wide mode, in first-occurrence order.
    pub cpu_ids: Vec<u32>,
    /// Target pid; set at launch time for [`ProfileMode::Subprocess`].
    pub target_pid: Option<i32>,
    /// Raw CSV record destination; `None` streams to stdout.
    pub output_path: Option<PathBuf>,
    pub cpu_model: CpuModel,
    pub optimize_groups: bool,
    pub command: Vec<String>,
}

impl ProfileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == ProfileMode::SystemWide && self.duration_secs.unwrap_or(0) == 0 {
            return Err(ConfigError::MissingDuration);
        }
        Ok(())
    }
}

impl ProfileMode {
    /// Exactly one way of picking a target must be requested.
    pub fn from_flags(
        system_wide: bool,
        has_pid: bool,
        has_command: bool,
    ) -> Result<Self, ConfigError> {
        match (system_wide, has_pid, has_command) {
            (true, false, false) => Ok(ProfileMode::SystemWide),
            (false, true, false) => Ok(ProfileMode::TrackPid),
            (false, false, true) => Ok(ProfileMode::Subprocess),
            (false, false, false) => Err(ConfigError::MissingMode),
            _ => Err(ConfigError::ConflictingModes),
        }
    }
}

/// All online CPU ids, the system-wide default when no list is given.
pub fn all_online_cpus() -> Vec<u32> {
    (0..crate::ffi::syscall::online_cpu_count() as u32).collect()
}

/// Parses a comma-separated CPU list of `N` and `M-N` tokens, e.g.
/// `"1,3-5,7"` -> `[1, 3, 4, 5, 7]`.
///
/// Any malformed token (empty, non-numeric, negative, descending range)
/// poisons the whole list and yields an empty vector, which callers treat
/// as a validation error.
pub fn parse_cpu_list(list: &str) -> Vec<u32> {
    let mut cpus = Vec::new();
    if list.is_empty() {
        return cpus;
    }

    for token in list.split(',') {
        match token.split_once('-') {
            None => match token.parse::<u32>() {
                Ok(cpu) => cpus.push(cpu),
                Err(_) => return Vec::new(),
            },
            Some((start, end)) => {
                let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) else {
                    return Vec::new();
                };
                if end < start {
                    return Vec::new();
                }
                cpus.extend(start..=end);
            }
        }
    }
    cpus
}
