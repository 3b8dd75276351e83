use std::io::Write;
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::count::{EventScheduler, Target};
use crate::ffi::syscall;
use crate::profile::ProfileConfig;
use crate::report::{Record, Reporter};

/// Ceiling for per-process runs started without an explicit duration.
const MAX_DURATION_SECS: u64 = 600;

/// Delay between launching a subprocess and opening its counters, so the
/// counters attach to the command rather than to the exec trampoline.
const LAUNCH_SETTLE_MILLIS: u64 = 100;

/// The process being measured in per-process mode.
///
/// A spawned child must be reaped through its handle; an external pid can
/// only be observed from the outside, so liveness is polled differently per
/// variant.
pub enum TargetProcess {
    Spawned(Child),
    External(i32),
}

impl TargetProcess {
    /// Attaches to an already-running process, verifying it exists first.
    pub fn external(pid: i32) -> Result<Self> {
        if !syscall::process_exists(pid) {
            anyhow::bail!("process with pid {pid} does not exist");
        }
        info!(pid, "monitoring process");
        Ok(TargetProcess::External(pid))
    }

    pub fn pid(&self) -> i32 {
        match self {
            TargetProcess::Spawned(child) => child.id() as i32,
            TargetProcess::External(pid) => *pid,
        }
    }

    /// Best-effort liveness poll. The pid could be reused between this call
    /// and the next counter read; that race is accepted.
    fn is_alive(&mut self) -> bool {
        match self {
            TargetProcess::Spawned(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    info!(pid = child.id(), %status, "target process has terminated");
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    warn!(pid = child.id(), error = %e, "failed to poll target process");
                    true
                }
            },
            TargetProcess::External(pid) => {
                let alive = syscall::process_exists(*pid);
                if !alive {
                    info!(pid = *pid, "target process no longer exists");
                }
                alive
            }
        }
    }
}

/// Launches the command under measurement and gives it a moment to start.
pub fn spawn_target(command: &[String]) -> Result<Child> {
    let (program, args) = command
        .split_first()
        .context("no command to execute")?;
    let child = Command::new(program)
        .args(args)
        .spawn()
        .with_context(|| format!("failed to execute command {program:?}"))?;
    info!(pid = child.id(), command = %program, "command started");
    thread::sleep(Duration::from_millis(LAUNCH_SETTLE_MILLIS));
    Ok(child)
}

/// Measures all processes on every configured CPU for the configured
/// duration, rotating event groups every interval.
pub fn run_system_wide(
    catalog: &Catalog,
    config: &ProfileConfig,
    reporter: &mut Reporter,
    csv: &mut dyn Write,
) -> Result<()> {
    let mut schedulers = Vec::with_capacity(config.cpu_ids.len());
    for &cpu in &config.cpu_ids {
        let scheduler = EventScheduler::open(catalog, Target::Cpu(cpu))
            .with_context(|| format!("failed to initialize the event scheduler on CPU {cpu}"))?;
        schedulers.push(scheduler);
    }

    for scheduler in &mut schedulers {
        scheduler
            .reset_all_groups()
            .with_context(|| format!("failed to reset counters for {:?}", scheduler.target()))?;
    }

    let duration = config
        .duration_secs
        .context("system-wide measurement requires a duration")?;
    let interval = Duration::from_millis(config.interval_ms);
    let start = Instant::now();
    let end = start + Duration::from_secs(duration);

    for scheduler in &mut schedulers {
        scheduler
            .enable_active_group()
            .with_context(|| format!("failed to start counters for {:?}", scheduler.target()))?;
    }

    info!("system-wide: collecting data");

    while Instant::now() < end {
        thread::sleep(interval);

        let timestamp_ns = start.elapsed().as_nanos() as u64;
        for scheduler in &mut schedulers {
            emit_records(scheduler, timestamp_ns, reporter, csv);
        }

        for scheduler in &mut schedulers {
            if let Err(e) = scheduler.switch_to_next_group() {
                warn!(
                    scope = ?scheduler.target(),
                    error = %e,
                    "failed to switch event group",
                );
            }
        }
    }

    for scheduler in &mut schedulers {
        if let Err(e) = scheduler.disable_active_group() {
            warn!(scope = ?scheduler.target(), error = %e, "failed to stop counters");
        }
    }

    info!("system-wide: data collection finished");
    Ok(())
}

/// Measures one process until it exits or the duration elapses.
pub fn run_per_process(
    catalog: &Catalog,
    config: &ProfileConfig,
    target: &mut TargetProcess,
    reporter: &mut Reporter,
    csv: &mut dyn Write,
) -> Result<()> {
    let pid = target.pid();
    let mut scheduler = EventScheduler::open(catalog, Target::Process(pid as u32))
        .with_context(|| format!("failed to initialize the event scheduler for pid {pid}"))?;

    scheduler
        .reset_all_groups()
        .with_context(|| format!("failed to reset counters for pid {pid}"))?;

    let interval = Duration::from_millis(config.interval_ms);
    let duration = config.duration_secs.unwrap_or(MAX_DURATION_SECS);
    let start = Instant::now();
    let end = start + Duration::from_secs(duration);

    scheduler
        .enable_active_group()
        .with_context(|| format!("failed to start counters for pid {pid}"))?;

    info!(pid, "per-process: collecting data");

    while Instant::now() < end {
        thread::sleep(interval);

        if !target.is_alive() {
            break;
        }

        let timestamp_ns = start.elapsed().as_nanos() as u64;
        emit_records(&mut scheduler, timestamp_ns, reporter, csv);

        if let Err(e) = scheduler.switch_to_next_group() {
            warn!(pid, error = %e, "failed to switch event group");
        }
    }

    if let Err(e) = scheduler.disable_active_group() {
        warn!(pid, error = %e, "failed to stop counters");
    }

    info!(pid, "per-process: data collection finished");
    Ok(())
}

/// Reads the active group and emits one record per event slot. Read
/// failures are transient: the estimator's time accounting absorbs a
/// missing interval.
fn emit_records(
    scheduler: &mut EventScheduler,
    timestamp_ns: u64,
    reporter: &mut Reporter,
    csv: &mut dyn Write,
) {
    let cpu_id = match scheduler.target() {
        Target::Cpu(cpu) => cpu as i32,
        Target::Process(_) => -1,
    };

    match scheduler.read_active_group() {
        Ok(bytes) if bytes > 0 => {
            let group_idx = scheduler.active_group_idx();
            let read_buf = scheduler.active_read_buf();
            for event_idx in 0..read_buf.nr() as usize {
                let Some(entry) = read_buf.entry(event_idx) else {
                    break;
                };
                let record = Record {
                    timestamp_ns,
                    cpu_id,
                    group_idx,
                    event_idx,
                    value: entry.value,
                };
                reporter.process_record(&record);
                if let Err(e) = reporter.write_csv_record(&record, csv) {
                    warn!(error = %e, "failed to write raw record");
                }
            }
        }
        Ok(_) => warn!(scope = ?scheduler.target(), "empty group read"),
        Err(e) => warn!(scope = ?scheduler.target(), error = %e, "failed to read event counts"),
    }
}
