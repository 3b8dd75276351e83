use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use hperf::catalog::{Catalog, CpuModel};
use hperf::detect::CounterDetector;
use hperf::driver::{self, TargetProcess};
use hperf::profile::{self, ProfileConfig, ProfileMode};
use hperf::report::{Reporter, CSV_HEADER};

/// Efficiently collect PMU data by multiplexing hardware counter groups.
///
/// Specify the target with --pid <PID> or by giving a command, or use
/// --system-wide to monitor whole CPUs.
#[derive(Debug, Parser)]
#[command(name = "hperf", version, about)]
struct Cli {
    /// Measurement duration in seconds.
    #[arg(short, long)]
    duration: Option<u64>,

    /// Event group switching interval in milliseconds.
    #[arg(short, long, default_value_t = 1000)]
    interval: u64,

    /// System-wide measurement.
    #[arg(short = 'a', long)]
    system_wide: bool,

    /// Only monitor the given CPUs (comma-separated ids and ranges,
    /// e.g. "1,3-5,7"). System-wide only; defaults to all online CPUs.
    #[arg(short, long)]
    cpu: Option<String>,

    /// Per-process measurement of an already-running process.
    #[arg(short, long)]
    pid: Option<i32>,

    /// Write the raw record stream as CSV into the given file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Event catalog and metric formulas to use.
    #[arg(long, value_enum, default_value = "oryon")]
    cpu_model: CpuModel,

    /// Detect the number of programmable hardware counters on each CPU,
    /// print the result and exit.
    #[arg(long)]
    detect_counters: bool,

    /// Detect counters and merge the default event groups to fit.
    #[arg(long)]
    optimize_event_groups: bool,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Command to execute and measure.
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if cli.detect_counters {
        let mut detector = CounterDetector::new();
        println!("Detecting available programmable counters on each CPU ...");
        detector.detect();
        print_detected(&detector);
        return Ok(());
    }

    let mut config = build_config(cli)?;
    config.validate()?;

    let mut catalog = Catalog::for_model(config.cpu_model);
    catalog
        .validate()
        .context("the PMU event catalog is invalid")?;

    if config.optimize_groups {
        optimize_groups(&mut catalog, &config);
    }

    // Launch or check the target before any counter is opened.
    let mut target = match config.mode {
        ProfileMode::Subprocess => {
            let child = driver::spawn_target(&config.command)?;
            config.target_pid = Some(child.id() as i32);
            Some(TargetProcess::Spawned(child))
        }
        ProfileMode::TrackPid => {
            let pid = config.target_pid.context("no target pid")?;
            Some(TargetProcess::external(pid)?)
        }
        ProfileMode::SystemWide => None,
    };

    let mut csv = open_output(&config)?;

    echo_config(&config);

    let mut reporter = Reporter::new(&catalog, config.cpu_model);
    match target.as_mut() {
        None => driver::run_system_wide(&catalog, &config, &mut reporter, &mut csv)?,
        Some(target) => {
            driver::run_per_process(&catalog, &config, target, &mut reporter, &mut csv)?
        }
    }
    csv.flush().ok();

    reporter.estimate();
    reporter.print_stats();
    reporter.print_metrics();

    Ok(())
}

/// Lowers raw command-line options into a validated configuration.
fn build_config(cli: Cli) -> Result<ProfileConfig> {
    let mode = ProfileMode::from_flags(cli.system_wide, cli.pid.is_some(), !cli.command.is_empty())?;

    let cpu_ids = if mode == ProfileMode::SystemWide {
        match cli.cpu.as_deref() {
            Some(list) => {
                let cpu_ids = profile::parse_cpu_list(list);
                if cpu_ids.is_empty() {
                    return Err(profile::ConfigError::InvalidCpuList(list.to_string()).into());
                }
                cpu_ids
            }
            None => profile::all_online_cpus(),
        }
    } else {
        Vec::new()
    };

    Ok(ProfileConfig {
        mode,
        duration_secs: cli.duration,
        interval_ms: cli.interval,
        cpu_ids,
        target_pid: cli.pid,
        output_path: cli.output,
        cpu_model: cli.cpu_model,
        optimize_groups: cli.optimize_event_groups,
        command: cli.command,
    })
}

fn optimize_groups(catalog: &mut Catalog, config: &ProfileConfig) {
    let mut detector = CounterDetector::new();
    println!("Detecting available programmable counters on each CPU ...");
    detector.detect();
    print_detected(&detector);

    let capacity = detector.min_capacity().unwrap_or(-1);
    let budget = capacity as i64 - catalog.fixed_events().len() as i64;
    if budget <= 0 {
        warn!(capacity, "not enough detected counters to merge event groups");
        return;
    }

    println!("Adaptive Grouping:");
    println!("Before:");
    print_groups(catalog);
    catalog.adaptive_grouping(budget as usize);
    println!("After:");
    print_groups(catalog);
}

fn print_detected(detector: &CounterDetector) {
    for (cpu_id, capacity) in detector.capacities().iter().enumerate() {
        if *capacity > 0 {
            println!("{capacity} available programmable counters on CPU {cpu_id}");
        } else {
            println!("Undetected on CPU {cpu_id}");
        }
    }
}

fn print_groups(catalog: &Catalog) {
    for (idx, group) in catalog.groups().iter().enumerate() {
        let names: Vec<&str> = group.iter().map(|event| event.name).collect();
        println!("[{idx}]: {{ {} }}", names.join(", "));
    }
}

/// The raw CSV stream goes to the output file when one is given (with a
/// header), to stdout otherwise.
fn open_output(config: &ProfileConfig) -> Result<Box<dyn Write>> {
    match &config.output_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to open output file {}", path.display()))?;
            let mut out = BufWriter::new(file);
            writeln!(out, "{CSV_HEADER}")?;
            info!(path = %path.display(), "writing raw records");
            Ok(Box::new(out))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

fn echo_config(config: &ProfileConfig) {
    match config.duration_secs {
        Some(secs) => info!("test duration: {secs} seconds"),
        None => info!("test duration: until the target exits"),
    }
    info!("event group switch interval: {} ms", config.interval_ms);
    let mode = match config.mode {
        ProfileMode::SystemWide => "system-wide measurement",
        ProfileMode::TrackPid => "per-process measurement (tracking pid)",
        ProfileMode::Subprocess => "per-process measurement (command)",
    };
    info!("mode: {mode}");
    if config.mode == ProfileMode::SystemWide {
        info!("CPU id list: {:?}", config.cpu_ids);
    }
    if let Some(pid) = config.target_pid {
        info!("target pid: {pid}");
    }
    if !config.command.is_empty() {
        info!("command: {:?}", config.command);
    }
}
