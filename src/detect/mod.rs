#[cfg(test)]
mod test;

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::count::buf::SingleReadBuffer;
use crate::ffi::{bindings as b, syscall, Attr};

/// Where detected per-CPU counter capacities are persisted, one decimal
/// integer per line in CPU-id order.
pub const CAPACITY_FILE: &str = "/tmp/.hperf";

const PROBE_MILLIS: u64 = 100;

// Raw ARMv8 architectural events used to stress the PMU. The exact events do
// not matter as long as they are all individually countable; 0x001e (chain)
// is excluded because it only counts as an odd-numbered counter's sibling.
const PROBE_EVENTS: &[(&str, u64)] = &[
    ("l1i_cache_refill", 0x0001),
    ("l1i_tlb_refill", 0x0002),
    ("l1d_cache_refill", 0x0003),
    ("l1d_cache", 0x0004),
    ("l1d_tlb_refill", 0x0005),
    ("ld_retired", 0x0006),
    ("st_retired", 0x0007),
    ("inst_retired", 0x0008),
    ("exc_taken", 0x0009),
    ("exc_return", 0x000a),
    ("cid_write_retired", 0x000b),
    ("pc_write_retired", 0x000c),
    ("br_immed_retired", 0x000d),
    ("br_return_retired", 0x000e),
    ("unaligned_ldst_retired", 0x000f),
    ("br_mis_pred", 0x0010),
    ("cpu_cycles", 0x0011),
    ("br_pred", 0x0012),
    ("mem_access", 0x0013),
    ("l1i_cache", 0x0014),
    ("l1d_cache_wb", 0x0015),
    ("l2d_cache", 0x0016),
    ("l2d_cache_refill", 0x0017),
    ("l2d_cache_wb", 0x0018),
    ("bus_access", 0x0019),
    ("memory_error", 0x001a),
    ("inst_spec", 0x001b),
    ("ttbr_write_retired", 0x001c),
    ("bus_cycles", 0x001d),
    ("l1d_cache_allocate", 0x001f),
    ("l2d_cache_allocate", 0x0020),
    ("br_retired", 0x0021),
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DetectError {
    #[error("programmable counter capacity has not been detected")]
    Undetected,
    #[error("CPU id {0} is out of bounds (0..{1})")]
    CpuOutOfBounds(usize, usize),
}

/// Empirically determines how many programmable counters each CPU can run
/// concurrently.
///
/// The kernel silently time-multiplexes counters when more events are
/// opened than the PMU can schedule at once, which would corrupt the
/// one-group-at-a-time accounting downstream. The detector opens an
/// increasing number of raw counters per CPU, lets them run for a moment,
/// and watches for the multiplexing signature: a counter whose
/// `time_enabled` exceeds its `time_running`.
pub struct CounterDetector {
    detected: bool,
    probes: Vec<File>,
    cpu_count: usize,
    capacities: Vec<i32>,
}

impl CounterDetector {
    pub fn new() -> Self {
        let cpu_count = syscall::online_cpu_count();
        Self {
            detected: false,
            probes: Vec::new(),
            cpu_count,
            capacities: vec![-1; cpu_count],
        }
    }

    /// Probes every CPU, reusing a previously persisted result when one
    /// matches the current CPU count. Idempotent.
    pub fn detect(&mut self) {
        if self.detected {
            return;
        }
        if self.load(Path::new(CAPACITY_FILE)) {
            self.detected = true;
            return;
        }

        for cpu_id in 0..self.cpu_count {
            for probe_count in 1..=PROBE_EVENTS.len() {
                match self.probe(cpu_id, probe_count) {
                    Ok(true) => {
                        self.capacities[cpu_id] = probe_count as i32;
                    }
                    Ok(false) => {
                        // Multiplexing kicked in at this count, so the
                        // hardware tops out one below it.
                        self.capacities[cpu_id] = probe_count as i32 - 1;
                        break;
                    }
                    Err(e) => {
                        warn!(cpu_id, error = %e, "probe failed, leaving capacity undetected");
                        self.capacities[cpu_id] = -1;
                        break;
                    }
                }
            }
            self.probes.clear();
        }

        self.detected = true;
        if let Err(e) = self.save(Path::new(CAPACITY_FILE)) {
            warn!(path = CAPACITY_FILE, error = %e, "failed to persist detected capacities");
        }
    }

    /// Runs `probe_count` concurrently enabled counters on `cpu_id` for a
    /// short window. Returns whether they all stayed on the PMU the whole
    /// time.
    fn probe(&mut self, cpu_id: usize, probe_count: usize) -> io::Result<bool> {
        while self.probes.len() < probe_count {
            let (name, encoding) = PROBE_EVENTS[self.probes.len()];
            let mut attr = probe_attr(encoding);
            let file = syscall::perf_event_open(
                &mut attr,
                -1,
                cpu_id as i32,
                -1,
                b::PERF_FLAG_FD_CLOEXEC as u64,
            )
            .inspect_err(|e| debug!(name, cpu_id, error = %e, "failed to open probe event"))?;
            self.probes.push(file);
        }

        for probe in &self.probes {
            syscall::ioctl_enable(probe, 0)?;
        }
        thread::sleep(Duration::from_millis(PROBE_MILLIS));
        for probe in &self.probes {
            syscall::ioctl_disable(probe, 0)?;
        }

        let mut buf = SingleReadBuffer::new();
        for probe in &self.probes {
            let bytes = syscall::read(probe, buf.as_mut_slice())?;
            if bytes != buf.size() {
                warn!(bytes, expected = buf.size(), "short probe read");
                continue;
            }
            if buf.time_enabled() != buf.time_running() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Detected capacity for one CPU; `-1` means the probe failed there.
    pub fn capacity(&self, cpu_id: usize) -> Result<i32, DetectError> {
        if !self.detected {
            return Err(DetectError::Undetected);
        }
        self.capacities
            .get(cpu_id)
            .copied()
            .ok_or(DetectError::CpuOutOfBounds(cpu_id, self.cpu_count))
    }

    /// The minimum capacity across all CPUs. On heterogeneous systems the
    /// little cores bound what every group may assume.
    pub fn min_capacity(&self) -> Result<i32, DetectError> {
        if !self.detected {
            return Err(DetectError::Undetected);
        }
        Ok(self.capacities.iter().copied().min().unwrap_or(-1))
    }

    pub fn capacities(&self) -> &[i32] {
        &self.capacities
    }

    fn save(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        for capacity in &self.capacities {
            writeln!(file, "{capacity}")?;
        }
        Ok(())
    }

    /// Loads a persisted result. Only a file with exactly one well-formed
    /// line per online CPU is trusted; anything else is discarded so that
    /// `detect` re-probes.
    fn load(&mut self, path: &Path) -> bool {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return false;
        };

        let mut capacities = Vec::with_capacity(self.cpu_count);
        for line in contents.lines() {
            match line.trim().parse::<i32>() {
                Ok(capacity) => capacities.push(capacity),
                Err(_) => return false,
            }
        }

        if capacities.len() == self.cpu_count {
            self.capacities = capacities;
            true
        } else {
            false
        }
    }
}

impl Default for CounterDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn probe_attr(encoding: u64) -> Attr {
    let mut attr = Attr {
        size: size_of::<Attr>() as _,
        ..Default::default()
    };
    attr.type_ = b::PERF_TYPE_RAW;
    attr.config = encoding;
    attr.read_format = (b::PERF_FORMAT_TOTAL_TIME_ENABLED
        | b::PERF_FORMAT_TOTAL_TIME_RUNNING
        | b::PERF_FORMAT_ID) as u64;
    attr.set_disabled(1);
    attr
}
