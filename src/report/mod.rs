#[cfg(test)]
mod test;

use std::io::{self, Write};

use crate::catalog::{Catalog, CpuModel};

/// Header of the raw CSV record stream.
pub const CSV_HEADER: &str = "timestamp,cpu,group,event,value";

/// One event count observed over one measurement interval.
#[derive(Clone, Copy, Debug)]
pub struct Record {
    /// Nanoseconds since measurement start.
    pub timestamp_ns: u64,
    /// CPU the count was taken on, `-1` in per-process mode.
    pub cpu_id: i32,
    pub group_idx: usize,
    /// Slot within the group read: fixed events first, then schedulable.
    pub event_idx: usize,
    pub value: u64,
}

/// Aggregated counts for one event slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventStats {
    /// Sum of the raw per-interval counts.
    pub total: u64,
    /// Projection to the full measurement window.
    pub estimated: u64,
}

/// Aggregates records and projects per-group counts to full-window
/// estimates.
///
/// Each group only counts while it holds the PMU, so its raw totals cover
/// `enabled_time / total_time` of the window. Assuming event rates are
/// stationary between samples (the standard perf multiplexing estimate),
/// scaling by the inverse ratio recovers what the counter would have read
/// had it run the whole time. Fixed events run in every group, so their
/// slices tile the window and their totals sum instead.
pub struct Reporter<'a> {
    catalog: &'a Catalog,
    model: CpuModel,
    /// `[group][slot]` grid; slots `0..fixed.len()` alias across groups.
    stats: Vec<Vec<EventStats>>,
    enabled_time_ns: Vec<u64>,
    total_time_ns: u64,
    prev_timestamp: u64,
}

impl<'a> Reporter<'a> {
    pub fn new(catalog: &'a Catalog, model: CpuModel) -> Self {
        let stats = (0..catalog.group_count())
            .map(|idx| vec![EventStats::default(); catalog.events_in_group(idx)])
            .collect();
        Self {
            catalog,
            model,
            stats,
            enabled_time_ns: vec![0; catalog.group_count()],
            total_time_ns: 0,
            prev_timestamp: 0,
        }
    }

    /// Folds one record into the grid and attributes the elapsed interval
    /// to the record's group.
    ///
    /// Records from one read burst share a timestamp, so only the first of
    /// them advances the clock; the interval is credited to that record's
    /// group, which is correct because a burst only ever carries one group
    /// per scheduler.
    pub fn process_record(&mut self, record: &Record) {
        if record.timestamp_ns > self.prev_timestamp {
            let delta = record.timestamp_ns - self.prev_timestamp;
            if let Some(enabled) = self.enabled_time_ns.get_mut(record.group_idx) {
                *enabled += delta;
                self.total_time_ns += delta;
            }
            self.prev_timestamp = record.timestamp_ns;
        }

        if let Some(stat) = self
            .stats
            .get_mut(record.group_idx)
            .and_then(|group| group.get_mut(record.event_idx))
        {
            stat.total += record.value;
        }
    }

    /// One CSV row per record, event identified by name and group printed
    /// 1-based.
    pub fn write_csv_record(&self, record: &Record, out: &mut dyn Write) -> io::Result<()> {
        let name = self
            .catalog
            .event(record.group_idx, record.event_idx)
            .map_or("?", |event| event.name);
        writeln!(
            out,
            "{},{},{},{},{}",
            record.timestamp_ns,
            record.cpu_id,
            record.group_idx + 1,
            name,
            record.value,
        )
    }

    /// Turns raw totals into full-window estimates. Call once, after the
    /// measurement loop has finished.
    pub fn estimate(&mut self) {
        if self.stats.is_empty() {
            return;
        }
        let fixed_count = self.catalog.fixed_events().len();

        // Fixed events are measured in every group; the per-group slices
        // tile the window, so the full-window value is the plain sum,
        // stored in row 0.
        for slot in 0..fixed_count {
            let total = self.stats.iter().map(|group| group[slot].total).sum();
            self.stats[0][slot].estimated = total;
        }

        for group_idx in 0..self.stats.len() {
            let enabled = self.enabled_time_ns[group_idx];
            if enabled == 0 {
                // The run ended before this group ever held the PMU.
                continue;
            }
            let ratio = self.total_time_ns as f64 / enabled as f64;
            for stat in self.stats[group_idx].iter_mut().skip(fixed_count) {
                stat.estimated = (stat.total as f64 * ratio) as u64;
            }
        }
    }

    pub fn total_time_ns(&self) -> u64 {
        self.total_time_ns
    }

    pub fn enabled_time_ns(&self, group_idx: usize) -> u64 {
        self.enabled_time_ns.get(group_idx).copied().unwrap_or(0)
    }

    fn fixed_stat(&self, name: &str) -> EventStats {
        let fixed = self.catalog.fixed_events();
        fixed
            .iter()
            .position(|event| event.name == name)
            .map_or(EventStats::default(), |slot| self.stats[0][slot])
    }

    /// First schedulable slot matching `name` across all groups. Events the
    /// current model's catalog lacks read as zero.
    fn schedulable_stat(&self, name: &str) -> EventStats {
        let fixed_count = self.catalog.fixed_events().len();
        for (group_idx, group) in self.catalog.groups().iter().enumerate() {
            if let Some(pos) = group.iter().position(|event| event.name == name) {
                return self.stats[group_idx][fixed_count + pos];
            }
        }
        EventStats::default()
    }

    pub fn print_stats(&self) {
        println!("========== Performance Statistics ==========");

        let total_ms = self.total_time_ns as f64 / 1e6;
        println!("Fixed events ({total_ms:.2} ms, 100.00 %)");
        for (slot, event) in self.catalog.fixed_events().iter().enumerate() {
            print_count(self.stats[0][slot].estimated, event.name);
        }

        for (group_idx, group) in self.catalog.groups().iter().enumerate() {
            let enabled = self.enabled_time_ns[group_idx];
            let percentage = if self.total_time_ns > 0 {
                enabled as f64 * 100.0 / self.total_time_ns as f64
            } else {
                0.0
            };
            println!(
                "Group {} ({:.2} ms, {percentage:.2} %)",
                group_idx + 1,
                enabled as f64 / 1e6,
            );

            let fixed_count = self.catalog.fixed_events().len();
            for (pos, event) in group.iter().enumerate() {
                print_count(self.stats[group_idx][fixed_count + pos].estimated, event.name);
            }
        }
    }

    pub fn print_metrics(&self) {
        println!("=========== Performance Metrics ============");
        match self.model {
            CpuModel::Oryon => self.print_metrics_oryon(),
            CpuModel::CortexX4 => self.print_metrics_cortex_x4(),
        }
        println!("============================================");
    }

    fn print_pipeline_metrics(&self) {
        println!("Pipeline basic metrics:");
        let cpu_cycles = self.fixed_stat("cpu_cycles").estimated;
        let inst_retired = self.fixed_stat("inst_retired").estimated;
        let cnt_cycles = self.fixed_stat("cnt_cycles").estimated;
        let cnt_freq = counter_frequency();

        print_decimal(cpu_cycles, inst_retired, "CPI");
        print_percentage(
            cnt_cycles.saturating_mul(1_000_000_000),
            cnt_freq.saturating_mul(self.total_time_ns),
            "CPU utilization",
        );
        print_ghz(
            cpu_cycles.saturating_mul(cnt_freq),
            cnt_cycles.saturating_mul(1_000_000_000),
            "Average frequency",
        );
    }

    fn print_instruction_mix(&self) {
        println!("Breakdown based on instruction mix:");
        let inst_spec = self.schedulable_stat("inst_spec").total;

        print_percentage(self.schedulable_stat("ld_spec").total, inst_spec, "Load");
        print_percentage(self.schedulable_stat("st_spec").total, inst_spec, "Store");
        print_percentage(
            self.schedulable_stat("dp_spec").total,
            inst_spec,
            "Integer data processing",
        );
        print_percentage(
            self.schedulable_stat("vfp_spec").total,
            inst_spec,
            "Floating point",
        );
        print_percentage(
            self.schedulable_stat("ase_spec").total,
            inst_spec,
            "Advanced SIMD",
        );
        print_percentage(
            self.schedulable_stat("br_immed_spec").total,
            inst_spec,
            "Immediate branch",
        );
        print_percentage(
            self.schedulable_stat("br_indirect_spec").total,
            inst_spec,
            "Indirect branch",
        );
        print_percentage(
            self.schedulable_stat("br_return_spec").total,
            inst_spec,
            "Return branch",
        );
    }

    fn print_metrics_oryon(&self) {
        self.print_pipeline_metrics();
        self.print_instruction_mix();

        println!("Breakdown based on misses:");
        let instructions = self.fixed_stat("inst_retired").total;

        println!(" Cache:");
        print_decimal(
            self.schedulable_stat("l1d_cache_refill").total * 1000,
            instructions,
            "L1D cache MPKI",
        );
        print_decimal(
            self.schedulable_stat("l1i_cache_refill").total * 1000,
            instructions,
            "L1I cache MPKI",
        );
        print_decimal(
            self.schedulable_stat("l2d_cache_refill").total * 1000,
            instructions,
            "L2 cache MPKI",
        );

        println!(" TLB:");
        print_decimal(
            self.schedulable_stat("l1d_tlb_refill").total * 1000,
            instructions,
            "L1D TLB MPKI",
        );
        print_decimal(
            self.schedulable_stat("l1i_tlb_refill").total * 1000,
            instructions,
            "L1I TLB MPKI",
        );
        print_decimal(
            self.schedulable_stat("dtlb_walk").total * 1000,
            instructions,
            "DTLB walk PKI",
        );
        print_decimal(
            self.schedulable_stat("itlb_walk").total * 1000,
            instructions,
            "ITLB walk PKI",
        );

        println!(" Branch predictor:");
        print_decimal(
            self.schedulable_stat("br_mis_pred_retired").total * 1000,
            instructions,
            "Branch MPKI",
        );

        println!("Memory access latency:");
        print_cycles(
            self.schedulable_stat("bus_access_rd_cycles").total,
            self.schedulable_stat("bus_access_rd").total,
            "Bus read latency",
        );
        print_cycles(
            self.schedulable_stat("bus_access_wr_cycles").total,
            self.schedulable_stat("bus_access_wr").total,
            "Bus write latency",
        );
        print_cycles(
            self.schedulable_stat("mem_access_rd_cycles").total,
            self.schedulable_stat("mem_access_rd").total,
            "Memory read latency",
        );
        print_cycles(
            self.schedulable_stat("dtlb_walk_cycles").total,
            self.schedulable_stat("dtlb_walk").total,
            "DTLB walk latency",
        );
        print_cycles(
            self.schedulable_stat("itlb_walk_cycles").total,
            self.schedulable_stat("itlb_walk").total,
            "ITLB walk latency",
        );
    }

    fn print_metrics_cortex_x4(&self) {
        self.print_pipeline_metrics();
        self.print_instruction_mix();

        println!("Breakdown based on misses:");
        let instructions = self.fixed_stat("inst_retired").total;

        println!(" Cache:");
        print_decimal(
            self.schedulable_stat("l1d_cache_refill").total * 1000,
            instructions,
            "L1D cache MPKI",
        );
        print_decimal(
            self.schedulable_stat("l1i_cache_refill").total * 1000,
            instructions,
            "L1I cache MPKI",
        );
        print_decimal(
            self.schedulable_stat("l2d_cache_refill").total * 1000,
            instructions,
            "L2 cache MPKI",
        );
        print_decimal(
            self.schedulable_stat("l3d_cache_refill").total * 1000,
            instructions,
            "L3 cache MPKI",
        );

        println!(" TLB:");
        print_decimal(
            self.schedulable_stat("l1d_tlb_refill").total * 1000,
            instructions,
            "L1D TLB MPKI",
        );
        print_decimal(
            self.schedulable_stat("l1i_tlb_refill").total * 1000,
            instructions,
            "L1I TLB MPKI",
        );
        print_decimal(
            self.schedulable_stat("dtlb_walk").total * 1000,
            instructions,
            "DTLB walk PKI",
        );
        print_decimal(
            self.schedulable_stat("itlb_walk").total * 1000,
            instructions,
            "ITLB walk PKI",
        );

        println!(" Branch predictor:");
        print_decimal(
            self.schedulable_stat("br_mis_pred_retired").total * 1000,
            instructions,
            "Branch MPKI",
        );

        println!("Memory access latency:");
        print_cycles(
            self.schedulable_stat("mem_access_rd_percyc").total,
            self.schedulable_stat("mem_access_rd").total,
            "Memory read latency",
        );
        print_cycles(
            self.schedulable_stat("dtlb_walk_percyc").total,
            self.schedulable_stat("dtlb_walk").total,
            "DTLB walk latency",
        );
        print_cycles(
            self.schedulable_stat("itlb_walk_percyc").total,
            self.schedulable_stat("itlb_walk").total,
            "ITLB walk latency",
        );
    }
}

fn format_with_commas(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn print_count(count: u64, event_name: &str) {
    println!("  {:<22}{:>20}", event_name, format_with_commas(count));
}

fn print_percentage(a: u64, b: u64, metric_name: &str) {
    let pct = if b > 0 { a as f64 / b as f64 * 100.0 } else { 0.0 };
    println!("  {metric_name:<27}{pct:>13.2} %");
}

fn print_decimal(a: u64, b: u64, metric_name: &str) {
    let decimal = if b > 0 { a as f64 / b as f64 } else { 0.0 };
    println!("  {metric_name:<30}{decimal:>12.4}");
}

fn print_cycles(a: u64, b: u64, metric_name: &str) {
    let cycles = if b > 0 { a as f64 / b as f64 } else { 0.0 };
    println!("  {metric_name:<23}{cycles:>12.4} cycles");
}

fn print_ghz(a: u64, b: u64, metric_name: &str) {
    let freq = if b > 0 { a as f64 / b as f64 } else { 0.0 };
    println!("  {metric_name:<22}{freq:>16.4} GHz");
}

/// Frequency of the generic timer in Hz, from `CNTFRQ_EL0`. The CPU
/// utilization and average-frequency metrics need it to relate
/// `cnt_cycles` to wall time; off aarch64 there is no such register and
/// the dependent metrics print 0.
#[cfg(target_arch = "aarch64")]
fn counter_frequency() -> u64 {
    let freq: u64;
    unsafe {
        core::arch::asm!("mrs {}, cntfrq_el0", out(reg) freq);
    }
    freq
}

#[cfg(not(target_arch = "aarch64"))]
fn counter_frequency() -> u64 {
    0
}
