//! Collect Linux PMU data for more events than the CPU has counters.
//!
//! The PMU exposes a handful of programmable counters per core, far fewer
//! than the events worth watching. This crate opens the configured event
//! groups through [`perf_event_open`](https://man7.org/linux/man-pages/man2/perf_event_open.2.html),
//! lets exactly one group own the hardware at a time, rotates groups on a
//! fixed interval, and afterwards scales each group's counts by the share
//! of the window it was live to estimate full-window totals.
//!
//! ## Example
//!
//! Measure CPU 0 for a few rotation intervals:
//!
//! ```no_run
//! use std::thread;
//! use std::time::Duration;
//!
//! use hperf::catalog::{Catalog, CpuModel};
//! use hperf::count::{EventScheduler, Target};
//!
//! let catalog = Catalog::for_model(CpuModel::Oryon);
//! let mut scheduler = EventScheduler::open(&catalog, Target::Cpu(0)).unwrap();
//!
//! scheduler.reset_all_groups().unwrap();
//! scheduler.enable_active_group().unwrap();
//! for _ in 0..catalog.group_count() {
//!     thread::sleep(Duration::from_millis(100));
//!     let bytes = scheduler.read_active_group().unwrap();
//!     assert!(bytes > 0);
//!     scheduler.switch_to_next_group().unwrap();
//! }
//! scheduler.disable_active_group().unwrap();
//! ```
//!
//! Access to performance monitoring needs `CAP_PERFMON` or `CAP_SYS_ADMIN`,
//! or a permissive `/proc/sys/kernel/perf_event_paranoid`.

pub mod catalog;
pub mod count;
pub mod detect;
pub mod driver;
mod ffi;
pub mod profile;
pub mod report;
