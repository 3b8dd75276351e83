use super::{format_with_commas, Record, Reporter};
use crate::catalog::{Catalog, CpuModel, Event};

fn event(name: &'static str, encoding: u64) -> Event {
    Event {
        name,
        description: "",
        encoding,
    }
}

fn two_group_catalog() -> Catalog {
    Catalog::new(
        vec![event("cpu_cycles", 0x11)],
        vec![vec![event("alpha", 1)], vec![event("beta", 2)]],
    )
}

fn record(timestamp_ns: u64, group_idx: usize, event_idx: usize, value: u64) -> Record {
    Record {
        timestamp_ns,
        cpu_id: -1,
        group_idx,
        event_idx,
        value,
    }
}

const SEC: u64 = 1_000_000_000;

// Wall time 4 s: group 0 active for 3 s with raw count 300, group 1 active
// for 1 s with raw count 50. Scaling projects 300 * 4/3 = 400 and
// 50 * 4 = 200.
#[test]
fn scaling_projects_to_the_full_window() {
    let catalog = two_group_catalog();
    let mut reporter = Reporter::new(&catalog, CpuModel::Oryon);

    for interval in 1..=3u64 {
        reporter.process_record(&record(interval * SEC, 0, 0, 10));
        reporter.process_record(&record(interval * SEC, 0, 1, 100));
    }
    reporter.process_record(&record(4 * SEC, 1, 0, 10));
    reporter.process_record(&record(4 * SEC, 1, 1, 50));

    assert_eq!(reporter.total_time_ns(), 4 * SEC);
    assert_eq!(reporter.enabled_time_ns(0), 3 * SEC);
    assert_eq!(reporter.enabled_time_ns(1), SEC);

    reporter.estimate();

    assert_eq!(reporter.schedulable_stat("alpha").total, 300);
    assert_eq!(reporter.schedulable_stat("alpha").estimated, 400);
    assert_eq!(reporter.schedulable_stat("beta").total, 50);
    assert_eq!(reporter.schedulable_stat("beta").estimated, 200);
}

#[test]
fn fixed_events_sum_across_groups() {
    let catalog = two_group_catalog();
    let mut reporter = Reporter::new(&catalog, CpuModel::Oryon);

    reporter.process_record(&record(SEC, 0, 0, 30));
    reporter.process_record(&record(2 * SEC, 1, 0, 12));
    reporter.estimate();

    // Slot 0 of every group is the same fixed event; totals tile the window.
    assert_eq!(reporter.fixed_stat("cpu_cycles").estimated, 42);
}

#[test]
fn interval_is_credited_once_per_burst() {
    let catalog = two_group_catalog();
    let mut reporter = Reporter::new(&catalog, CpuModel::Oryon);

    // Both records of a burst carry the same timestamp: only the first
    // advances the clock.
    reporter.process_record(&record(SEC, 0, 0, 1));
    reporter.process_record(&record(SEC, 0, 1, 1));

    assert_eq!(reporter.total_time_ns(), SEC);
    assert_eq!(reporter.enabled_time_ns(0), SEC);
}

#[test]
fn enabled_time_never_exceeds_total_time() {
    let catalog = two_group_catalog();
    let mut reporter = Reporter::new(&catalog, CpuModel::Oryon);

    for interval in 1..=5u64 {
        let group_idx = (interval % 2) as usize;
        reporter.process_record(&record(interval * SEC, group_idx, 1, 7));
    }

    let enabled_sum: u64 = (0..2).map(|idx| reporter.enabled_time_ns(idx)).sum();
    assert_eq!(enabled_sum, reporter.total_time_ns());
}

#[test]
fn never_enabled_group_estimates_zero() {
    let catalog = two_group_catalog();
    let mut reporter = Reporter::new(&catalog, CpuModel::Oryon);

    reporter.process_record(&record(SEC, 0, 1, 100));
    reporter.estimate();

    assert_eq!(reporter.schedulable_stat("beta").estimated, 0);
}

#[test]
fn unknown_events_read_as_zero() {
    let catalog = two_group_catalog();
    let reporter = Reporter::new(&catalog, CpuModel::Oryon);

    assert_eq!(reporter.schedulable_stat("no_such_event").total, 0);
    assert_eq!(reporter.fixed_stat("no_such_event").estimated, 0);
}

#[test]
fn csv_rows_use_event_names_and_one_based_groups() {
    let catalog = two_group_catalog();
    let mut reporter = Reporter::new(&catalog, CpuModel::Oryon);

    let mut out = Vec::new();
    reporter.process_record(&record(123, 0, 1, 456));
    reporter
        .write_csv_record(&record(123, 0, 1, 456), &mut out)
        .unwrap();
    reporter
        .write_csv_record(&record(200, 1, 0, 7), &mut out)
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, "123,-1,1,alpha,456\n200,-1,2,cpu_cycles,7\n");
}

#[test]
fn commas_group_thousands() {
    assert_eq!(format_with_commas(0), "0");
    assert_eq!(format_with_commas(999), "999");
    assert_eq!(format_with_commas(1000), "1,000");
    assert_eq!(format_with_commas(1234567), "1,234,567");
    assert_eq!(format_with_commas(1000000000), "1,000,000,000");
}
