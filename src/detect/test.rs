use std::io::Write;

use super::{CounterDetector, DetectError};

#[test]
fn capacities_round_trip_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capacities");

    let mut detector = CounterDetector::new();
    for (cpu_id, capacity) in detector.capacities.iter_mut().enumerate() {
        *capacity = cpu_id as i32 % 7 + 1;
    }
    let saved = detector.capacities.clone();
    detector.save(&path).unwrap();

    let mut loaded = CounterDetector::new();
    assert!(loaded.load(&path));
    assert_eq!(loaded.capacities, saved);
}

#[test]
fn missing_file_is_not_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let mut detector = CounterDetector::new();
    assert!(!detector.load(&dir.path().join("nope")));
}

#[test]
fn line_count_mismatch_discards_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capacities");

    let detector = CounterDetector::new();
    let mut file = std::fs::File::create(&path).unwrap();
    // One line too many for the current CPU count.
    for _ in 0..=detector.cpu_count {
        writeln!(file, "4").unwrap();
    }
    drop(file);

    let mut loaded = CounterDetector::new();
    assert!(!loaded.load(&path));
}

#[test]
fn garbage_discards_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capacities");
    std::fs::write(&path, "4\nbogus\n").unwrap();

    let mut detector = CounterDetector::new();
    assert!(!detector.load(&path));
}

#[test]
fn accessors_fail_before_detection() {
    let detector = CounterDetector::new();
    assert_eq!(detector.capacity(0), Err(DetectError::Undetected));
    assert_eq!(detector.min_capacity(), Err(DetectError::Undetected));
}

#[test]
fn out_of_bounds_cpu_is_an_error() {
    let mut detector = CounterDetector::new();
    detector.detected = true;
    let bad = detector.cpu_count;
    assert_eq!(
        detector.capacity(bad),
        Err(DetectError::CpuOutOfBounds(bad, detector.cpu_count))
    );
}

#[test]
fn min_capacity_reports_the_weakest_cpu() {
    let mut detector = CounterDetector::new();
    detector.detected = true;
    for (cpu_id, capacity) in detector.capacities.iter_mut().enumerate() {
        *capacity = 6 + cpu_id as i32;
    }
    detector.capacities[0] = 4;
    assert_eq!(detector.min_capacity(), Ok(4));
}
