use super::{parse_cpu_list, ConfigError, ProfileConfig, ProfileMode};

#[test]
fn cpu_list_accepts_ids_and_ranges() {
    assert_eq!(parse_cpu_list("1,3-5,7"), vec![1, 3, 4, 5, 7]);
    assert_eq!(parse_cpu_list("0"), vec![0]);
    assert_eq!(parse_cpu_list("2-2"), vec![2]);
}

#[test]
fn cpu_list_rejects_malformed_input() {
    assert!(parse_cpu_list("").is_empty());
    assert!(parse_cpu_list("1,,2").is_empty());
    assert!(parse_cpu_list("5-3").is_empty());
    assert!(parse_cpu_list("-1").is_empty());
    assert!(parse_cpu_list("1,x").is_empty());
    assert!(parse_cpu_list("1-").is_empty());
    assert!(parse_cpu_list("a-b").is_empty());
}

#[test]
fn cpu_list_poisons_on_any_bad_token() {
    // One bad token anywhere empties the whole list.
    assert!(parse_cpu_list("0,1,2,oops,4").is_empty());
}

#[test]
fn exactly_one_mode_must_be_selected() {
    assert_eq!(
        ProfileMode::from_flags(true, false, false),
        Ok(ProfileMode::SystemWide)
    );
    assert_eq!(
        ProfileMode::from_flags(false, true, false),
        Ok(ProfileMode::TrackPid)
    );
    assert_eq!(
        ProfileMode::from_flags(false, false, true),
        Ok(ProfileMode::Subprocess)
    );

    assert_eq!(
        ProfileMode::from_flags(false, false, false),
        Err(ConfigError::MissingMode)
    );
    assert_eq!(
        ProfileMode::from_flags(true, true, false),
        Err(ConfigError::ConflictingModes)
    );
    assert_eq!(
        ProfileMode::from_flags(true, false, true),
        Err(ConfigError::ConflictingModes)
    );
    assert_eq!(
        ProfileMode::from_flags(false, true, true),
        Err(ConfigError::ConflictingModes)
    );
    assert_eq!(
        ProfileMode::from_flags(true, true, true),
        Err(ConfigError::ConflictingModes)
    );
}

fn config(mode: ProfileMode, duration_secs: Option<u64>) -> ProfileConfig {
    ProfileConfig {
        mode,
        duration_secs,
        interval_ms: 1000,
        cpu_ids: vec![0],
        target_pid: None,
        output_path: None,
        cpu_model: crate::catalog::CpuModel::Oryon,
        optimize_groups: false,
        command: Vec::new(),
    }
}

#[test]
fn system_wide_requires_a_duration() {
    assert_eq!(
        config(ProfileMode::SystemWide, None).validate(),
        Err(ConfigError::MissingDuration)
    );
    assert_eq!(
        config(ProfileMode::SystemWide, Some(0)).validate(),
        Err(ConfigError::MissingDuration)
    );
    assert_eq!(config(ProfileMode::SystemWide, Some(10)).validate(), Ok(()));

    // Per-process runs may omit the duration; a built-in ceiling applies.
    assert_eq!(config(ProfileMode::TrackPid, None).validate(), Ok(()));
    assert_eq!(config(ProfileMode::Subprocess, None).validate(), Ok(()));
}
