use chrono::{NaiveDate, NaiveTime, Timelike};
use pretty_assertions::assert_eq;
use rstest::*;
use std::fs::File;
use std::path::Path;
use wdn_sim::core::events::leak::LeakType;
use wdn_sim::input::ScheduledLeak;
use wdn_sim::output::{read_house_day, write_house_day, FileOutput, SensorReading};
use wdn_sim::{
    run_cohort, CohortConfig, HouseDayJob, HouseSimulator, LeakMode, ProfileSelection, ProfileSet,
    SensorConfigSet, SimulationConfig, SimulationContext,
};

fn config(resolution_s: f64) -> SimulationConfig {
    let meter = SensorConfigSet::bundled()
        .unwrap()
        .meter("inline_precision")
        .unwrap()
        .clone();
    let mut config = SimulationConfig::new(meter);
    config.resolution_s = resolution_s;
    config.profile = ProfileSelection::Named("family_home".into());
    config
}

fn cohort(dir: &Path, n_houses: u32, days: u32) -> CohortConfig {
    CohortConfig {
        n_houses,
        days,
        start: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        output_dir: dir.to_path_buf(),
        output_prefix: "scenario_".into(),
        processes: Some(2),
        load_database: false,
    }
}

fn consolidated_rows(dir: &Path) -> Vec<SensorReading> {
    read_house_day(File::open(dir.join("scenario_consolidated.csv")).unwrap()).unwrap()
}

#[rstest]
fn a_month_without_leaks_should_never_flag_a_leak() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(900.);
    config.leak_mode = LeakMode::None;
    let context = SimulationContext::new(ProfileSet::bundled().unwrap(), config);

    let summary = run_cohort(&context, &cohort(dir.path(), 1, 30)).unwrap();

    assert_eq!(summary.failed, 0);
    assert_eq!(summary.leaking_house_days, 0);
    let rows = consolidated_rows(dir.path());
    assert_eq!(rows.len(), 30 * 96);
    assert!(rows.iter().all(|row| !row.leak && row.leak_location.is_empty()));
}

#[rstest]
fn a_scheduled_burst_should_only_flag_rows_while_active() {
    let mut config = config(600.);
    config.leak_mode = LeakMode::None;
    config.scheduled_leaks = vec![ScheduledLeak {
        node: "bathroom".into(),
        leak_type: LeakType::PressureBurst,
        start_s: 12. * 3_600.,
        duration_s: Some(2. * 3_600.),
        initial_diameter_mm: None,
    }];
    let context = SimulationContext::new(ProfileSet::bundled().unwrap(), config);
    let job = HouseDayJob {
        house_id: 7,
        day_start: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
    };

    let output = HouseSimulator::new(job, &context).run().unwrap();

    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
    let two_pm = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
    let mut flagged = 0;
    for row in &output.rows {
        let time = row.timestamp.time();
        let active = time >= noon && time <= two_pm;
        assert_eq!(row.leak, active, "at {time}");
        if active {
            assert_eq!(row.leak_location, "bathroom");
            flagged += 1;
        } else {
            assert!(row.leak_location.is_empty());
        }
    }
    assert_eq!(flagged, 13);
    assert!(output.statistics.cumulative_water_loss_m3 > 0.);
}

#[rstest]
fn cohort_runs_should_be_reproducible() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let mut config = config(1_800.);
    config.profile = ProfileSelection::Random;
    config.seed = 2024;
    let context = SimulationContext::new(ProfileSet::bundled().unwrap(), config);

    run_cohort(&context, &cohort(first.path(), 4, 2)).unwrap();
    run_cohort(&context, &cohort(second.path(), 4, 2)).unwrap();

    let mut a = consolidated_rows(first.path());
    let mut b = consolidated_rows(second.path());
    for rows in [&mut a, &mut b] {
        rows.sort_by_key(|row| (row.house_id, row.timestamp));
    }
    assert_eq!(a, b);
}

#[rstest]
fn house_day_files_should_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let context = SimulationContext::new(ProfileSet::bundled().unwrap(), config(3_600.));
    let job = HouseDayJob {
        house_id: 12,
        day_start: NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
    };
    let output = HouseSimulator::new(job, &context).run().unwrap();
    let files = FileOutput::for_house_days(dir.path().to_path_buf(), "");

    write_house_day(&files, "house_00012_2025-11-02", &output.rows).unwrap();

    let path = dir.path().join("house_00012_2025-11-02.csv");
    let header = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .next()
        .unwrap()
        .split(',')
        .count();
    assert_eq!(header, 16);
    let rows = read_house_day(File::open(&path).unwrap()).unwrap();
    assert_eq!(rows.len(), 24);
    assert_eq!(rows[23].timestamp.hour(), 23);
    assert_eq!(rows.len(), output.rows.len());
}
