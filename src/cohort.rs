//! Running many house-days in parallel and merging their output.

use crate::consolidate::{consolidate, ConsolidationSummary};
use crate::house::{HouseDayJob, HouseSimulator, SimulationContext};
use crate::output::{house_day_key, write_house_day, FileOutput};
use crate::statistics::spread;
use anyhow::Context;
use chrono::{Days, NaiveDate};
#[cfg(feature = "indicatif")]
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Clone, Debug)]
pub struct CohortConfig {
    pub n_houses: u32,
    pub days: u32,
    pub start: NaiveDate,
    pub output_dir: PathBuf,
    pub output_prefix: String,
    /// worker threads; all cores when `None`
    pub processes: Option<usize>,
    /// bulk load the consolidated file into Postgres
    pub load_database: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CohortSummary {
    pub jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows: usize,
    pub leaking_house_days: usize,
    pub transients: usize,
    pub water_loss_m3: f64,
    /// 10th, 50th and 90th percentile house-day demand, in litres
    pub daily_demand_l: Option<(f64, f64, f64)>,
    pub consolidation: Option<ConsolidationSummary>,
    pub loaded_rows: Option<u64>,
}

struct JobSummary {
    rows: usize,
    leaked: bool,
    transients: usize,
    water_loss_m3: f64,
    demand_volume_l: f64,
}

/// One job per house per day, houses numbered from 1.
pub fn cohort_jobs(n_houses: u32, days: u32, start: NaiveDate) -> Vec<HouseDayJob> {
    (1..=n_houses)
        .flat_map(|house_id| {
            (0..days).filter_map(move |day| {
                start
                    .checked_add_days(Days::new(day as u64))
                    .map(|day_start| HouseDayJob {
                        house_id,
                        day_start,
                    })
            })
        })
        .collect()
}

/// Run and write one house-day. Errors and panics are logged and reported as `None`.
fn run_job(
    job: HouseDayJob,
    context: &SimulationContext,
    output: &FileOutput,
) -> Option<JobSummary> {
    let outcome = catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<JobSummary> {
        let result = HouseSimulator::new(job, context).run()?;
        write_house_day(output, &house_day_key(job.house_id, job.day_start), &result.rows)?;
        Ok(JobSummary {
            rows: result.rows.len(),
            leaked: result.rows.iter().any(|row| row.leak),
            transients: result.transients.len(),
            water_loss_m3: result.statistics.cumulative_water_loss_m3,
            demand_volume_l: result.demand_volume_l,
        })
    }));
    match outcome {
        Ok(Ok(summary)) => Some(summary),
        Ok(Err(e)) => {
            error!("house {} on {} failed: {e:#}", job.house_id, job.day_start);
            None
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!("house {} on {} panicked: {message}", job.house_id, job.day_start);
            None
        }
    }
}

/// Simulate every house-day of the cohort on a worker pool, then consolidate the per-house
/// files and, if asked, load the result into the database.
pub fn run_cohort(
    context: &SimulationContext,
    cohort: &CohortConfig,
) -> anyhow::Result<CohortSummary> {
    std::fs::create_dir_all(&cohort.output_dir).with_context(|| {
        format!(
            "could not create output directory {}",
            cohort.output_dir.display()
        )
    })?;
    let output = FileOutput::for_house_days(cohort.output_dir.clone(), &cohort.output_prefix);
    let jobs = cohort_jobs(cohort.n_houses, cohort.days, cohort.start);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cohort.processes.unwrap_or(0))
        .build()?;
    info!(
        "simulating {} house-days on {} threads",
        jobs.len(),
        pool.current_num_threads()
    );

    let results = pool.install(|| {
        let jobs_iter = jobs.par_iter();
        #[cfg(feature = "indicatif")]
        let jobs_iter = jobs_iter.progress_count(jobs.len() as u64);
        jobs_iter
            .map(|job| run_job(*job, context, &output))
            .collect::<Vec<_>>()
    });

    let mut summary = CohortSummary {
        jobs: jobs.len(),
        ..Default::default()
    };
    let mut demand_volumes = vec![];
    for result in results.iter().flatten() {
        summary.succeeded += 1;
        summary.rows += result.rows;
        summary.leaking_house_days += result.leaked as usize;
        summary.transients += result.transients;
        summary.water_loss_m3 += result.water_loss_m3;
        demand_volumes.push(result.demand_volume_l);
    }
    summary.failed = summary.jobs - summary.succeeded;
    summary.daily_demand_l = spread(&demand_volumes);
    info!(
        "{} of {} house-days succeeded, {} with leaks",
        summary.succeeded, summary.jobs, summary.leaking_house_days
    );

    match consolidate(&cohort.output_dir, &cohort.output_prefix) {
        Ok(consolidation) => summary.consolidation = Some(consolidation),
        Err(e) => error!("consolidation failed, per-house files kept: {e}"),
    }

    if cohort.load_database {
        summary.loaded_rows = Some(load_database(summary.consolidation.as_ref())?);
    }
    Ok(summary)
}

#[cfg(feature = "postgres")]
fn load_database(consolidation: Option<&ConsolidationSummary>) -> anyhow::Result<u64> {
    let consolidation =
        consolidation.context("nothing to load: the consolidated file was not written")?;
    crate::db_sink::load_files(&[consolidation.path.as_path()])
}

#[cfg(not(feature = "postgres"))]
fn load_database(_consolidation: Option<&ConsolidationSummary>) -> anyhow::Result<u64> {
    anyhow::bail!("database loading needs the postgres feature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{LeakMode, ProfileSelection, ProfileSet, SensorConfigSet, SimulationConfig};
    use crate::output::read_house_day;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::fs::File;

    fn context(configure: impl FnOnce(&mut SimulationConfig)) -> SimulationContext {
        let meter = SensorConfigSet::bundled()
            .unwrap()
            .meter("inline_precision")
            .unwrap()
            .clone();
        let mut config = SimulationConfig::new(meter);
        config.resolution_s = 3_600.;
        config.profile = ProfileSelection::Random;
        configure(&mut config);
        SimulationContext::new(ProfileSet::bundled().unwrap(), config)
    }

    fn cohort(dir: &std::path::Path) -> CohortConfig {
        CohortConfig {
            n_houses: 3,
            days: 2,
            start: NaiveDate::from_ymd_opt(2025, 8, 30).unwrap(),
            output_dir: dir.to_path_buf(),
            output_prefix: "test_".into(),
            processes: Some(2),
            load_database: false,
        }
    }

    #[rstest]
    fn jobs_should_cover_every_house_day() {
        let jobs = cohort_jobs(2, 3, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(jobs.len(), 6);
        assert_eq!(jobs[0].house_id, 1);
        assert_eq!(jobs[2].day_start, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(jobs[5].house_id, 2);
    }

    #[rstest]
    fn cohort_should_consolidate_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(|config| config.leak_mode = LeakMode::None);

        let summary = run_cohort(&context, &cohort(dir.path())).unwrap();

        assert_eq!(summary.jobs, 6);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.rows, 6 * 24);
        assert_eq!(summary.leaking_house_days, 0);
        let consolidation = summary.consolidation.unwrap();
        assert_eq!(consolidation.files, 6);
        assert_eq!(consolidation.duplicates_dropped, 0);
        let rows = read_house_day(File::open(&consolidation.path).unwrap()).unwrap();
        assert_eq!(rows.len(), 6 * 24);
        let (low, median, high) = summary.daily_demand_l.unwrap();
        assert!(low > 0. && low <= median && median <= high);
    }

    #[rstest]
    fn failing_jobs_should_not_fail_the_cohort() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(|config| {
            config.solver_accuracy = 1e-15;
            config.solver_max_iterations = 1;
        });

        let summary = run_cohort(&context, &cohort(dir.path())).unwrap();

        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 6);
        assert_eq!(summary.rows, 0);
    }
}
