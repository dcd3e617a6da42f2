use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use wdn_sim::{
    run_cohort, CohortConfig, LeakMode, ProfileSelection, ProfileSet, SensorConfigSet,
    SimulationConfig, SimulationContext, SimulationFlags,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct SimulatorArgs {
    #[arg(long, default_value_t = 10, help = "Number of houses in the cohort")]
    n_houses: u32,
    #[arg(long, default_value_t = 1, help = "Number of days to simulate per house")]
    days: u32,
    #[arg(long, default_value = "2025-01-01", help = "First simulated day (YYYY-MM-DD)")]
    start: NaiveDate,
    #[arg(long, short, default_value = "output", help = "Directory for output files")]
    output: PathBuf,
    #[arg(long, default_value_t = 60., help = "Output resolution in seconds")]
    resolution: f64,
    #[arg(long, help = "Number of worker threads (defaults to all cores)")]
    processes: Option<usize>,
    #[clap(
        long,
        default_value_t = false,
        help = "Run transient analysis for pressure bursts"
    )]
    enable_tsnet: bool,
    #[clap(
        long,
        default_value_t = false,
        help = "Use the explicit tree solver instead of the gradient solver"
    )]
    light_mode: bool,
    #[clap(long, default_value_t = false, help = "Disable leak and blockage events")]
    no_events: bool,
    #[arg(
        long,
        default_value = "random",
        help = "House profile name, or 'random' for weighted sampling"
    )]
    profile: ProfileSelection,
    #[arg(long, default_value_t = 42, help = "Base seed for every random stream")]
    seed: u64,
    #[clap(long, default_value_t = false, help = "Generate blockage events")]
    enable_blockages: bool,
    #[arg(
        long,
        default_value_t = 0.5,
        help = "Probability that a house receives generated leaks"
    )]
    leak_probability: f64,
    #[arg(
        long,
        default_value = "random",
        help = "'random', 'none', or a leak type to apply to every house"
    )]
    leak_mode: LeakMode,
    #[arg(long, help = "Path to a house profile JSON file")]
    profiles: Option<PathBuf>,
    #[arg(long, help = "Path to a sensor model JSON file")]
    sensor_config: Option<PathBuf>,
    #[arg(long, default_value = "inline_precision", help = "Meter model to simulate")]
    meter: String,
    #[arg(
        long,
        env = "WDN_OUTPUT_PREFIX",
        default_value = "",
        help = "Prefix for output file names"
    )]
    output_prefix: String,
    #[cfg(feature = "postgres")]
    #[clap(
        long,
        default_value_t = false,
        help = "Load the consolidated output into Postgres (DATABASE_URL)"
    )]
    db: bool,
    #[clap(long, default_value_t = false, help = "Whether to log out spans")]
    log_spans: bool,
}

impl SimulatorArgs {
    fn flags(&self) -> SimulationFlags {
        let mut flags = SimulationFlags::empty();
        flags.set(SimulationFlags::ENABLE_EVENTS, !self.no_events);
        flags.set(SimulationFlags::LIGHT_MODE, self.light_mode);
        flags.set(SimulationFlags::ENABLE_TRANSIENTS, self.enable_tsnet);
        flags.set(SimulationFlags::ENABLE_BLOCKAGES, self.enable_blockages);
        flags
    }

    #[cfg(feature = "postgres")]
    fn load_database(&self) -> bool {
        self.db
    }

    #[cfg(not(feature = "postgres"))]
    fn load_database(&self) -> bool {
        false
    }
}

fn main() -> anyhow::Result<()> {
    let args = SimulatorArgs::parse();

    // set up basic tracing
    let tracing_subscriber = {
        let mut builder = tracing_subscriber::fmt::fmt().with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );

        if args.log_spans {
            builder = builder.with_span_events(FmtSpan::CLOSE);
        }

        builder.finish()
    };
    tracing::subscriber::set_global_default(tracing_subscriber)
        .context("setting tracing subscriber failed")?;

    let profiles = match &args.profiles {
        Some(path) => ProfileSet::from_path(path)?,
        None => ProfileSet::bundled()?,
    };
    if let ProfileSelection::Named(name) = &args.profile {
        profiles.profile(name)?;
    }
    let sensors = match &args.sensor_config {
        Some(path) => SensorConfigSet::from_path(path)?,
        None => SensorConfigSet::bundled()?,
    };

    let mut config = SimulationConfig::new(sensors.meter(&args.meter)?.clone());
    config.resolution_s = args.resolution;
    config.seed = args.seed;
    config.flags = args.flags();
    config.leak_probability = args.leak_probability;
    config.leak_mode = args.leak_mode;
    config.profile = args.profile.clone();
    config.check()?;

    let cohort = CohortConfig {
        n_houses: args.n_houses,
        days: args.days,
        start: args.start,
        output_dir: args.output.clone(),
        output_prefix: args.output_prefix.clone(),
        processes: args.processes,
        load_database: args.load_database(),
    };
    info!(
        "simulating {} houses over {} days from {} with profile {}",
        cohort.n_houses, cohort.days, cohort.start, config.profile
    );

    let summary = run_cohort(&SimulationContext::new(profiles, config), &cohort)?;

    info!(
        "{} rows from {} house-days ({} failed), {:.3} m3 lost to leaks",
        summary.rows, summary.succeeded, summary.failed, summary.water_loss_m3
    );
    if let Some((low, median, high)) = summary.daily_demand_l {
        info!("daily demand p10/p50/p90: {low:.0}/{median:.0}/{high:.0} L");
    }
    if let Some(consolidation) = &summary.consolidation {
        info!("dataset written to {}", consolidation.path.display());
    }
    if let Some(loaded) = summary.loaded_rows {
        info!("{loaded} rows loaded into the database");
    }

    Ok(())
}
