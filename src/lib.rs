#![allow(clippy::too_many_arguments)]

pub mod cohort;
pub mod consolidate;
pub mod core;
#[cfg(feature = "postgres")]
pub mod db_sink;
pub mod errors;
pub mod house;
pub mod input;
pub mod output;
pub mod simulation_time;
pub mod statistics;

pub use crate::cohort::{run_cohort, CohortConfig, CohortSummary};
pub use crate::errors::{
    ConfigurationError, ConsolidationError, EventApplicationWarning, HydraulicSolveError,
    SimulationError,
};
pub use crate::house::{HouseDayJob, HouseDayOutput, HouseSimulator, SimulationContext};
pub use crate::input::{
    LeakMode, ProfileSelection, ProfileSet, SensorConfigSet, SimulationConfig, SimulationFlags,
};
