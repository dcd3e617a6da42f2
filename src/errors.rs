use std::path::PathBuf;
use thiserror::Error;

/// Errors that can stop a single house-day simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Hydraulic solve failed: {0}")]
    HydraulicSolve(#[from] HydraulicSolveError),
    #[error("Error writing simulation output: {0}")]
    Output(#[from] anyhow::Error),
}

/// Problems with profiles, sensor models or run options. These are detected before any
/// simulation work begins and are fatal.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Unknown house profile '{0}'")]
    UnknownProfile(String),
    #[error("Unknown meter model '{0}'")]
    UnknownMeterModel(String),
    #[error("Malformed configuration JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("Configuration failed validation: {0}")]
    Validation(String),
    #[error("Invalid network topology: {0}")]
    InvalidTopology(String),
    #[error("Could not read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<serde_valid::validation::Errors> for ConfigurationError {
    fn from(errors: serde_valid::validation::Errors) -> Self {
        ConfigurationError::Validation(errors.to_string())
    }
}

/// Failure of the network solver engine to find a consistent hydraulic state.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum HydraulicSolveError {
    #[error("solver did not converge after {iterations} iterations (relative flow change {relative_change:e})")]
    NotConverged {
        iterations: usize,
        relative_change: f64,
    },
    #[error("network equations are singular; the network may be disconnected")]
    Singular,
    #[error("network contains a loop through link '{0}', which the tree solver cannot handle")]
    LoopedNetwork(String),
    #[error("solver produced a non-finite state at iteration {0}")]
    NonFinite(usize),
    #[error("network has no fixed-head node")]
    NoReservoir,
    #[error("tree solver needs a single supply but network has a second reservoir '{0}'")]
    MultipleSources(String),
}

/// An event refers to a network element that does not exist. The event is skipped and the
/// simulation continues.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("event '{event}' targets missing {element_kind} '{element}'; event skipped")]
pub struct EventApplicationWarning {
    pub event: String,
    pub element_kind: &'static str,
    pub element: String,
}

/// Failure while merging per-house output files. Per-house files are left in place.
#[derive(Debug, Error)]
pub enum ConsolidationError {
    #[error("I/O error consolidating {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error consolidating {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("Error scanning output directory: {0}")]
    Scan(#[from] walkdir::Error),
}
