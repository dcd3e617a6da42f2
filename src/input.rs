use crate::core::events::leak::LeakType;
use crate::core::material_properties::PipeMaterial;
use crate::core::units::SECONDS_PER_DAY;
use crate::errors::ConfigurationError;
use bitflags::bitflags;
use indexmap::IndexMap;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

const DEFAULT_PROFILES_JSON: &str = include_str!("../config/house_profiles.json");
const DEFAULT_SENSOR_MODELS_JSON: &str = include_str!("../config/sensor_models.json");

/// An inclusive `[min, max]` pair as it appears in configuration JSON.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ValueRange(pub f64, pub f64);

impl ValueRange {
    pub fn min(&self) -> f64 {
        self.0
    }

    pub fn max(&self) -> f64 {
        self.1
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.0 && value <= self.1
    }

    /// Draw uniformly from the range. A degenerate range always returns its bound.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        if self.1 > self.0 {
            rng.random_range(self.0..=self.1)
        } else {
            self.0
        }
    }

    fn check(&self, field: &str) -> Result<(), ConfigurationError> {
        if !(self.0.is_finite() && self.1.is_finite()) || self.0 > self.1 {
            return Err(ConfigurationError::Validation(format!(
                "{field}: range [{}, {}] must be finite and ordered",
                self.0, self.1
            )));
        }
        Ok(())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(json: impl Read) -> Result<T, ConfigurationError> {
    Ok(serde_json::from_reader(BufReader::new(json))?)
}

fn open_config_file(path: &Path) -> Result<File, ConfigurationError> {
    File::open(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// House profiles

#[derive(Clone, Debug, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ProfileSet {
    pub profiles: IndexMap<String, HouseProfile>,
}

impl ProfileSet {
    pub fn from_reader(json: impl Read) -> Result<Self, ConfigurationError> {
        let profile_set: ProfileSet = read_json(json)?;
        profile_set.check()?;
        Ok(profile_set)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        Self::from_reader(open_config_file(path.as_ref())?)
    }

    /// The profiles bundled with the crate.
    pub fn bundled() -> Result<Self, ConfigurationError> {
        Self::from_reader(DEFAULT_PROFILES_JSON.as_bytes())
    }

    pub fn profile(&self, name: &str) -> Result<&HouseProfile, ConfigurationError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownProfile(name.to_string()))
    }

    /// Resolve a selection to a named profile, sampling by weight for `Random`.
    pub fn select(
        &self,
        selection: &ProfileSelection,
        rng: &mut impl Rng,
    ) -> Result<(&str, &HouseProfile), ConfigurationError> {
        match selection {
            ProfileSelection::Named(name) => {
                let (key, profile) = self
                    .profiles
                    .get_key_value(name)
                    .ok_or_else(|| ConfigurationError::UnknownProfile(name.clone()))?;
                Ok((key.as_str(), profile))
            }
            ProfileSelection::Random => {
                let weights = WeightedIndex::new(self.profiles.values().map(|p| p.weight))
                    .map_err(|e| ConfigurationError::Validation(format!("profile weights: {e}")))?;
                let idx = weights.sample(rng);
                let (key, profile) = self.profiles.get_index(idx).ok_or_else(|| {
                    ConfigurationError::Validation(format!("profile index {idx} out of range"))
                })?;
                Ok((key.as_str(), profile))
            }
        }
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        if self.profiles.is_empty() {
            return Err(ConfigurationError::Validation(
                "at least one house profile is required".into(),
            ));
        }
        if !self.profiles.values().any(|profile| profile.weight > 0.) {
            return Err(ConfigurationError::Validation(
                "at least one house profile needs a positive sampling weight".into(),
            ));
        }
        for (name, profile) in &self.profiles {
            profile
                .check()
                .map_err(|e| ConfigurationError::Validation(format!("profile '{name}': {e}")))?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct HouseProfile {
    #[validate(minimum = 0.0)]
    pub weight: f64,
    /// number of occupants
    pub occupancy: ValueRange,
    /// total household consumption, in litres per day
    pub daily_consumption_l: ValueRange,
    /// head of the street supply above the main floor, in m
    #[serde(default = "default_supply_head")]
    #[validate(exclusive_minimum = 0.0)]
    pub supply_head_m: f64,
    #[serde(default = "default_pipe_age")]
    #[validate(minimum = 0.0)]
    pub pipe_age_years: f64,
    #[serde(default = "default_hardness")]
    #[validate(minimum = 0.0)]
    pub water_hardness_mg_l: f64,
    pub service_main: ServiceMainSpec,
    /// material used for the default topology's branches; defaults to the service main material
    pub branch_material: Option<PipeMaterial>,
    #[serde(default)]
    pub has_basement: bool,
    #[serde(default)]
    pub has_upper_floor: bool,
    /// explicit junctions, replacing the default household topology
    pub nodes: Option<Vec<NodeSpec>>,
    /// explicit pipes, replacing the default household topology
    pub segments: Option<Vec<SegmentSpec>>,
    pub default_demand_node: Option<String>,
    #[serde(default = "default_fixtures")]
    pub fixtures: IndexMap<String, FixtureSpec>,
    #[serde(default = "default_seasonal_factors")]
    pub seasonal_factors: [f64; 12],
    #[serde(default = "default_weekend_factor")]
    #[validate(exclusive_minimum = 0.0)]
    pub weekend_factor: f64,
    /// standard deviation of the additive demand noise floor, in L/s
    #[serde(default = "default_noise_floor")]
    #[validate(minimum = 0.0)]
    pub noise_floor_lps: f64,
}

impl HouseProfile {
    fn check(&self) -> Result<(), ConfigurationError> {
        self.validate()?;
        self.occupancy.check("occupancy")?;
        self.daily_consumption_l.check("daily_consumption_l")?;
        if self.occupancy.min() < 1. {
            return Err(ConfigurationError::Validation(
                "occupancy must be at least one person".into(),
            ));
        }
        if self.daily_consumption_l.min() <= 0. {
            return Err(ConfigurationError::Validation(
                "daily_consumption_l must be positive".into(),
            ));
        }
        if self.seasonal_factors.iter().any(|f| *f <= 0.) {
            return Err(ConfigurationError::Validation(
                "seasonal_factors must all be positive".into(),
            ));
        }
        self.service_main.validate()?;
        if self.nodes.is_some() != self.segments.is_some() {
            return Err(ConfigurationError::Validation(
                "nodes and segments must be given together".into(),
            ));
        }
        for segment in self.segments.iter().flatten() {
            segment.validate()?;
        }
        for (name, fixture) in &self.fixtures {
            fixture
                .check()
                .map_err(|e| ConfigurationError::Validation(format!("fixture '{name}': {e}")))?;
        }
        Ok(())
    }
}

fn default_supply_head() -> f64 {
    40.
}

fn default_pipe_age() -> f64 {
    15.
}

fn default_hardness() -> f64 {
    120.
}

fn default_weekend_factor() -> f64 {
    1.1
}

fn default_noise_floor() -> f64 {
    0.002
}

fn default_seasonal_factors() -> [f64; 12] {
    [
        0.92, 0.92, 0.96, 1.0, 1.04, 1.1, 1.14, 1.12, 1.04, 0.98, 0.94, 0.94,
    ]
}

fn default_fixtures() -> IndexMap<String, FixtureSpec> {
    let fixture = |uses: (f64, f64),
                   flow: Option<(f64, f64)>,
                   volume: Option<f64>,
                   duration: Option<(f64, f64)>,
                   peaks: &[(f64, f64)]| FixtureSpec {
        uses_per_person_per_day: ValueRange(uses.0, uses.1),
        flow_lps: flow.map(|(a, b)| ValueRange(a, b)),
        volume_l: volume,
        duration_s: duration.map(|(a, b)| ValueRange(a, b)),
        peak_hours: peaks.iter().map(|(a, b)| ValueRange(*a, *b)).collect(),
    };
    IndexMap::from([
        (
            "toilet".to_string(),
            fixture((4., 6.), None, Some(6.), None, &[(6., 9.), (18., 22.)]),
        ),
        (
            "shower".to_string(),
            fixture(
                (0.6, 1.0),
                Some((0.12, 0.2)),
                None,
                Some((300., 600.)),
                &[(6., 9.), (19., 22.)],
            ),
        ),
        (
            "kitchen_faucet".to_string(),
            fixture(
                (3., 6.),
                Some((0.08, 0.15)),
                None,
                Some((10., 60.)),
                &[(7., 9.), (17., 20.)],
            ),
        ),
        (
            "bathroom_faucet".to_string(),
            fixture(
                (3., 5.),
                Some((0.05, 0.1)),
                None,
                Some((5., 30.)),
                &[(6., 9.), (21., 23.)],
            ),
        ),
        (
            "dishwasher".to_string(),
            fixture(
                (0.1, 0.2),
                Some((0.1, 0.15)),
                None,
                Some((60., 120.)),
                &[(19., 23.)],
            ),
        ),
        (
            "washing_machine".to_string(),
            fixture(
                (0.15, 0.3),
                Some((0.12, 0.2)),
                None,
                Some((120., 300.)),
                &[(9., 12.), (18., 21.)],
            ),
        ),
        (
            "hose_bib".to_string(),
            fixture(
                (0., 0.1),
                Some((0.2, 0.3)),
                None,
                Some((300., 900.)),
                &[(17., 20.)],
            ),
        ),
    ])
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ServiceMainSpec {
    pub material: PipeMaterial,
    #[validate(minimum = 19.0)]
    pub diameter_mm: f64,
    #[validate(exclusive_minimum = 0.0)]
    pub length_m: f64,
    pub roughness_c: Option<f64>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum Floor {
    Basement,
    Main,
    Upper,
}

#[derive(Clone, Debug, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub name: String,
    pub floor: Floor,
    /// overrides the floor's default elevation, in m relative to the main floor
    pub elevation_m: Option<f64>,
    #[serde(default)]
    pub fixtures: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct SegmentSpec {
    pub name: String,
    pub from: String,
    pub to: String,
    pub material: PipeMaterial,
    #[validate(exclusive_minimum = 0.0)]
    pub diameter_mm: f64,
    #[validate(exclusive_minimum = 0.0)]
    pub length_m: f64,
    pub roughness_c: Option<f64>,
    #[serde(default)]
    #[validate(minimum = 0.0)]
    pub minor_loss: f64,
    #[serde(default)]
    pub trunk: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct FixtureSpec {
    pub uses_per_person_per_day: ValueRange,
    /// flow while running, in L/s; required unless `volume_l` is given
    pub flow_lps: Option<ValueRange>,
    /// volume discharged instantaneously per use, in litres (e.g. toilet flush)
    pub volume_l: Option<f64>,
    pub duration_s: Option<ValueRange>,
    /// windows of the day, in hours, in which use is concentrated
    #[serde(default)]
    pub peak_hours: Vec<ValueRange>,
}

impl FixtureSpec {
    fn check(&self) -> Result<(), ConfigurationError> {
        self.uses_per_person_per_day.check("uses_per_person_per_day")?;
        match (&self.volume_l, &self.flow_lps, &self.duration_s) {
            (Some(volume), _, _) if *volume > 0. => {}
            (None, Some(flow), Some(duration)) => {
                flow.check("flow_lps")?;
                duration.check("duration_s")?;
            }
            _ => {
                return Err(ConfigurationError::Validation(
                    "either a positive volume_l or both flow_lps and duration_s are required"
                        .into(),
                ))
            }
        }
        for window in &self.peak_hours {
            window.check("peak_hours")?;
            if window.min() < 0. || window.max() > 24. {
                return Err(ConfigurationError::Validation(
                    "peak_hours must lie within 0-24".into(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sensor models

#[derive(Clone, Debug, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct SensorConfigSet {
    pub meters: IndexMap<String, MeterModel>,
}

impl SensorConfigSet {
    pub fn from_reader(json: impl Read) -> Result<Self, ConfigurationError> {
        let set: SensorConfigSet = read_json(json)?;
        for (name, meter) in &set.meters {
            meter
                .check()
                .map_err(|e| ConfigurationError::Validation(format!("meter '{name}': {e}")))?;
        }
        Ok(set)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        Self::from_reader(open_config_file(path.as_ref())?)
    }

    pub fn bundled() -> Result<Self, ConfigurationError> {
        Self::from_reader(DEFAULT_SENSOR_MODELS_JSON.as_bytes())
    }

    pub fn meter(&self, name: &str) -> Result<&MeterModel, ConfigurationError> {
        self.meters
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownMeterModel(name.to_string()))
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct MeterModel {
    /// smallest resolvable transit time, in s
    #[validate(exclusive_minimum = 0.0)]
    pub transit_time_resolution_s: f64,
    #[validate(exclusive_minimum = 0.0)]
    pub sampling_rate_hz: f64,
    #[serde(default = "default_incidence_angle")]
    #[validate(exclusive_minimum = 0.0)]
    #[validate(exclusive_maximum = 90.0)]
    pub incidence_angle_deg: f64,
    /// number of times the acoustic path crosses the pipe (4 for a W path)
    #[serde(default = "default_traverses")]
    #[validate(minimum = 1)]
    pub traverses: u32,
    #[validate(minimum = 0.0)]
    pub jitter_std_s: f64,
    /// transit-time bias accumulated per year of service, in s
    #[serde(default)]
    pub drift_per_year_s: f64,
    #[serde(default)]
    #[validate(minimum = 0.0)]
    pub age_days: f64,
    pub snr_db: ValueRange,
    #[serde(default)]
    #[validate(minimum = 0.0)]
    pub low_flow_cutoff_ms: f64,
    #[validate(minimum = 0.0)]
    #[validate(maximum = 1.0)]
    pub missing_probability: f64,
    #[validate(minimum = 0.0)]
    #[validate(maximum = 1.0)]
    pub burst_probability: f64,
    #[validate(minimum = 1)]
    pub burst_max_length: usize,
    #[validate(minimum = 0.0)]
    #[validate(maximum = 1.0)]
    pub outlier_probability: f64,
    pub outlier_factor: ValueRange,
}

impl MeterModel {
    fn check(&self) -> Result<(), ConfigurationError> {
        self.validate()?;
        self.snr_db.check("snr_db")?;
        self.outlier_factor.check("outlier_factor")?;
        Ok(())
    }
}

fn default_incidence_angle() -> f64 {
    60.
}

fn default_traverses() -> u32 {
    4
}

// ---------------------------------------------------------------------------
// Run configuration

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct SimulationFlags: u32 {
        /// generate and apply leak/blockage events
        const ENABLE_EVENTS = 0b0001;
        /// use the explicit tree solver instead of the gradient solver
        const LIGHT_MODE = 0b0010;
        /// run Joukowsky transient analysis for pressure bursts
        const ENABLE_TRANSIENTS = 0b0100;
        /// generate blockages as part of the realistic schedule
        const ENABLE_BLOCKAGES = 0b1000;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProfileSelection {
    Named(String),
    Random,
}

impl FromStr for ProfileSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "random" => ProfileSelection::Random,
            name => ProfileSelection::Named(name.to_string()),
        })
    }
}

impl Display for ProfileSelection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileSelection::Named(name) => write!(f, "{name}"),
            ProfileSelection::Random => write!(f, "random"),
        }
    }
}

/// Which leaks the upstream gate may introduce into a house.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LeakMode {
    /// gate with `leak_probability`, type drawn from the weighted mix
    #[default]
    Random,
    /// never invoke the leak generator
    None,
    /// always invoke the leak generator with this type
    Fixed(LeakType),
}

impl FromStr for LeakMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(LeakMode::Random),
            "none" => Ok(LeakMode::None),
            other => LeakType::from_str(other).map(LeakMode::Fixed).map_err(|_| {
                ConfigurationError::Validation(format!("unknown leak type '{other}'"))
            }),
        }
    }
}

/// A leak placed at a known node and time, regardless of the random schedule.
#[derive(Clone, Debug, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ScheduledLeak {
    pub node: String,
    pub leak_type: LeakType,
    /// seconds after the start of the house-day
    pub start_s: f64,
    pub duration_s: Option<f64>,
    pub initial_diameter_mm: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub resolution_s: f64,
    pub seed: u64,
    pub flags: SimulationFlags,
    /// probability that the leak generator is invoked for a house
    pub leak_probability: f64,
    pub leak_mode: LeakMode,
    pub scheduled_leaks: Vec<ScheduledLeak>,
    /// leaks per km of pipe per year before material and age scaling
    pub leak_annual_rate_per_km: f64,
    /// blockages per km of pipe per year before material, age and hardness scaling
    pub blockage_annual_rate_per_km: f64,
    pub profile: ProfileSelection,
    pub meter: MeterModel,
    pub supply_base_temperature_c: f64,
    /// time over which a pressure burst opens, in s
    pub burst_opening_time_s: f64,
    pub solver_accuracy: f64,
    pub solver_max_iterations: usize,
}

impl SimulationConfig {
    pub fn new(meter: MeterModel) -> Self {
        Self {
            resolution_s: 60.,
            seed: 42,
            flags: SimulationFlags::ENABLE_EVENTS,
            leak_probability: 0.5,
            leak_mode: LeakMode::Random,
            scheduled_leaks: vec![],
            leak_annual_rate_per_km: 0.2,
            blockage_annual_rate_per_km: 0.5,
            profile: ProfileSelection::Random,
            meter,
            supply_base_temperature_c: 12.,
            burst_opening_time_s: 0.05,
            solver_accuracy: 1e-6,
            solver_max_iterations: 200,
        }
    }

    pub fn check(&self) -> Result<(), ConfigurationError> {
        if !(self.resolution_s > 0.) {
            return Err(ConfigurationError::Validation(
                "resolution must be positive".into(),
            ));
        }
        if SECONDS_PER_DAY as f64 % self.resolution_s != 0. {
            return Err(ConfigurationError::Validation(format!(
                "resolution of {}s does not divide a day evenly",
                self.resolution_s
            )));
        }
        if !(0. ..=1.).contains(&self.leak_probability) {
            return Err(ConfigurationError::Validation(
                "leak probability must lie within 0-1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use rstest::*;

    #[fixture]
    fn profiles() -> ProfileSet {
        ProfileSet::bundled().unwrap()
    }

    #[rstest]
    fn should_load_bundled_configuration(profiles: ProfileSet) {
        assert!(!profiles.profiles.is_empty());
        assert!(SensorConfigSet::bundled().unwrap().meters.len() >= 1);
    }

    #[rstest]
    fn should_fail_on_unknown_profile(profiles: ProfileSet) {
        assert!(matches!(
            profiles.profile("castle"),
            Err(ConfigurationError::UnknownProfile(name)) if name == "castle"
        ));
    }

    #[rstest]
    fn should_fail_on_malformed_json() {
        assert!(matches!(
            ProfileSet::from_reader("{\"profiles\": [".as_bytes()),
            Err(ConfigurationError::MalformedJson(_))
        ));
    }

    #[rstest]
    fn should_fail_on_out_of_range_values() {
        let json = r#"{"profiles": {"bad": {
            "weight": 1.0,
            "occupancy": [3, 1],
            "daily_consumption_l": [200, 400],
            "service_main": {"material": "copper", "diameter_mm": 19.0, "length_m": 10.0}
        }}}"#;
        assert!(matches!(
            ProfileSet::from_reader(json.as_bytes()),
            Err(ConfigurationError::Validation(_))
        ));
    }

    #[rstest]
    fn should_reject_undersized_service_main() {
        let json = r#"{"profiles": {"bad": {
            "weight": 1.0,
            "occupancy": [1, 3],
            "daily_consumption_l": [200, 400],
            "service_main": {"material": "copper", "diameter_mm": 12.0, "length_m": 10.0}
        }}}"#;
        assert!(matches!(
            ProfileSet::from_reader(json.as_bytes()),
            Err(ConfigurationError::Validation(_))
        ));
    }

    #[rstest]
    fn random_selection_should_be_deterministic_for_a_seed(profiles: ProfileSet) {
        let pick = |seed| {
            let mut rng = Pcg64::seed_from_u64(seed);
            profiles
                .select(&ProfileSelection::Random, &mut rng)
                .unwrap()
                .0
                .to_string()
        };
        assert_eq!(pick(7), pick(7));
    }

    #[rstest]
    fn should_parse_leak_modes() {
        assert_eq!(LeakMode::from_str("none").unwrap(), LeakMode::None);
        assert_eq!(
            LeakMode::from_str("pressure_burst").unwrap(),
            LeakMode::Fixed(LeakType::PressureBurst)
        );
        assert!(LeakMode::from_str("geyser").is_err());
    }

    #[rstest]
    fn should_parse_profile_selection() {
        assert_eq!(
            ProfileSelection::from_str("random").unwrap(),
            ProfileSelection::Random
        );
        assert_eq!(
            ProfileSelection::from_str("family_home").unwrap(),
            ProfileSelection::Named("family_home".into())
        );
    }

    #[rstest]
    #[case(60., true)]
    #[case(900., true)]
    #[case(86_400., true)]
    #[case(7., false)]
    #[case(0., false)]
    #[case(100_000., false)]
    fn resolution_should_divide_a_day(#[case] resolution_s: f64, #[case] valid: bool) {
        let meter = SensorConfigSet::bundled()
            .unwrap()
            .meter("inline_precision")
            .unwrap()
            .clone();
        let mut config = SimulationConfig::new(meter);
        config.resolution_s = resolution_s;
        assert_eq!(config.check().is_ok(), valid);
    }
}
