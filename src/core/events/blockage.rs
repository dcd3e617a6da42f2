use super::leak::age_factor;
use super::{event_state, EventState, ScheduleParameters};
use crate::core::material_properties::PipeMaterial;
use crate::core::network::{LinkIndex, WaterNetwork};
use crate::core::units::{DAYS_PER_YEAR, METRES_PER_KILOMETRE, SECONDS_PER_DAY};
use crate::errors::ConfigurationError;
use chrono::{Datelike, Duration};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::seq::IndexedRandom;
use rand::Rng;
use rand_distr::Poisson;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// Largest head-loss increase blockages may put on a pipe.
pub const MAX_HEADLOSS_MULTIPLIER: f64 = 1000.;
/// Exponent of C in the Hazen-Williams formula
const HAZEN_WILLIAMS_C_EXPONENT: f64 = 1.852;

#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumIter, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlockageType {
    Mineral,
    Biofilm,
    Debris,
    Ice,
    Valve,
}

struct BlockageParameters {
    curve: GrowthCurve,
    initial_reduction: (f64, f64),
    max_reduction: (f64, f64),
    growth_days: (f64, f64),
    roughness_factor: (f64, f64),
}

impl BlockageType {
    fn parameters(&self) -> BlockageParameters {
        match self {
            BlockageType::Mineral => BlockageParameters {
                curve: GrowthCurve::Logarithmic,
                initial_reduction: (0.02, 0.05),
                max_reduction: (0.3, 0.6),
                growth_days: (180., 720.),
                roughness_factor: (1.5, 2.5),
            },
            BlockageType::Biofilm => BlockageParameters {
                curve: GrowthCurve::Sigmoid,
                initial_reduction: (0.01, 0.03),
                max_reduction: (0.1, 0.3),
                growth_days: (30., 120.),
                roughness_factor: (1.2, 1.8),
            },
            BlockageType::Debris => BlockageParameters {
                curve: GrowthCurve::Step,
                initial_reduction: (0.05, 0.2),
                max_reduction: (0.3, 0.7),
                growth_days: (1., 7.),
                roughness_factor: (1.1, 1.5),
            },
            BlockageType::Ice => BlockageParameters {
                curve: GrowthCurve::Exponential,
                initial_reduction: (0.1, 0.3),
                max_reduction: (0.6, 0.95),
                growth_days: (0.1, 0.5),
                roughness_factor: (1.0, 1.2),
            },
            BlockageType::Valve => BlockageParameters {
                curve: GrowthCurve::Step,
                initial_reduction: (0.1, 0.3),
                max_reduction: (0.4, 0.8),
                growth_days: (0.5, 3.),
                roughness_factor: (1.0, 1.1),
            },
        }
    }

    pub fn occurs_in_month(&self, month: u32) -> bool {
        match self {
            BlockageType::Ice => matches!(month, 12 | 1 | 2),
            _ => true,
        }
    }
}

/// Shape of a blockage's progression between its initial and maximum reduction.
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum GrowthCurve {
    Logarithmic,
    Sigmoid,
    Exponential,
    Step,
}

impl GrowthCurve {
    /// Normalised progress for `x` in [0, 1], running from 0 to 1.
    pub fn progress(&self, x: f64) -> f64 {
        let x = x.clamp(0., 1.);
        match self {
            GrowthCurve::Logarithmic => (1. + 9. * x).ln() / 10f64.ln(),
            GrowthCurve::Sigmoid => {
                let logistic = |x: f64| 1. / (1. + (-10. * (x - 0.5)).exp());
                let (low, high) = (logistic(0.), logistic(1.));
                (logistic(x) - low) / (high - low)
            }
            GrowthCurve::Exponential => ((3. * x).exp() - 1.) / (3f64.exp() - 1.),
            GrowthCurve::Step => {
                if x >= 0.5 {
                    1.
                } else {
                    0.
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HardnessBand {
    Soft,
    Moderate,
    Hard,
}

impl HardnessBand {
    pub fn from_mg_per_litre(hardness: f64) -> Self {
        if hardness < 60. {
            HardnessBand::Soft
        } else if hardness <= 180. {
            HardnessBand::Moderate
        } else {
            HardnessBand::Hard
        }
    }

    pub fn rate_factor(&self) -> f64 {
        match self {
            HardnessBand::Soft => 0.8,
            HardnessBand::Moderate => 1.0,
            HardnessBand::Hard => 1.5,
        }
    }

    pub fn type_weight(&self, blockage_type: BlockageType) -> f64 {
        use BlockageType::*;
        match (self, blockage_type) {
            (HardnessBand::Soft, Mineral) => 0.10,
            (HardnessBand::Soft, Biofilm) => 0.35,
            (HardnessBand::Soft, Debris) => 0.30,
            (HardnessBand::Soft, Ice) => 0.10,
            (HardnessBand::Soft, Valve) => 0.15,
            (HardnessBand::Moderate, Mineral) => 0.30,
            (HardnessBand::Moderate, Biofilm) => 0.25,
            (HardnessBand::Moderate, Debris) => 0.25,
            (HardnessBand::Moderate, Ice) => 0.08,
            (HardnessBand::Moderate, Valve) => 0.12,
            (HardnessBand::Hard, Mineral) => 0.55,
            (HardnessBand::Hard, Biofilm) => 0.15,
            (HardnessBand::Hard, Debris) => 0.15,
            (HardnessBand::Hard, Ice) => 0.05,
            (HardnessBand::Hard, Valve) => 0.10,
        }
    }
}

/// A progressive narrowing of a pipe.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockageEvent {
    pub id: String,
    pub blockage_type: BlockageType,
    /// name of the pipe the blockage is in
    pub pipe: String,
    pub start_s: f64,
    pub end_s: Option<f64>,
    pub curve: GrowthCurve,
    /// fraction of the diameter lost when the blockage starts
    pub initial_reduction: f64,
    pub max_reduction: f64,
    pub growth_duration_s: f64,
    /// roughness increase reached at full growth
    pub roughness_factor: f64,
}

impl BlockageEvent {
    pub fn sample(
        id: String,
        blockage_type: BlockageType,
        pipe: String,
        start_s: f64,
        rng: &mut impl Rng,
    ) -> Self {
        let parameters = blockage_type.parameters();
        let mut draw = |(low, high): (f64, f64)| rng.random_range(low..=high);
        let initial_reduction = draw(parameters.initial_reduction);
        let max_reduction = draw(parameters.max_reduction).max(initial_reduction);
        Self {
            id,
            blockage_type,
            pipe,
            start_s,
            end_s: None,
            curve: parameters.curve,
            initial_reduction,
            max_reduction,
            growth_duration_s: draw(parameters.growth_days) * SECONDS_PER_DAY as f64,
            roughness_factor: draw(parameters.roughness_factor),
        }
    }

    pub fn state(&self, t: f64) -> EventState {
        event_state(self.start_s, self.end_s, t)
    }

    fn progress(&self, t: f64) -> f64 {
        self.curve
            .progress((t - self.start_s) / self.growth_duration_s)
    }

    /// Fraction of the diameter lost at time `t`. Zero before the blockage starts.
    pub fn reduction(&self, t: f64) -> f64 {
        if t < self.start_s {
            return 0.;
        }
        self.initial_reduction + (self.max_reduction - self.initial_reduction) * self.progress(t)
    }

    pub fn effective_diameter_m(&self, nominal_diameter_m: f64, t: f64) -> f64 {
        nominal_diameter_m * (1. - self.reduction(t))
    }

    /// Roughness increase at time `t`, growing with the blockage.
    pub fn roughness_multiplier(&self, t: f64) -> f64 {
        if t < self.start_s {
            return 1.;
        }
        1. + (self.roughness_factor - 1.) * self.progress(t)
    }

    /// Hazen-Williams C divisor giving the roughness increase as a head-loss factor.
    pub fn roughness_c_divisor(&self, t: f64) -> f64 {
        self.roughness_multiplier(t)
            .powf(1. / HAZEN_WILLIAMS_C_EXPONENT)
    }
}

pub struct BlockageGenerator {
    annual_rate_per_km: f64,
}

impl BlockageGenerator {
    pub fn new(annual_rate_per_km: f64) -> Self {
        Self { annual_rate_per_km }
    }

    pub fn expected_count(
        &self,
        network_length_m: f64,
        material: PipeMaterial,
        pipe_age_years: f64,
        hardness: HardnessBand,
        duration_days: f64,
    ) -> f64 {
        self.annual_rate_per_km
            * (network_length_m / METRES_PER_KILOMETRE)
            * material.leak_susceptibility()
            * age_factor(pipe_age_years)
            * hardness.rate_factor()
            * (duration_days / DAYS_PER_YEAR as f64)
    }

    /// Draw blockages for the run. Blockages are never placed in the metered pipe.
    pub fn generate(
        &self,
        network: &WaterNetwork,
        parameters: &ScheduleParameters,
        rng: &mut impl Rng,
    ) -> Result<Vec<BlockageEvent>, ConfigurationError> {
        let metered = network.metered_pipe();
        let eligible = (0..network.pipe_count())
            .filter(|idx| metered != Some(LinkIndex(*idx)))
            .map(|idx| network.pipes()[idx].name.clone())
            .collect::<Vec<_>>();
        if eligible.is_empty() {
            return Ok(vec![]);
        }

        let hardness = HardnessBand::from_mg_per_litre(parameters.water_hardness_mg_l);
        let expected = self.expected_count(
            network.total_length_m(),
            network.dominant_material().unwrap_or(PipeMaterial::Copper),
            parameters.pipe_age_years,
            hardness,
            parameters.duration_s / SECONDS_PER_DAY as f64,
        );
        let poisson = Poisson::new(expected.max(f64::MIN_POSITIVE))
            .map_err(|e| ConfigurationError::Validation(format!("blockage rate: {e}")))?;
        let count = poisson.sample(rng) as usize;

        let types = BlockageType::iter().collect::<Vec<_>>();
        let weights = WeightedIndex::new(types.iter().map(|t| hardness.type_weight(*t)))
            .map_err(|e| ConfigurationError::Validation(format!("blockage mix: {e}")))?;

        let mut blockages = Vec::with_capacity(count);
        for i in 0..count {
            let blockage_type = types[weights.sample(rng)];
            let start_s = rng.random_range(0. ..parameters.duration_s);
            let month = (parameters.start + Duration::milliseconds((start_s * 1000.) as i64))
                .month();
            if !blockage_type.occurs_in_month(month) {
                continue;
            }
            let Some(pipe) = eligible.choose(rng) else {
                continue;
            };
            blockages.push(BlockageEvent::sample(
                format!("blockage_{i}"),
                blockage_type,
                pipe.clone(),
                start_s,
                rng,
            ));
        }
        Ok(blockages)
    }
}
