use super::{event_state, EventState, ScheduleParameters};
use crate::core::material_properties::{PipeMaterial, WATER};
use crate::core::network::WaterNetwork;
use crate::core::units::{
    circular_area, millimetres_to_metres, DAYS_PER_YEAR, GRAVITATIONAL_ACCELERATION,
    METRES_PER_KILOMETRE, SECONDS_PER_DAY,
};
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

#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumIter, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeakType {
    Pinhole,
    Gradual,
    FreezeBurst,
    PressureBurst,
}

impl LeakType {
    /// range of the opening diameter when the leak first appears, in mm
    pub fn initial_diameter_range_mm(&self) -> (f64, f64) {
        match self {
            LeakType::Pinhole => (0.5, 1.5),
            LeakType::Gradual => (0.5, 1.0),
            LeakType::FreezeBurst => (5., 15.),
            LeakType::PressureBurst => (3., 10.),
        }
    }

    pub fn max_diameter_mm(&self) -> f64 {
        match self {
            LeakType::Pinhole => 3.,
            LeakType::Gradual => 10.,
            LeakType::FreezeBurst => 25.,
            LeakType::PressureBurst => 20.,
        }
    }

    pub fn discharge_coefficient(&self) -> f64 {
        match self {
            LeakType::Pinhole => 0.61,
            LeakType::Gradual => 0.65,
            LeakType::FreezeBurst => 0.75,
            LeakType::PressureBurst => 0.80,
        }
    }

    /// share of randomly generated leaks of this type
    pub fn mix_weight(&self) -> f64 {
        match self {
            LeakType::Pinhole => 0.40,
            LeakType::Gradual => 0.35,
            LeakType::FreezeBurst => 0.15,
            LeakType::PressureBurst => 0.10,
        }
    }

    fn sample_growth(&self, rng: &mut impl Rng) -> DiameterGrowth {
        match self {
            LeakType::Pinhole => DiameterGrowth::Linear {
                mm_per_day: rng.random_range(0.01..=0.05),
            },
            LeakType::Gradual => DiameterGrowth::Compounding {
                factor_per_day: rng.random_range(1.02..=1.10),
            },
            LeakType::FreezeBurst => DiameterGrowth::Linear { mm_per_day: 0.5 },
            LeakType::PressureBurst => DiameterGrowth::Linear { mm_per_day: 0.2 },
        }
    }

    /// Freeze bursts only occur in December, January and February.
    pub fn occurs_in_month(&self, month: u32) -> bool {
        match self {
            LeakType::FreezeBurst => matches!(month, 12 | 1 | 2),
            _ => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DiameterGrowth {
    Linear { mm_per_day: f64 },
    /// diameter multiplied by this factor for each elapsed day
    Compounding { factor_per_day: f64 },
}

/// A progressively growing opening at a junction, modelled as an emitter.
#[derive(Clone, Debug, PartialEq)]
pub struct LeakEvent {
    pub id: String,
    pub leak_type: LeakType,
    /// name of the junction the leak is at
    pub location: String,
    /// seconds since the start of the simulation
    pub start_s: f64,
    pub end_s: Option<f64>,
    pub initial_diameter_mm: f64,
    pub growth: DiameterGrowth,
    pub max_diameter_mm: f64,
    pub discharge_coefficient: f64,
}

impl LeakEvent {
    /// A leak of the given type with its opening size and growth rate drawn from the type's
    /// parameter ranges.
    pub fn sample(
        id: String,
        leak_type: LeakType,
        location: String,
        start_s: f64,
        end_s: Option<f64>,
        rng: &mut impl Rng,
    ) -> Self {
        let (low, high) = leak_type.initial_diameter_range_mm();
        Self {
            id,
            leak_type,
            location,
            start_s,
            end_s,
            initial_diameter_mm: rng.random_range(low..=high),
            growth: leak_type.sample_growth(rng),
            max_diameter_mm: leak_type.max_diameter_mm(),
            discharge_coefficient: leak_type.discharge_coefficient(),
        }
    }

    pub fn with_initial_diameter(mut self, diameter_mm: f64) -> Self {
        self.initial_diameter_mm = diameter_mm.clamp(0., self.max_diameter_mm);
        self
    }

    pub fn state(&self, t: f64) -> EventState {
        event_state(self.start_s, self.end_s, t)
    }

    /// Opening diameter at time `t`, in mm. Zero before the leak starts.
    pub fn diameter_mm(&self, t: f64) -> f64 {
        if t < self.start_s {
            return 0.;
        }
        let elapsed_days = (t - self.start_s) / SECONDS_PER_DAY as f64;
        let diameter = match self.growth {
            DiameterGrowth::Linear { mm_per_day } => {
                self.initial_diameter_mm + mm_per_day * elapsed_days
            }
            DiameterGrowth::Compounding { factor_per_day } => {
                self.initial_diameter_mm * factor_per_day.powf(elapsed_days)
            }
        };
        diameter.min(self.max_diameter_mm)
    }

    pub fn area_m2(&self, t: f64) -> f64 {
        circular_area(millimetres_to_metres(self.diameter_mm(t)))
    }

    /// Emitter coefficient K in Q = K * sqrt(pressure head), in m^2.5/s
    pub fn emitter_coefficient(&self, t: f64) -> f64 {
        self.discharge_coefficient * self.area_m2(t) * (2. * GRAVITATIONAL_ACCELERATION).sqrt()
    }

    /// Orifice flow Q = Cd * A * sqrt(2 * dP / rho) for a pressure difference in Pa, in m^3/s
    pub fn orifice_flow_m3s(&self, t: f64, pressure_difference_pa: f64) -> f64 {
        self.discharge_coefficient
            * self.area_m2(t)
            * (2. * pressure_difference_pa.max(0.) / WATER.density()).sqrt()
    }
}

/// Age factor shared by leak and blockage rates: pipes older than ten years degrade by 5% a
/// year, up to three times the base rate.
pub fn age_factor(pipe_age_years: f64) -> f64 {
    (1. + (pipe_age_years - 10.).max(0.) * 0.05).min(3.)
}

pub struct LeakGenerator {
    annual_rate_per_km: f64,
}

impl LeakGenerator {
    pub fn new(annual_rate_per_km: f64) -> Self {
        Self { annual_rate_per_km }
    }

    pub fn expected_count(
        &self,
        network_length_m: f64,
        material: PipeMaterial,
        pipe_age_years: f64,
        duration_days: f64,
    ) -> f64 {
        self.annual_rate_per_km
            * (network_length_m / METRES_PER_KILOMETRE)
            * material.leak_susceptibility()
            * age_factor(pipe_age_years)
            * (duration_days / DAYS_PER_YEAR as f64)
    }

    /// Draw leaks for the run. At least one leak is drawn whenever this is called, though
    /// freeze bursts outside winter are dropped.
    pub fn generate(
        &self,
        network: &WaterNetwork,
        parameters: &ScheduleParameters,
        rng: &mut impl Rng,
    ) -> Result<Vec<LeakEvent>, ConfigurationError> {
        let eligible = network
            .junction_indices()
            .filter(|idx| !network.is_service_entry(*idx))
            .map(|idx| network.node(idx).name.clone())
            .collect::<Vec<_>>();
        if eligible.is_empty() {
            return Ok(vec![]);
        }

        let expected = self.expected_count(
            network.total_length_m(),
            network.dominant_material().unwrap_or(PipeMaterial::Copper),
            parameters.pipe_age_years,
            parameters.duration_s / SECONDS_PER_DAY as f64,
        );
        let poisson = Poisson::new(expected.max(f64::MIN_POSITIVE))
            .map_err(|e| ConfigurationError::Validation(format!("leak rate: {e}")))?;
        let count = (poisson.sample(rng) as usize).max(1);

        let types = LeakType::iter().collect::<Vec<_>>();
        let weights = WeightedIndex::new(types.iter().map(LeakType::mix_weight))
            .map_err(|e| ConfigurationError::Validation(format!("leak mix: {e}")))?;

        let mut leaks = Vec::with_capacity(count);
        for i in 0..count {
            let leak_type = parameters
                .leak_type
                .unwrap_or_else(|| types[weights.sample(rng)]);
            let start_s = rng.random_range(0. ..parameters.duration_s);
            let month = (parameters.start + Duration::milliseconds((start_s * 1000.) as i64))
                .month();
            if !leak_type.occurs_in_month(month) {
                continue;
            }
            let Some(location) = eligible.choose(rng) else {
                continue;
            };
            leaks.push(LeakEvent::sample(
                format!("leak_{i}"),
                leak_type,
                location.clone(),
                start_s,
                None,
                rng,
            ));
        }
        Ok(leaks)
    }
}
