//! Stochastic household water demand: pulse trains per fixture, scaled to a sampled daily
//! consumption, and their allocation to the junctions of a network.

use crate::core::network::{NodeIndex, WaterNetwork};
use crate::core::units::{
    litres_per_second_to_cubic_metres_per_second, SECONDS_PER_DAY, SECONDS_PER_HOUR,
};
use crate::errors::ConfigurationError;
use crate::input::{FixtureSpec, HouseProfile};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use indexmap::IndexMap;
use rand::seq::IndexedRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};

/// share of fixture uses placed inside a peak window
const PEAK_PLACEMENT_PROBABILITY: f64 = 0.7;

/// A household demand series on a uniform grid, in L/s.
#[derive(Clone, Debug, PartialEq)]
pub struct DemandSeries {
    step_s: f64,
    total_lps: Vec<f64>,
    fixtures: IndexMap<String, Vec<f64>>,
    /// background use not attributed to any fixture
    background_lps: Vec<f64>,
    occupancy: u32,
    target_volume_l: f64,
}

impl DemandSeries {
    pub fn zeros(steps: usize, step_s: f64) -> Self {
        Self {
            step_s,
            total_lps: vec![0.; steps],
            fixtures: IndexMap::new(),
            background_lps: vec![0.; steps],
            occupancy: 0,
            target_volume_l: 0.,
        }
    }

    pub fn step_s(&self) -> f64 {
        self.step_s
    }

    pub fn len(&self) -> usize {
        self.total_lps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_lps.is_empty()
    }

    pub fn total_lps(&self) -> &[f64] {
        &self.total_lps
    }

    pub fn fixtures(&self) -> &IndexMap<String, Vec<f64>> {
        &self.fixtures
    }

    pub fn background_lps(&self) -> &[f64] {
        &self.background_lps
    }

    pub fn occupancy(&self) -> u32 {
        self.occupancy
    }

    /// the consumption the series was scaled to, in litres
    pub fn target_volume_l(&self) -> f64 {
        self.target_volume_l
    }

    pub fn total_volume_l(&self) -> f64 {
        self.total_lps.iter().sum::<f64>() * self.step_s
    }

    /// The same series with every component multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |series: &Vec<f64>| series.iter().map(|v| v * factor).collect::<Vec<_>>();
        Self {
            step_s: self.step_s,
            total_lps: scale(&self.total_lps),
            fixtures: self
                .fixtures
                .iter()
                .map(|(name, series)| (name.clone(), scale(series)))
                .collect(),
            background_lps: scale(&self.background_lps),
            occupancy: self.occupancy,
            target_volume_l: self.target_volume_l * factor,
        }
    }

    fn update_total(&mut self) {
        self.total_lps = self.background_lps.clone();
        for series in self.fixtures.values() {
            for (total, value) in self.total_lps.iter_mut().zip(series) {
                *total += value;
            }
        }
    }
}

pub struct DemandGenerator<'a, R: Rng> {
    profile: &'a HouseProfile,
    rng: &'a mut R,
}

impl<'a, R: Rng> DemandGenerator<'a, R> {
    pub fn new(profile: &'a HouseProfile, rng: &'a mut R) -> Self {
        Self { profile, rng }
    }

    /// Seasonal and weekend multiplier for the moment `t`.
    fn multiplier(&self, at: NaiveDateTime) -> f64 {
        let seasonal = self.profile.seasonal_factors[at.month0() as usize];
        match at.weekday() {
            Weekday::Sat | Weekday::Sun => seasonal * self.profile.weekend_factor,
            _ => seasonal,
        }
    }

    fn place(&mut self, fixture: &FixtureSpec, duration_s: f64) -> f64 {
        let days = (duration_s / SECONDS_PER_DAY as f64).ceil().max(1.) as u32;
        if !fixture.peak_hours.is_empty() && self.rng.random_bool(PEAK_PLACEMENT_PROBABILITY) {
            if let Some(window) = fixture.peak_hours.choose(&mut *self.rng) {
                let day = self.rng.random_range(0..days) as f64;
                let hour = window.sample(&mut *self.rng);
                let t = day * SECONDS_PER_DAY as f64 + hour * SECONDS_PER_HOUR as f64;
                if t < duration_s {
                    return t;
                }
            }
        }
        self.rng.random_range(0. ..duration_s)
    }

    pub fn generate(
        &mut self,
        start_date: NaiveDate,
        duration_s: f64,
        resolution_s: f64,
    ) -> Result<DemandSeries, ConfigurationError> {
        let profile = self.profile;
        let start = start_date.and_time(chrono::NaiveTime::MIN);
        let steps = (duration_s / resolution_s).ceil() as usize;
        let days = duration_s / SECONDS_PER_DAY as f64;

        let occupancy = self.rng.random_range(
            profile.occupancy.min().round() as u32..=profile.occupancy.max().round() as u32,
        );
        let daily_target_l = profile.daily_consumption_l.sample(&mut *self.rng);
        let target_volume_l = (0..days.ceil() as u32)
            .map(|day| {
                let fraction = (days - day as f64).min(1.);
                daily_target_l * fraction * self.multiplier(start + Duration::days(day as i64))
            })
            .sum::<f64>();

        let mut fixtures = IndexMap::with_capacity(profile.fixtures.len());
        for (name, fixture) in &profile.fixtures {
            let mut series = vec![0.; steps];
            let rate = fixture.uses_per_person_per_day.sample(&mut *self.rng);
            let poisson = Poisson::new((occupancy as f64 * rate * days).max(f64::MIN_POSITIVE))
                .map_err(|e| ConfigurationError::Validation(format!("fixture '{name}': {e}")))?;
            let uses = poisson.sample(&mut *self.rng) as usize;

            for _ in 0..uses {
                let t = self.place(fixture, duration_s);
                let multiplier =
                    self.multiplier(start + Duration::milliseconds((t * 1000.) as i64));
                let first = ((t / resolution_s) as usize).min(steps.saturating_sub(1));
                match (fixture.volume_l, &fixture.flow_lps, &fixture.duration_s) {
                    (Some(volume_l), _, _) => {
                        series[first] += volume_l / resolution_s * multiplier;
                    }
                    (None, Some(flow), Some(duration)) => {
                        let flow_lps = flow.sample(&mut *self.rng);
                        let span = (duration.sample(&mut *self.rng) / resolution_s).ceil().max(1.);
                        for value in series.iter_mut().skip(first).take(span as usize) {
                            *value += flow_lps * multiplier;
                        }
                    }
                    _ => {}
                }
            }
            fixtures.insert(name.clone(), series);
        }

        let background_lps = if profile.noise_floor_lps > 0. {
            let noise = Normal::new(0., profile.noise_floor_lps)
                .map_err(|e| ConfigurationError::Validation(format!("noise floor: {e}")))?;
            (0..steps)
                .map(|_| noise.sample(&mut *self.rng).max(0.))
                .collect()
        } else {
            vec![0.; steps]
        };

        let mut series = DemandSeries {
            step_s: resolution_s,
            total_lps: vec![],
            fixtures,
            background_lps,
            occupancy,
            target_volume_l,
        };
        series.update_total();

        let volume_l = series.total_volume_l();
        if volume_l > 0. {
            series = series.scaled(target_volume_l / volume_l);
        } else if steps > 0 {
            series.background_lps = vec![target_volume_l / (steps as f64 * resolution_s); steps];
            series.update_total();
        }
        series.target_volume_l = target_volume_l;
        Ok(series)
    }
}

/// Demand per junction per step, in m^3/s.
#[derive(Clone, Debug, Default)]
pub struct DemandAllocation {
    nodes: IndexMap<NodeIndex, Vec<f64>>,
}

impl DemandAllocation {
    /// Spread each fixture's series equally over the junctions carrying that fixture. Fixtures
    /// no junction carries, and background use, go to the network's default demand node.
    pub fn new(network: &WaterNetwork, demand: &DemandSeries) -> Result<Self, ConfigurationError> {
        let mut nodes: IndexMap<NodeIndex, Vec<f64>> = IndexMap::new();
        let default_node = network.default_demand_node();
        let mut add = |node: NodeIndex, series: &[f64], share: f64| {
            let target = nodes
                .entry(node)
                .or_insert_with(|| vec![0.; series.len()]);
            for (total, lps) in target.iter_mut().zip(series) {
                *total += litres_per_second_to_cubic_metres_per_second(lps * share);
            }
        };

        for (fixture, series) in demand.fixtures() {
            let carriers = network
                .junction_indices()
                .filter(|idx| {
                    network
                        .node(*idx)
                        .junction()
                        .is_some_and(|j| j.fixtures.contains(fixture))
                })
                .collect::<Vec<_>>();
            if carriers.is_empty() {
                let node = default_node.ok_or_else(|| no_demand_node(fixture))?;
                add(node, series, 1.);
            } else {
                let share = 1. / carriers.len() as f64;
                for node in carriers {
                    add(node, series, share);
                }
            }
        }
        if demand.background_lps().iter().any(|v| *v > 0.) {
            let node = default_node.ok_or_else(|| no_demand_node("background"))?;
            add(node, demand.background_lps(), 1.);
        }

        Ok(Self { nodes })
    }

    /// Set the demands for `step` on the network, clearing any left from another step.
    pub fn apply(&self, network: &mut WaterNetwork, step: usize) {
        network.clear_demands();
        for (node, series) in &self.nodes {
            network.set_demand(*node, series.get(step).copied().unwrap_or(0.));
        }
    }

    pub fn total_m3s(&self, step: usize) -> f64 {
        self.nodes
            .values()
            .filter_map(|series| series.get(step))
            .sum()
    }
}

fn no_demand_node(demand: &str) -> ConfigurationError {
    ConfigurationError::InvalidTopology(format!("no junction can take the '{demand}' demand"))
}
