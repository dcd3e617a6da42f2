//! Water temperature at the meter, from the supply temperature and heat exchange with the
//! house along the service main.

use crate::core::material_properties::{PipeMaterial, WATER};
use crate::simulation_time::SimulationTime;
use std::f64::consts::PI;

/// largest exponent used for the flowing relaxation
const MAX_BETA: f64 = 50.;
/// flows below this are treated as stagnant, in m^3/s
const STAGNANT_FLOW: f64 = 1e-9;
/// time constant for stagnant water approaching ambient, in s
const STAGNANT_TIME_CONSTANT_S: f64 = 3_600.;
const SUPPLY_SEASONAL_AMPLITUDE_C: f64 = 2.5;
/// day of year on which the supply is warmest
const SUPPLY_PEAK_DAY: f64 = 220.;

/// Indoor air temperature around the pipework by month (1-12), in deg C.
pub fn ambient_temperature(month: u32) -> f64 {
    match month {
        12 | 1 | 2 => 16.,
        6..=8 => 19.,
        _ => 18.,
    }
}

/// Mains supply temperature for a day of the year, in deg C.
pub fn supply_temperature(base_c: f64, day_of_year: u32) -> f64 {
    base_c
        + SUPPLY_SEASONAL_AMPLITUDE_C
            * (2. * PI * (day_of_year as f64 - SUPPLY_PEAK_DAY) / 365.).cos()
}

#[derive(Clone, Copy, Debug)]
struct Stagnation {
    /// temperature when the flow stopped, in deg C
    start_c: f64,
    elapsed_s: f64,
}

/// Temperature model for the pipe run from the street to the meter. Stagnation carries over
/// between calls, so consecutive days continue from where the previous one left off.
#[derive(Clone, Debug)]
pub struct TemperatureModel {
    base_supply_c: f64,
    heat_transfer_coefficient: f64,
    diameter_m: f64,
    length_m: f64,
    last_c: Option<f64>,
    stagnation: Option<Stagnation>,
}

impl TemperatureModel {
    pub fn new(base_supply_c: f64, material: PipeMaterial, diameter_m: f64, length_m: f64) -> Self {
        Self {
            base_supply_c,
            heat_transfer_coefficient: material.heat_transfer_coefficient(),
            diameter_m,
            length_m,
            last_c: None,
            stagnation: None,
        }
    }

    /// Relaxation exponent for water flowing at `flow` m^3/s.
    pub fn beta(&self, flow: f64) -> f64 {
        if flow.abs() < STAGNANT_FLOW {
            return MAX_BETA;
        }
        (self.heat_transfer_coefficient * PI * self.diameter_m * self.length_m
            / (WATER.volumetric_heat_capacity() * flow.abs()))
        .min(MAX_BETA)
    }

    /// Temperature for one step of `step_s` seconds.
    pub fn step(&mut self, flow: f64, supply_c: f64, ambient_c: f64, step_s: f64) -> f64 {
        let temperature = if flow.abs() >= STAGNANT_FLOW {
            self.stagnation = None;
            ambient_c + (supply_c - ambient_c) * (-self.beta(flow)).exp()
        } else {
            let stagnation = self.stagnation.get_or_insert(Stagnation {
                start_c: self.last_c.unwrap_or(supply_c),
                elapsed_s: 0.,
            });
            stagnation.elapsed_s += step_s;
            ambient_c
                + (stagnation.start_c - ambient_c)
                    * (-stagnation.elapsed_s / STAGNANT_TIME_CONSTANT_S).exp()
        };
        self.last_c = Some(temperature);
        temperature
    }

    /// Temperature at every step of the grid for a series of flows through the meter.
    pub fn simulate(&mut self, flows: &[f64], simulation_time: &SimulationTime) -> Vec<f64> {
        simulation_time
            .iter()
            .zip(flows)
            .map(|(t_it, flow)| {
                let supply = supply_temperature(self.base_supply_c, t_it.day_of_year());
                self.step(
                    *flow,
                    supply,
                    ambient_temperature(t_it.month()),
                    t_it.timestep,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rstest::*;

    #[fixture]
    fn model() -> TemperatureModel {
        TemperatureModel::new(12., PipeMaterial::Copper, 0.019, 12.)
    }

    #[rstest]
    #[case(1, 16.)]
    #[case(7, 19.)]
    #[case(4, 18.)]
    #[case(12, 16.)]
    fn ambient_should_follow_season(#[case] month: u32, #[case] expected: f64) {
        assert_eq!(ambient_temperature(month), expected);
    }

    #[rstest]
    fn supply_should_swing_around_base() {
        assert_relative_eq!(supply_temperature(12., 220), 14.5);
        assert!(supply_temperature(12., 37) < 10.);
    }

    #[rstest]
    fn fast_flow_should_stay_near_supply(mut model: TemperatureModel) {
        let t = model.step(5e-4, 10., 18., 60.);
        assert!(t > 10. && t < 11.);
    }

    #[rstest]
    fn beta_should_be_capped(model: TemperatureModel) {
        assert_eq!(model.beta(0.), MAX_BETA);
        assert_eq!(model.beta(2e-9), MAX_BETA);
        assert!(model.beta(1e-4) < MAX_BETA);
    }

    #[rstest]
    fn stagnant_water_should_relax_from_last_temperature(mut model: TemperatureModel) {
        let flowing = model.step(5e-4, 10., 18., 60.);
        let after_one_constant = model.step(0., 10., 18., STAGNANT_TIME_CONSTANT_S);
        assert_relative_eq!(
            after_one_constant,
            18. + (flowing - 18.) * (-1f64).exp(),
            max_relative = 1e-12
        );
        let later = model.step(0., 10., 18., STAGNANT_TIME_CONSTANT_S);
        assert!(later > after_one_constant && later < 18.);

        // flow resumes: back to the flowing law
        let resumed = model.step(5e-4, 10., 18., 60.);
        assert_relative_eq!(resumed, flowing);
    }

    #[rstest]
    fn stagnation_should_carry_across_calls(mut model: TemperatureModel) {
        let time =
            SimulationTime::for_days(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(), 1, 3_600.);
        let first = model.simulate(&vec![0.; time.total_steps()], &time);
        let second = model.simulate(&vec![0.; time.total_steps()], &time);
        assert!(first.windows(2).all(|w| w[1] >= w[0]));
        assert!(second[0] >= first[first.len() - 1]);
        assert!(second[second.len() - 1] <= 16.);
    }
}
