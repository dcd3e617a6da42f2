//! Transit-time ultrasonic flow meter: converts the true velocity and temperature at the meter
//! into what the instrument reports, with its noise and data-quality faults.

use crate::core::units::circular_area;
use crate::input::MeterModel;
use rand::Rng;
use rand_distr::StandardNormal;
use rand_pcg::Pcg64;
use serde::Serialize;
use strum::Display;
use tracing::debug;

/// SNR at or above which the signal quality is reported as perfect, in dB
const FULL_QUALITY_SNR_DB: f64 = 60.;

/// Speed of sound in pure water between 0 and 95 deg C, Marczak (1997), in m/s.
pub fn speed_of_sound(temperature_c: f64) -> f64 {
    const COEFFICIENTS: [f64; 6] = [
        1.402385e3,
        5.038813,
        -5.799136e-2,
        3.287156e-4,
        -1.398845e-6,
        2.787860e-9,
    ];
    COEFFICIENTS
        .iter()
        .rev()
        .fold(0., |acc, coefficient| acc * temperature_c + coefficient)
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum DataQualityKind {
    Missing,
    BurstDropout,
    Outlier,
}

/// A fault deliberately injected into the meter output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SensorDataQualityEvent {
    pub kind: DataQualityKind,
    pub start_index: usize,
    pub length: usize,
    /// multiplicative factor applied, for outliers
    pub factor: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeterSample {
    pub flow_m3s: Option<f64>,
    pub velocity_ms: Option<f64>,
    pub upstream_transit_s: Option<f64>,
    pub downstream_transit_s: Option<f64>,
    pub delta_t_s: Option<f64>,
    pub totalizer_m3: f64,
    pub speed_of_sound_ms: f64,
    /// 0-1, from the signal-to-noise ratio
    pub signal_quality: f64,
    pub confidence: f64,
    /// flow through the meter before any instrument effects
    pub pre_noise_flow_m3s: f64,
    pub outlier: bool,
}

impl MeterSample {
    pub fn is_present(&self) -> bool {
        self.flow_m3s.is_some()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeterOutput {
    pub samples: Vec<MeterSample>,
    pub snr_db: f64,
    pub quality_events: Vec<SensorDataQualityEvent>,
}

impl MeterOutput {
    /// Totalizer reading after the last sample, to carry into the next call.
    pub fn final_totalizer(&self, carry_in: f64) -> f64 {
        self.samples
            .last()
            .map_or(carry_in, |sample| sample.totalizer_m3)
    }
}

pub struct UltrasonicMeter {
    model: MeterModel,
    diameter_m: f64,
    rng: Pcg64,
}

impl UltrasonicMeter {
    pub fn new(model: MeterModel, diameter_m: f64, rng: Pcg64) -> Self {
        Self {
            model,
            diameter_m,
            rng,
        }
    }

    pub fn model(&self) -> &MeterModel {
        &self.model
    }

    /// Acoustic path length for the configured number of traverses, in m.
    pub fn path_length(&self) -> f64 {
        self.model.traverses as f64 * self.diameter_m
            / self.model.incidence_angle_deg.to_radians().sin()
    }

    pub fn reflection_count(&self) -> u32 {
        self.model.traverses.saturating_sub(1)
    }

    /// Upstream and downstream transit times for a velocity, in s.
    pub fn transit_times(&self, velocity: f64, sound_speed: f64) -> (f64, f64) {
        let path = self.path_length();
        let axial = velocity * self.model.incidence_angle_deg.to_radians().cos();
        (path / (sound_speed - axial), path / (sound_speed + axial))
    }

    /// Velocity implied by a pair of transit times, in m/s.
    pub fn velocity_from_transit_times(&self, upstream_s: f64, downstream_s: f64) -> f64 {
        self.path_length() * (1. / downstream_s - 1. / upstream_s)
            / (2. * self.model.incidence_angle_deg.to_radians().cos())
    }

    fn gaussian(&mut self, std_dev: f64) -> f64 {
        if std_dev > 0. {
            std_dev * self.rng.sample::<f64, _>(StandardNormal)
        } else {
            0.
        }
    }

    fn quantise(&self, transit_s: f64) -> f64 {
        let resolution = self.model.transit_time_resolution_s;
        (transit_s / resolution).round() * resolution
    }

    /// Simulate the meter over a series of true velocities (m/s) and water temperatures
    /// (deg C) on a grid of `step_s`, continuing the totalizer from `totalizer_m3`.
    pub fn simulate(
        &mut self,
        velocities: &[f64],
        temperatures: &[f64],
        step_s: f64,
        totalizer_m3: f64,
    ) -> MeterOutput {
        let area = circular_area(self.diameter_m);
        let n = velocities.len().min(temperatures.len());
        let sound_speeds = temperatures[..n]
            .iter()
            .map(|t| speed_of_sound(*t))
            .collect::<Vec<_>>();

        // timing jitter, averaged over the pulses in a step, plus aging drift upstream
        let pulses = (self.model.sampling_rate_hz * step_s).max(1.);
        let jitter = self.model.jitter_std_s / pulses.sqrt();
        let drift = self.model.drift_per_year_s * self.model.age_days / 365.;
        let mut transits = Vec::with_capacity(n);
        for (velocity, c) in velocities[..n].iter().zip(&sound_speeds) {
            let (upstream, downstream) = self.transit_times(*velocity, *c);
            let noise_up = self.gaussian(jitter);
            let noise_down = self.gaussian(jitter);
            let upstream = self.quantise(upstream + noise_up + drift);
            let downstream = self.quantise(downstream + noise_down);
            transits.push((upstream, downstream));
        }

        // amplitude noise, then the low-flow cutoff
        let snr_db = self.model.snr_db.sample(&mut self.rng);
        let noise_ratio = 10f64.powf(-snr_db / 20.);
        let mut measured = Vec::with_capacity(n);
        for (upstream, downstream) in &transits {
            let velocity = self.velocity_from_transit_times(*upstream, *downstream);
            let velocity = velocity + self.gaussian(velocity.abs() * noise_ratio);
            measured.push(if velocity.abs() < self.model.low_flow_cutoff_ms {
                0.
            } else {
                velocity
            });
        }

        let mut quality_events = vec![];
        let present = self.inject_missing(n, &mut quality_events);
        let outliers = self.inject_outliers(&present, &mut quality_events);

        let signal_quality = (snr_db / FULL_QUALITY_SNR_DB).clamp(0., 1.);
        let mut totalizer = totalizer_m3;
        let samples = (0..n)
            .map(|i| {
                let pre_noise_flow_m3s = velocities[i] * area;
                if !present[i] {
                    return MeterSample {
                        flow_m3s: None,
                        velocity_ms: None,
                        upstream_transit_s: None,
                        downstream_transit_s: None,
                        delta_t_s: None,
                        totalizer_m3: totalizer,
                        speed_of_sound_ms: sound_speeds[i],
                        signal_quality,
                        confidence: 0.,
                        pre_noise_flow_m3s,
                        outlier: false,
                    };
                }
                let velocity = measured[i] * outliers[i].unwrap_or(1.);
                let flow = velocity * area;
                totalizer += flow.max(0.) * step_s;
                let (upstream, downstream) = transits[i];
                MeterSample {
                    flow_m3s: Some(flow),
                    velocity_ms: Some(velocity),
                    upstream_transit_s: Some(upstream),
                    downstream_transit_s: Some(downstream),
                    delta_t_s: Some(upstream - downstream),
                    totalizer_m3: totalizer,
                    speed_of_sound_ms: sound_speeds[i],
                    signal_quality,
                    confidence: signal_quality,
                    pre_noise_flow_m3s,
                    outlier: outliers[i].is_some(),
                }
            })
            .collect::<Vec<_>>();

        debug!(
            "meter simulated {n} samples at {snr_db:.1} dB SNR with {} injected faults",
            quality_events.len()
        );
        MeterOutput {
            samples,
            snr_db,
            quality_events,
        }
    }

    fn inject_missing(
        &mut self,
        n: usize,
        quality_events: &mut Vec<SensorDataQualityEvent>,
    ) -> Vec<bool> {
        let mut present = vec![true; n];
        let mut i = 0;
        while i < n {
            if self.rng.random_bool(self.model.burst_probability) {
                let length = self
                    .rng
                    .random_range(1..=self.model.burst_max_length)
                    .min(n - i);
                present[i..i + length].fill(false);
                quality_events.push(SensorDataQualityEvent {
                    kind: DataQualityKind::BurstDropout,
                    start_index: i,
                    length,
                    factor: None,
                });
                i += length;
                continue;
            }
            if self.rng.random_bool(self.model.missing_probability) {
                present[i] = false;
                quality_events.push(SensorDataQualityEvent {
                    kind: DataQualityKind::Missing,
                    start_index: i,
                    length: 1,
                    factor: None,
                });
            }
            i += 1;
        }
        present
    }

    fn inject_outliers(
        &mut self,
        present: &[bool],
        quality_events: &mut Vec<SensorDataQualityEvent>,
    ) -> Vec<Option<f64>> {
        present
            .iter()
            .enumerate()
            .map(|(i, present)| {
                if !*present || !self.rng.random_bool(self.model.outlier_probability) {
                    return None;
                }
                let factor = self.model.outlier_factor.sample(&mut self.rng);
                quality_events.push(SensorDataQualityEvent {
                    kind: DataQualityKind::Outlier,
                    start_index: i,
                    length: 1,
                    factor: Some(factor),
                });
                Some(factor)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SensorConfigSet;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rstest::*;

    fn meter(name: &str, seed: u64) -> UltrasonicMeter {
        let meters = SensorConfigSet::bundled().unwrap();
        UltrasonicMeter::new(
            meters.meter(name).unwrap().clone(),
            0.019,
            Pcg64::seed_from_u64(seed),
        )
    }

    #[rstest]
    #[case(0., 1402.385)]
    #[case(20., 1482.3)]
    #[case(40., 1528.9)]
    fn speed_of_sound_should_follow_marczak(#[case] temperature: f64, #[case] expected: f64) {
        assert_relative_eq!(speed_of_sound(temperature), expected, max_relative = 1e-4);
    }

    #[rstest]
    fn w_path_geometry() {
        let meter = meter("clamp_on_standard", 1);
        assert_relative_eq!(meter.path_length(), 4. * 0.019 / 60f64.to_radians().sin());
        assert_eq!(meter.reflection_count(), 3);

        let (upstream, downstream) = meter.transit_times(1.5, 1480.);
        assert!(upstream > downstream);
        assert_relative_eq!(
            meter.velocity_from_transit_times(upstream, downstream),
            1.5,
            max_relative = 1e-9
        );
    }

    #[rstest]
    fn ideal_meter_should_recover_velocity() {
        let mut meter = meter("ideal", 1);
        let velocities = [0., 0.4, 1.2, 0.8, 0.];
        let output = meter.simulate(&velocities, &[12.; 5], 60., 0.);

        assert!(output.quality_events.is_empty());
        for (sample, velocity) in output.samples.iter().zip(velocities) {
            assert_relative_eq!(sample.velocity_ms.unwrap(), velocity, epsilon = 1e-6);
        }
        let expected_total = velocities.iter().sum::<f64>() * circular_area(0.019) * 60.;
        assert_relative_eq!(
            output.final_totalizer(0.),
            expected_total,
            max_relative = 1e-5
        );
    }

    #[rstest]
    fn zero_velocity_should_give_flat_totalizer() {
        let mut meter = meter("clamp_on_standard", 5);
        let steps = 2_000;
        let output = meter.simulate(&vec![0.; steps], &vec![14.; steps], 60., 3.5);

        let mut previous = 3.5;
        for sample in &output.samples {
            assert_eq!(sample.pre_noise_flow_m3s, 0.);
            assert!(sample.totalizer_m3 >= previous);
            previous = sample.totalizer_m3;
        }
        let noisy = output
            .samples
            .iter()
            .filter(|sample| sample.flow_m3s.is_some_and(|flow| flow != 0.))
            .count();
        assert!(noisy < steps / 100);
    }

    #[rstest]
    fn should_be_reproducible_for_a_seed() {
        let velocities = (0..500).map(|i| (i as f64 / 50.).sin().abs()).collect::<Vec<_>>();
        let temperatures = vec![11.; 500];
        let a = meter("clamp_on_standard", 9).simulate(&velocities, &temperatures, 60., 0.);
        let b = meter("clamp_on_standard", 9).simulate(&velocities, &temperatures, 60., 0.);
        assert_eq!(a, b);
    }

    #[rstest]
    fn missing_samples_should_be_null_and_reported() {
        let mut model = SensorConfigSet::bundled()
            .unwrap()
            .meter("ideal")
            .unwrap()
            .clone();
        model.missing_probability = 1.;
        let mut meter = UltrasonicMeter::new(model, 0.019, Pcg64::seed_from_u64(1));
        let output = meter.simulate(&[0.5; 10], &[12.; 10], 60., 1.);

        assert!(output.samples.iter().all(|s| !s.is_present() && s.confidence == 0.));
        assert_eq!(output.quality_events.len(), 10);
        assert_eq!(output.final_totalizer(1.), 1.);
    }

    #[rstest]
    fn outliers_should_scale_the_reading() {
        let mut model = SensorConfigSet::bundled()
            .unwrap()
            .meter("ideal")
            .unwrap()
            .clone();
        model.outlier_probability = 1.;
        model.outlier_factor = crate::input::ValueRange(3., 3.);
        let mut meter = UltrasonicMeter::new(model, 0.019, Pcg64::seed_from_u64(1));
        let output = meter.simulate(&[0.5; 4], &[12.; 4], 60., 0.);

        for sample in &output.samples {
            assert!(sample.outlier);
            assert_relative_eq!(sample.velocity_ms.unwrap(), 1.5, max_relative = 1e-6);
        }
    }
}
