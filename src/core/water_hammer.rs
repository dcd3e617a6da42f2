//! Joukowsky surge estimates for sudden changes in pipe velocity.

use crate::core::material_properties::{PipeMaterial, WATER};
use crate::core::units::PASCALS_PER_KILOPASCAL;
use serde::Serialize;

pub const MIN_WAVE_SPEED: f64 = 200.;
pub const MAX_WAVE_SPEED: f64 = 1_400.;

/// Pressure wave speed in a thin-walled pipe anchored against axial movement, in m/s.
pub fn wave_speed(material: PipeMaterial, diameter_m: f64) -> f64 {
    let bulk_modulus = WATER.bulk_modulus();
    let wall_thickness = material.wall_thickness_ratio() * diameter_m;
    let restraint = 1. - material.poisson_ratio().powi(2);
    let stiffness = 1.
        + bulk_modulus * diameter_m * restraint / (material.youngs_modulus() * wall_thickness);
    ((bulk_modulus / WATER.density()) / stiffness)
        .sqrt()
        .clamp(MIN_WAVE_SPEED, MAX_WAVE_SPEED)
}

/// Surge for an instantaneous velocity change, in Pa.
pub fn joukowsky_surge(wave_speed: f64, velocity_change: f64) -> f64 {
    WATER.density() * wave_speed * velocity_change.abs()
}

/// Round trip time of a pressure wave along the pipe, in s.
pub fn critical_time(length_m: f64, wave_speed: f64) -> f64 {
    2. * length_m / wave_speed
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransientRecord {
    pub event_id: String,
    pub location: String,
    /// seconds from the start of the run
    pub time_s: f64,
    pub wave_speed_ms: f64,
    pub velocity_change_ms: f64,
    pub critical_time_s: f64,
    pub operation_time_s: f64,
    /// fraction of the instantaneous surge retained given the operation time
    pub reduction_factor: f64,
    pub surge_kpa: f64,
}

pub struct WaterHammerAnalyzer {
    material: PipeMaterial,
    diameter_m: f64,
    length_m: f64,
}

impl WaterHammerAnalyzer {
    pub fn new(material: PipeMaterial, diameter_m: f64, length_m: f64) -> Self {
        Self {
            material,
            diameter_m,
            length_m,
        }
    }

    pub fn wave_speed(&self) -> f64 {
        wave_speed(self.material, self.diameter_m)
    }

    /// Surge from a velocity change completed over `operation_time_s`. Operations slower than
    /// the critical time reduce the surge in proportion.
    pub fn analyze(
        &self,
        event_id: &str,
        location: &str,
        time_s: f64,
        velocity_change: f64,
        operation_time_s: f64,
    ) -> TransientRecord {
        let wave_speed = self.wave_speed();
        let critical_time_s = critical_time(self.length_m, wave_speed);
        let reduction_factor = if operation_time_s > critical_time_s {
            critical_time_s / operation_time_s
        } else {
            1.
        };
        TransientRecord {
            event_id: event_id.to_string(),
            location: location.to_string(),
            time_s,
            wave_speed_ms: wave_speed,
            velocity_change_ms: velocity_change,
            critical_time_s,
            operation_time_s,
            reduction_factor,
            surge_kpa: joukowsky_surge(wave_speed, velocity_change) * reduction_factor
                / PASCALS_PER_KILOPASCAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;
    use strum::IntoEnumIterator;

    #[rstest]
    fn wave_speed_should_be_stiffer_in_metal() {
        let copper = wave_speed(PipeMaterial::Copper, 0.019);
        let pex = wave_speed(PipeMaterial::Pex, 0.019);
        assert!(copper > 1_000.);
        assert!(pex < 700.);
        for material in PipeMaterial::iter() {
            let a = wave_speed(material, 0.019);
            assert!((MIN_WAVE_SPEED..=MAX_WAVE_SPEED).contains(&a));
        }
    }

    #[rstest]
    fn sudden_operation_should_give_full_joukowsky_surge() {
        let analyzer = WaterHammerAnalyzer::new(PipeMaterial::Copper, 0.019, 12.);
        let record = analyzer.analyze("burst", "kitchen", 100., 1., 0.);
        assert_relative_eq!(record.reduction_factor, 1.);
        assert_relative_eq!(
            record.surge_kpa,
            998.2 * record.wave_speed_ms / 1_000.,
            max_relative = 1e-12
        );
        assert_relative_eq!(record.critical_time_s, 24. / record.wave_speed_ms);
    }

    #[rstest]
    fn slow_operation_should_reduce_surge() {
        let analyzer = WaterHammerAnalyzer::new(PipeMaterial::Copper, 0.019, 12.);
        let sudden = analyzer.analyze("a", "kitchen", 0., 0.5, 0.);
        let slow = analyzer.analyze("a", "kitchen", 0., 0.5, 10. * sudden.critical_time_s);
        assert_relative_eq!(slow.surge_kpa, sudden.surge_kpa / 10., max_relative = 1e-12);
    }
}
