/// Head-loss and flow-regime relations for full circular pipes, in SI units.
use crate::core::material_properties::{PipeMaterial, WATER};
use crate::core::units::{circular_area, GRAVITATIONAL_ACCELERATION};
use std::f64::consts::PI;

pub const LAMINAR_LIMIT: f64 = 2300.;
pub const TURBULENT_LIMIT: f64 = 4000.;
pub const HAZEN_WILLIAMS_FLOW_EXPONENT: f64 = 1.852;
pub const HAZEN_WILLIAMS_DIAMETER_EXPONENT: f64 = 4.871;
const HAZEN_WILLIAMS_SI_COEFFICIENT: f64 = 10.67;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlowRegime {
    Laminar,
    Transitional,
    Turbulent,
}

impl FlowRegime {
    pub fn classify(reynolds_number: f64) -> Self {
        if reynolds_number < LAMINAR_LIMIT {
            FlowRegime::Laminar
        } else if reynolds_number < TURBULENT_LIMIT {
            FlowRegime::Transitional
        } else {
            FlowRegime::Turbulent
        }
    }
}

pub fn reynolds_number(velocity: f64, diameter: f64, kinematic_viscosity: f64) -> f64 {
    velocity.abs() * diameter / kinematic_viscosity
}

/// Explicit approximation to the Colebrook-White friction factor, valid for Re >= 4000.
pub fn swamee_jain_friction_factor(reynolds_number: f64, relative_roughness: f64) -> f64 {
    0.25 / (relative_roughness / 3.7 + 5.74 / reynolds_number.powf(0.9))
        .log10()
        .powi(2)
}

/// Darcy friction factor across all regimes: 64/Re when laminar, Swamee-Jain when turbulent
/// and a linear blend between the two in the transitional band.
pub fn darcy_friction_factor(reynolds_number: f64, relative_roughness: f64) -> f64 {
    match FlowRegime::classify(reynolds_number) {
        FlowRegime::Laminar => 64. / reynolds_number.max(f64::MIN_POSITIVE),
        FlowRegime::Turbulent => swamee_jain_friction_factor(reynolds_number, relative_roughness),
        FlowRegime::Transitional => {
            let laminar = 64. / LAMINAR_LIMIT;
            let turbulent = swamee_jain_friction_factor(TURBULENT_LIMIT, relative_roughness);
            let fraction =
                (reynolds_number - LAMINAR_LIMIT) / (TURBULENT_LIMIT - LAMINAR_LIMIT);
            laminar + (turbulent - laminar) * fraction
        }
    }
}

/// Darcy-Weisbach head loss for a flow in m^3/s, in m. Signed with the flow.
pub fn darcy_weisbach_headloss(
    flow: f64,
    diameter: f64,
    length: f64,
    absolute_roughness: f64,
) -> f64 {
    if flow == 0. {
        return 0.;
    }
    let velocity = flow / circular_area(diameter);
    let re = reynolds_number(velocity, diameter, WATER.kinematic_viscosity());
    let friction_factor = darcy_friction_factor(re, absolute_roughness / diameter);
    flow.signum() * friction_factor * (length / diameter) * velocity.powi(2)
        / (2. * GRAVITATIONAL_ACCELERATION)
}

/// Resistance r in h = r * Q^1.852
pub fn hazen_williams_resistance(length: f64, diameter: f64, roughness_c: f64) -> f64 {
    HAZEN_WILLIAMS_SI_COEFFICIENT * length
        / (roughness_c.powf(HAZEN_WILLIAMS_FLOW_EXPONENT)
            * diameter.powf(HAZEN_WILLIAMS_DIAMETER_EXPONENT))
}

/// Hazen-Williams head loss for a flow in m^3/s, in m. Signed with the flow.
pub fn hazen_williams_headloss(flow: f64, diameter: f64, length: f64, roughness_c: f64) -> f64 {
    flow.signum()
        * hazen_williams_resistance(length, diameter, roughness_c)
        * flow.abs().powf(HAZEN_WILLIAMS_FLOW_EXPONENT)
}

/// Coefficient m in h = m * Q^2 for a fitting loss coefficient k
pub fn minor_loss_resistance(minor_loss: f64, diameter: f64) -> f64 {
    8. * minor_loss / (GRAVITATIONAL_ACCELERATION * PI.powi(2) * diameter.powi(4))
}

pub fn pressure_to_head(pressure_pa: f64) -> f64 {
    pressure_pa / (WATER.density() * GRAVITATIONAL_ACCELERATION)
}

pub fn head_to_pressure(head_m: f64) -> f64 {
    head_m * WATER.density() * GRAVITATIONAL_ACCELERATION
}

/// Largest flow the pipe carries at its material's design velocity, in m^3/s
pub fn pipe_capacity(diameter: f64, material: PipeMaterial) -> f64 {
    material.velocity_cap() * circular_area(diameter)
}

pub fn clip_velocity(velocity: f64, material: PipeMaterial) -> f64 {
    velocity.clamp(-material.velocity_cap(), material.velocity_cap())
}
