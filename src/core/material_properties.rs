use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// This module contains data on the properties of water and of the pipe materials
/// found in domestic plumbing.

#[derive(Clone, Copy, Debug)]
pub struct FluidProperties {
    density: f64,                // kg/m^3
    specific_heat_capacity: f64, // J/(kg.K)
    kinematic_viscosity: f64,    // m^2/s
    bulk_modulus: f64,           // Pa
}

impl FluidProperties {
    pub const fn new(
        density: f64,
        specific_heat_capacity: f64,
        kinematic_viscosity: f64,
        bulk_modulus: f64,
    ) -> Self {
        Self {
            density,
            specific_heat_capacity,
            kinematic_viscosity,
            bulk_modulus,
        }
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn specific_heat_capacity(&self) -> f64 {
        self.specific_heat_capacity
    }

    pub fn kinematic_viscosity(&self) -> f64 {
        self.kinematic_viscosity
    }

    pub fn bulk_modulus(&self) -> f64 {
        self.bulk_modulus
    }

    /// Volumetric heat capacity, in J/(m^3.K)
    pub fn volumetric_heat_capacity(&self) -> f64 {
        self.density * self.specific_heat_capacity
    }
}

/// Water at around 20 degrees C.
pub const WATER: FluidProperties = FluidProperties::new(998.2, 4184.0, 1.004e-6, 2.2e9);

#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumIter, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipeMaterial {
    Copper,
    #[serde(alias = "PEX")]
    Pex,
    #[serde(alias = "CPVC")]
    Cpvc,
    #[serde(alias = "PVC")]
    Pvc,
    GalvanisedSteel,
}

impl PipeMaterial {
    /// Hazen-Williams roughness coefficient C for new pipe
    pub fn hazen_williams_c(&self) -> f64 {
        match self {
            PipeMaterial::Copper => 130.,
            PipeMaterial::Pex => 160.,
            PipeMaterial::Cpvc => 150.,
            PipeMaterial::Pvc => 150.,
            PipeMaterial::GalvanisedSteel => 120.,
        }
    }

    /// Absolute roughness used with Darcy-Weisbach, in m
    pub fn absolute_roughness(&self) -> f64 {
        match self {
            PipeMaterial::Copper => 1.5e-6,
            PipeMaterial::Pex => 7.0e-6,
            PipeMaterial::Cpvc => 1.5e-6,
            PipeMaterial::Pvc => 1.5e-6,
            PipeMaterial::GalvanisedSteel => 1.5e-4,
        }
    }

    /// Heat transfer coefficient between pipe contents and the surrounding air, in W/(m^2.K)
    pub fn heat_transfer_coefficient(&self) -> f64 {
        match self {
            PipeMaterial::Copper => 10.0,
            PipeMaterial::GalvanisedSteel => 8.0,
            PipeMaterial::Pvc => 2.8,
            PipeMaterial::Cpvc => 3.0,
            PipeMaterial::Pex => 2.5,
        }
    }

    /// Young's modulus of the pipe wall, in Pa
    pub fn youngs_modulus(&self) -> f64 {
        match self {
            PipeMaterial::Copper => 117e9,
            PipeMaterial::Pex => 0.8e9,
            PipeMaterial::Cpvc => 2.9e9,
            PipeMaterial::Pvc => 3.0e9,
            PipeMaterial::GalvanisedSteel => 200e9,
        }
    }

    pub fn poisson_ratio(&self) -> f64 {
        match self {
            PipeMaterial::Copper => 0.34,
            PipeMaterial::Pex => 0.46,
            PipeMaterial::Cpvc => 0.40,
            PipeMaterial::Pvc => 0.45,
            PipeMaterial::GalvanisedSteel => 0.30,
        }
    }

    /// Wall thickness as a fraction of internal diameter
    pub fn wall_thickness_ratio(&self) -> f64 {
        match self {
            PipeMaterial::Copper => 0.06,
            PipeMaterial::Pex => 1. / 9.,
            PipeMaterial::Cpvc => 0.09,
            PipeMaterial::Pvc => 0.08,
            PipeMaterial::GalvanisedSteel => 0.12,
        }
    }

    /// Maximum design velocity, in m/s
    pub fn velocity_cap(&self) -> f64 {
        match self {
            PipeMaterial::Copper => 2.4,
            PipeMaterial::Pex => 3.0,
            PipeMaterial::Cpvc => 2.4,
            PipeMaterial::Pvc => 3.0,
            PipeMaterial::GalvanisedSteel => 2.4,
        }
    }

    /// Relative susceptibility of the material to developing leaks
    pub fn leak_susceptibility(&self) -> f64 {
        match self {
            PipeMaterial::Copper => 1.0,
            PipeMaterial::GalvanisedSteel => 1.6,
            PipeMaterial::Pvc => 0.9,
            PipeMaterial::Cpvc => 0.8,
            PipeMaterial::Pex => 0.6,
        }
    }
}
