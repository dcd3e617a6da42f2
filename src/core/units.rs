use std::f64::consts::PI;

pub const LITRES_PER_CUBIC_METRE: u32 = 1_000;
pub const MILLIMETRES_IN_METRE: u32 = 1_000;
pub const SECONDS_PER_MINUTE: u32 = 60;
pub const SECONDS_PER_HOUR: u32 = 3_600;
pub const SECONDS_PER_DAY: u32 = 86_400;
pub const DAYS_PER_YEAR: u32 = 365;
pub const PASCALS_PER_KILOPASCAL: f64 = 1_000.;
pub const METRES_PER_KILOMETRE: f64 = 1_000.;
pub const US_GALLONS_PER_CUBIC_METRE: f64 = 264.172_052_358;
pub const GRAVITATIONAL_ACCELERATION: f64 = 9.806_65; // m/s^2

pub fn litres_per_second_to_cubic_metres_per_second(flow_lps: f64) -> f64 {
    flow_lps / LITRES_PER_CUBIC_METRE as f64
}

pub fn cubic_metres_per_second_to_gpm(flow_m3s: f64) -> f64 {
    flow_m3s * US_GALLONS_PER_CUBIC_METRE * SECONDS_PER_MINUTE as f64
}

pub fn millimetres_to_metres(length_mm: f64) -> f64 {
    length_mm / MILLIMETRES_IN_METRE as f64
}

pub fn metres_to_millimetres(length_m: f64) -> f64 {
    length_m * MILLIMETRES_IN_METRE as f64
}

/// Cross-sectional area of a circular bore, in m^2
pub fn circular_area(diameter_m: f64) -> f64 {
    PI * (diameter_m / 2.) * (diameter_m / 2.)
}

/// Fraction of a year represented by a number of days
pub fn days_as_year_fraction(days: f64) -> f64 {
    days / DAYS_PER_YEAR as f64
}
