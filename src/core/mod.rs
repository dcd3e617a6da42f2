pub mod demand;
pub mod events;
pub mod hydraulics;
pub mod material_properties;
pub mod network;
pub mod sensor;
pub mod temperature;
pub mod units;
pub mod water_hammer;
