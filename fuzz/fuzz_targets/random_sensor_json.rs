#![no_main]

use libfuzzer_sys::fuzz_target;
use wdn_sim::input::SensorConfigSet;

fuzz_target!(|data: &[u8]| {
    let _sensors = SensorConfigSet::from_reader(data);
});
