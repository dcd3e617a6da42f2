#![no_main]

use libfuzzer_sys::fuzz_target;
use wdn_sim::core::network::builder::build_network;
use wdn_sim::input::ProfileSet;

fuzz_target!(|data: &[u8]| {
    if let Ok(profiles) = ProfileSet::from_reader(data) {
        for profile in profiles.profiles.values() {
            let _network = build_network(profile);
        }
    }
});
