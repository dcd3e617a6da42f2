use schemars::schema_for;
use wdn_sim::input::{ProfileSet, SensorConfigSet};

fn main() {
    let schemas = serde_json::json!({
        "profiles": schema_for!(ProfileSet),
        "sensors": schema_for!(SensorConfigSet),
    });
    println!("{}", serde_json::to_string_pretty(&schemas).unwrap());
}
