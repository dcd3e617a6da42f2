use schemars::schema_for;
use wdn_sim::input::{ProfileSet, SensorConfigSet};

#[test]
fn test_generate_json_schema() {
    let schema = serde_json::to_value(schema_for!(ProfileSet)).unwrap();
    assert!(schema["definitions"].get("HouseProfile").is_some());
    assert!(serde_json::to_string_pretty(&schema_for!(SensorConfigSet)).is_ok());
}
