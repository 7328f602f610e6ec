//! JSON test vector loader for StatsD codec tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LineVector {
    pub description: String,
    #[serde(default)]
    pub prefix: String,
    pub key: String,
    pub value: i64,
    #[serde(default = "full_rate")]
    pub sample_rate: f32,
    #[serde(default)]
    pub expect: Option<String>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub disposition: String,
}

#[derive(Debug, Deserialize)]
pub struct PacketVector {
    pub description: String,
    pub max_bytes: usize,
    pub lines: Vec<String>,
    pub expect: Vec<String>,
}

fn full_rate() -> f32 {
    1.0
}

pub fn load<T: for<'de> Deserialize<'de>>(name: &str) -> T {
    let s = std::fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}
