//! hellometer server library entry.
//!
//! This crate wires config, the two telemetry sinks, the `/hello` route, and
//! the startup/shutdown sequence into one service. It is consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod obs;
pub mod router;
