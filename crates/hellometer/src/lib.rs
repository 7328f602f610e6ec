//! Top-level facade crate for hellometer.
//!
//! Re-exports core types and the server library so users can depend on a single crate.

pub mod core {
    pub use hellometer_core::*;
}

pub mod server {
    pub use hellometer_server::*;
}
