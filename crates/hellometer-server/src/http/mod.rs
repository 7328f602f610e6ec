//! HTTP surface: the `/hello` handler and panic-to-500 conversion.

pub mod error;
pub mod hello;
