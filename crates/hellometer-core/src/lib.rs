//! hellometer core: transport-agnostic telemetry primitives and error types.
//!
//! This crate defines the pieces of the metrics pipeline that do not need a
//! runtime: the shared error surface, the export retry schedule, and the
//! StatsD line/packet codec. It carries no tokio or network dependencies so
//! the server crate and tests can reuse it directly.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `HellometerError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;
pub mod retry;

/// Shared result type.
pub use error::{Disposition, HellometerError, Result};
pub use retry::{Backoff, RetryPolicy};
