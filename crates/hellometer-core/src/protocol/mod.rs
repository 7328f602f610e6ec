//! Wire protocol primitives.
//!
//! - StatsD: plain-text counter lines packed into UDP-sized datagrams

pub mod statsd;
