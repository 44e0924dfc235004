//! Loan intake and underwriting.
//!
//! Submitted loans are picked up by a periodic feeder, evaluated by a fixed worker pool, and
//! either decided automatically by amount or routed to the least-loaded eligible agent.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
