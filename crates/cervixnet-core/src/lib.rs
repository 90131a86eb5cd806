//! CervixNet Core
//!
//! Core types and error handling shared across the CervixNet crates.
//!
//! This crate provides:
//! - The error taxonomy surfaced to HTTP clients
//! - Labels, predictions, and the threshold policy that produces them
//! - Output rounding applied before serialization

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    round4, Comparison, ConfidenceMode, Label, Prediction, ThresholdPolicy, DEFAULT_THRESHOLD,
};

