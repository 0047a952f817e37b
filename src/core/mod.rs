//! Frontend core: the fetch engine and its prediction units.

/// Fetch engine, fetch target queue, and SMT fetch policies.
pub mod frontend;
/// Prediction units (BPU and its sub-predictors).
pub mod units;
