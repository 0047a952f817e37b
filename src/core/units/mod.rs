//! Prediction units composed by the frontend.

/// Branch prediction unit (BTB, RAS, direction and indirect predictors).
pub mod bpu;
