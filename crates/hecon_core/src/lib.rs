//! Cohort decision-analytic simulation engine for health-economic evaluation
//!
//! This crate simulates disease progression for competing treatment
//! strategies as a cohort-level Markov model, propagates parameter
//! uncertainty through Monte Carlo sampling, and derives the decision
//! metrics used to rank strategies under a willingness-to-pay threshold.
//! It supports:
//! - Monthly state-transition cycling with tunnel-state relapse waning and
//!   age-dependent background mortality
//! - Structured uncertainty: Fixed/Beta/Gamma/LogNormal parameters with
//!   explicit opt-in rank correlation
//! - Discounted lifetime cost and QALY aggregation per jurisdiction
//! - ICERs with simple and extended dominance, NMB, CEAC and CEAF curves
//! - Expected value of perfect and partial information with precision flags
//! - Multi-year budget-impact projection over adoption curves
//!
//! # Builder DSL
//!
//! Use the fluent builder API for ergonomic model setup:
//!
//! ```ignore
//! use hecon_core::config::{ModelBuilder, StrategyBuilder};
//! use hecon_core::model::{Distribution, ValueRef};
//!
//! let registry = ModelBuilder::new()
//!     .parameter("p_remission", Distribution::Beta { alpha: 48.0, beta: 52.0 })
//!     .parameter("c_drug", Distribution::Gamma { shape: 16.0, scale: 50.0 })
//!     .strategy(StrategyBuilder::new("Esketamine")
//!         .remission(ValueRef::param("p_remission"))
//!         .relapse_waning(ValueRef::constant(0.08), ValueRef::constant(0.02), 6)
//!         .state_costs([ValueRef::param("c_drug"), ValueRef::constant(40.0),
//!                       ValueRef::constant(0.0)])
//!         .state_utilities([ValueRef::constant(0.57), ValueRef::constant(0.81),
//!                           ValueRef::constant(0.0)]))
//!     .build();
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod aggregate;
pub mod budget;
pub mod decision;
pub mod error;
pub mod sampler;
pub mod simulation;
pub mod tables;
pub mod voi;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use config::{ModelBuilder, ModelRegistry, RunConfig, StrategyBuilder, WtpGrid, WtpGridSpec};
pub use error::{EngineError, Result};
pub use simulation::{RunProgress, run_deterministic, run_psa};
