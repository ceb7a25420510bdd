//! Integration tests for the hecon simulation engine
//!
//! Tests are organized by topic:
//! - `sampler` - Parameter sampling, correlation and determinism
//! - `markov` - Cohort recurrence, transition invariants, tunnel states
//! - `aggregate` - Discounting and economic aggregation
//! - `decision` - ICERs, dominance, acceptability curves
//! - `voi` - Value of information
//! - `budget` - Budget-impact projection
//! - `reproducibility` - Seed determinism and checkpoint resume

mod aggregate;
mod decision;
mod reproducibility;
mod sampler;
