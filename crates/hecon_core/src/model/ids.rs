//! Unique identifiers for model entities
//!
//! Each entity type has its own ID type to provide type safety and prevent
//! mixing up different kinds of identifiers.

use serde::{Deserialize, Serialize};

/// Unique identifier for a treatment strategy within a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StrategyId(pub u16);

/// Unique identifier for an uncertain parameter within a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParameterId(pub u16);

impl ParameterId {
    /// Index into the registry-ordered value vector
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl StrategyId {
    /// Index into registry-ordered per-strategy collections
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
