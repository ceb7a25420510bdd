mod cohort;
mod distributions;
mod ids;
mod parameters;
mod results;
mod strategy;

pub use cohort::{
    CohortState, CohortTrace, MortalityTable, ROW_SUM_EPSILON, TransitionMatrix, blend_mortality,
};
pub use distributions::Distribution;
pub use ids::{ParameterId, StrategyId};
pub use parameters::{Parameter, ParameterOwner, ParameterRegistry, ParameterSpec};
pub use results::{
    PsaCheckpoint, PsaResult, PsaRun, SimulationDraw, SkippedIteration, StrategyOutcome,
};
pub use strategy::{
    CompiledRelapse, CompiledTransition, CostSpec, OneTimeCost, RelapseProfile, ResolvedValue,
    StateSpace, StrategyArm, StrategyArmSpec, TransitionSpec, UtilitySpec, ValueRef,
};
