use std::fmt;

/// A distribution was declared with parameters outside its domain
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionError {
    pub distribution: &'static str,
    pub reason: &'static str,
}

impl fmt::Display for DistributionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} parameters: {}",
            self.distribution, self.reason
        )
    }
}

impl std::error::Error for DistributionError {}

/// Errors detected while building the model registry or validating run
/// configuration. Always raised before any simulation work starts.
#[derive(Debug, Clone)]
pub enum ValidationError {
    Distribution {
        parameter: String,
        source: DistributionError,
    },
    DuplicateParameter(String),
    DuplicateStrategy(String),
    UnknownParameter {
        reference: String,
        strategy: String,
    },
    UnknownStrategy(String),
    InvalidStateSpace(String),
    ShapeMismatch {
        strategy: String,
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// Configuration error
    Config(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Distribution { parameter, source } => {
                write!(f, "parameter {parameter:?}: {source}")
            }
            ValidationError::DuplicateParameter(name) => {
                write!(f, "parameter {name:?} declared more than once")
            }
            ValidationError::DuplicateStrategy(name) => {
                write!(f, "strategy {name:?} declared more than once")
            }
            ValidationError::UnknownParameter {
                reference,
                strategy,
            } => {
                write!(
                    f,
                    "strategy {strategy:?} references unknown parameter {reference:?}"
                )
            }
            ValidationError::UnknownStrategy(name) => {
                write!(f, "unknown strategy {name:?}")
            }
            ValidationError::InvalidStateSpace(msg) => {
                write!(f, "invalid state space: {msg}")
            }
            ValidationError::ShapeMismatch {
                strategy,
                what,
                expected,
                found,
            } => {
                write!(
                    f,
                    "strategy {strategy:?}: {what} covers {found} states, expected {expected}"
                )
            }
            ValidationError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for ValidationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ValidationError::Distribution { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A constructed transition matrix violates the row-stochastic invariant.
///
/// Raised during matrix construction, before the cycle loop runs.
#[derive(Debug, Clone)]
pub struct InvalidTransitionError {
    pub strategy: String,
    pub cycle: usize,
    pub row: usize,
    pub row_sum: f64,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "strategy {:?}, cycle {}, row {}: {} (row sum {})",
            self.strategy, self.cycle, self.row, self.reason, self.row_sum
        )
    }
}

impl std::error::Error for InvalidTransitionError {}

/// Adoption shares across strategies exceed 1 for a projection year
#[derive(Debug, Clone)]
pub struct AdoptionOverflowError {
    pub year: usize,
    pub total_share: f64,
}

impl fmt::Display for AdoptionOverflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "adoption shares in year {} sum to {:.4}, exceeding 1",
            self.year, self.total_share
        )
    }
}

impl std::error::Error for AdoptionOverflowError {}

/// A checkpoint resume would double-count or misattribute draws
#[derive(Debug, Clone)]
pub enum ResumeConflictError {
    OverlappingIterations { iteration: u64 },
    SeedMismatch { checkpoint: u64, config: u64 },
    HorizonMismatch { checkpoint: usize, config: usize },
}

impl fmt::Display for ResumeConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeConflictError::OverlappingIterations { iteration } => {
                write!(
                    f,
                    "checkpoint contains iteration {iteration} more than once"
                )
            }
            ResumeConflictError::SeedMismatch { checkpoint, config } => {
                write!(
                    f,
                    "checkpoint base seed {checkpoint} does not match configured seed {config}"
                )
            }
            ResumeConflictError::HorizonMismatch { checkpoint, config } => {
                write!(
                    f,
                    "checkpoint horizon {checkpoint} cycles does not match configured {config}"
                )
            }
        }
    }
}

impl std::error::Error for ResumeConflictError {}

/// Top-level engine error
#[derive(Debug, Clone)]
pub enum EngineError {
    Validation(ValidationError),
    Distribution(DistributionError),
    Transition(InvalidTransitionError),
    Adoption(AdoptionOverflowError),
    Resume(ResumeConflictError),
    /// An iteration failed; carries the offending iteration index
    IterationFailed {
        iteration: u64,
        source: Box<EngineError>,
    },
    /// The skip-and-count failure tolerance was exceeded
    TooManyFailures {
        failed: usize,
        total: usize,
        tolerance: f64,
    },
    /// The run was cancelled by user request
    Cancelled,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation(e) => write!(f, "{e}"),
            EngineError::Distribution(e) => write!(f, "{e}"),
            EngineError::Transition(e) => write!(f, "{e}"),
            EngineError::Adoption(e) => write!(f, "{e}"),
            EngineError::Resume(e) => write!(f, "{e}"),
            EngineError::IterationFailed { iteration, source } => {
                write!(f, "iteration {iteration}: {source}")
            }
            EngineError::TooManyFailures {
                failed,
                total,
                tolerance,
            } => {
                write!(
                    f,
                    "{failed} of {total} iterations failed, exceeding tolerance {tolerance}"
                )
            }
            EngineError::Cancelled => write!(f, "run cancelled"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Validation(e) => Some(e),
            EngineError::Distribution(e) => Some(e),
            EngineError::Transition(e) => Some(e),
            EngineError::Adoption(e) => Some(e),
            EngineError::Resume(e) => Some(e),
            EngineError::IterationFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::Validation(e)
    }
}

impl From<DistributionError> for EngineError {
    fn from(e: DistributionError) -> Self {
        EngineError::Distribution(e)
    }
}

impl From<InvalidTransitionError> for EngineError {
    fn from(e: InvalidTransitionError) -> Self {
        EngineError::Transition(e)
    }
}

impl From<AdoptionOverflowError> for EngineError {
    fn from(e: AdoptionOverflowError) -> Self {
        EngineError::Adoption(e)
    }
}

impl From<ResumeConflictError> for EngineError {
    fn from(e: ResumeConflictError) -> Self {
        EngineError::Resume(e)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
