use derive_more::Display;
use plankit_model::*;
use thiserror::Error;

/// Why a ground action cannot be applied in a state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum InapplicabilityReason {
    #[display("violates conditions")]
    ViolatesConditions,
    #[display("conflicting effects")]
    ConflictingEffects,
    #[display("violates state invariants")]
    ViolatesStateInvariants,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulatorError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error("invalid problem: {0}")]
    ProblemDefinition(String),
    #[error("effects of `{action}` assign both `{first}` and `{second}` to `{fluent}`")]
    ConflictingEffects {
        action: String,
        fluent: String,
        first: String,
        second: String,
    },
    #[error("action `{action}` is not applicable: {reason}")]
    InvalidAction {
        action: String,
        reason: InapplicabilityReason,
    },
    #[error("unsupported by the simulator: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl SimulatorError {
    /// True for the failures that only mean that an action does not apply in a given state.
    pub fn is_inapplicability(&self) -> bool {
        matches!(
            self,
            SimulatorError::ConflictingEffects { .. } | SimulatorError::InvalidAction { .. }
        )
    }
}

impl From<GroundingError> for SimulatorError {
    fn from(value: GroundingError) -> Self {
        match value {
            GroundingError::Usage(e) => e.into(),
            GroundingError::Eval(e) => e.into(),
        }
    }
}

impl From<ProblemError> for SimulatorError {
    fn from(value: ProblemError) -> Self {
        SimulatorError::ProblemDefinition(value.to_string())
    }
}

impl From<TypeError> for SimulatorError {
    fn from(value: TypeError) -> Self {
        SimulatorError::Eval(value.into())
    }
}
