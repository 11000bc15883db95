use thiserror::Error;

use crate::*;

/// Failure of a walker while traversing an expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("operator `{0}` is not supported here")]
    UnsupportedOperator(OperatorKind),
    #[error("no value for `{0}` in the state")]
    MissingValue(String),
    #[error("action parameter `{0}` is not bound")]
    UnboundParameter(Sym),
    #[error("variable `{0}` is not bound by any quantifier")]
    FreeVariable(Sym),
    #[error("division by zero in `{0}`")]
    DivisionByZero(String),
    #[error("grounding `{expr}` requires {size} instances, above the limit of {limit}")]
    GroundingTooLarge { expr: String, size: u128, limit: usize },
    #[error("type `{0}` does not have a finite domain")]
    InfiniteDomain(String),
    #[error("`{0}` was expected to be a constant")]
    NotAConstant(String),
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl EvalError {
    pub(crate) fn missing(env: &Environment, e: ExprId) -> Self {
        EvalError::MissingValue((env / e).to_string())
    }

    pub(crate) fn not_constant(env: &Environment, e: ExprId) -> Self {
        EvalError::NotAConstant((env / e).to_string())
    }
}

/// Misuse of the API by the caller, independent of the content of the problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("action `{action}` expects {expected} parameters but {found} were given")]
    ParameterCountMismatch { action: Sym, expected: usize, found: usize },
    #[error("invalid value `{value}` for parameter `{param}` of action `{action}`")]
    InvalidParameterValue { action: Sym, param: Sym, value: String },
    #[error("the state was not created from this problem")]
    ForeignState,
    #[error("unknown action `{0}`")]
    UnknownAction(Sym),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroundingError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl From<TypeError> for GroundingError {
    fn from(value: TypeError) -> Self {
        GroundingError::Eval(value.into())
    }
}

/// Error raised while building a problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProblemError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Fluent(#[from] FluentError),
    #[error(transparent)]
    Actions(#[from] ActionsError),
    #[error("`{0}` is not a fluent expression")]
    NotAFluent(String),
    #[error("`{0}` is not a fluent applied to constant arguments")]
    NotAGroundFluent(String),
    #[error("`{0}` is not a constant")]
    NotAConstant(String),
    #[error("`{0}` is not a trajectory constraint")]
    NotATrajectoryConstraint(String),
    #[error("no initial value for `{0}` and its fluent has no default")]
    MissingInitialValue(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
}
