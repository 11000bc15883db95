//! Sequential simulation of planning problems built with [plankit_model].
//!
//! The [SequentialSimulator] computes the successors of states by applying ground actions,
//! detecting conflicting effects and enforcing state invariants. Plans can be replayed and
//! checked with [validate_plan].

pub mod demos;
mod effects;
mod errors;
mod invariants;
mod metrics;
mod plan;
mod simulator;
mod validate;

pub use errors::*;
pub use invariants::*;
pub use plan::*;
pub use simulator::*;
pub use validate::*;
