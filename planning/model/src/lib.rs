//! Modeling core for planning problems.
//!
//! Expressions are stored in a hash-consed DAG owned by an [Environment]. Problems are built with a
//! [ProblemBuilder] and manipulated through [walkers] (simplification, substitution, quantifier
//! removal, evaluation) and the [Grounder].

mod actions;
mod effects;
mod env;
pub mod errors;
mod expressions;
mod fluents;
mod grounding;
mod kind;
mod metrics;
mod objects;
mod params;
mod problem;
pub mod settings;
mod state;
mod sym;
mod timing;
mod types;
pub mod walkers;

use std::fmt::{Debug, Display};

pub use actions::*;
pub use effects::*;
pub use env::*;
pub use errors::*;
pub use expressions::*;
pub use fluents::*;
pub use grounding::*;
pub use kind::*;
pub use metrics::*;
pub use objects::*;
pub use params::*;
pub use problem::*;
pub use state::*;
pub use sym::*;
pub use timing::*;
pub use types::*;
