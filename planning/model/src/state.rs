use itertools::Itertools;

use crate::{env::Env, *};

/// Read access to the values of ground fluents.
///
/// Keys are ground fluent expressions and values are constants, both interned in the environment
/// identified by [State::env_id].
pub trait State {
    fn get_value(&self, fluent: ExprId) -> Option<ExprId>;

    fn env_id(&self) -> EnvId;
}

/// An immutable state of a sequential simulation.
///
/// Successor states are obtained with [SequentialState::make_child] and share their structure
/// with their parent.
#[derive(Clone, Debug)]
pub struct SequentialState {
    env: EnvId,
    values: im::HashMap<ExprId, ExprId>,
}

impl SequentialState {
    pub fn new(env: &Environment, values: impl IntoIterator<Item = (ExprId, ExprId)>) -> Self {
        SequentialState {
            env: env.id(),
            values: values.into_iter().collect(),
        }
    }

    /// A new state with the same values except for the given updates.
    pub fn make_child(&self, updates: impl IntoIterator<Item = (ExprId, ExprId)>) -> Self {
        let mut values = self.values.clone();
        for (k, v) in updates {
            values.insert(k, v);
        }
        SequentialState { env: self.env, values }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExprId, ExprId)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl State for SequentialState {
    fn get_value(&self, fluent: ExprId) -> Option<ExprId> {
        self.values.get(&fluent).copied()
    }

    fn env_id(&self) -> EnvId {
        self.env
    }
}

impl PartialEq for SequentialState {
    fn eq(&self, other: &Self) -> bool {
        self.env == other.env && self.values == other.values
    }
}

impl Eq for SequentialState {}

impl Display for Env<'_, &SequentialState> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines = self
            .elem
            .iter()
            .map(|(k, v)| format!("{} := {}", self.env / k, self.env / v))
            .sorted();
        write!(f, "{{{}}}", lines.format(", "))
    }
}
