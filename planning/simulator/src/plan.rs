use itertools::Itertools;
use plankit_model::*;

use crate::SimulatorError;

/// An action together with the values of its parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActionInstance {
    pub action: ActionId,
    pub parameters: Vec<ExprId>,
}

impl ActionInstance {
    pub fn new(action: ActionId, parameters: Vec<ExprId>) -> Self {
        ActionInstance { action, parameters }
    }

    /// Builds an instance from the name of the action and the textual values of its parameters.
    ///
    /// A value is the name of an object, `true`, `false` or an integer.
    pub fn from_names(problem: &Problem, action: &str, parameters: &[&str]) -> Result<Self, SimulatorError> {
        let env = problem.env();
        let id = problem
            .actions()
            .get(action)
            .map_err(|_| UsageError::UnknownAction(Sym::from(action)))?;
        let act = problem.action(id);
        let values = parameters
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                if let Ok(o) = env.objects.get(value) {
                    Ok(env.object(o))
                } else if let Ok(b) = value.parse::<bool>() {
                    Ok(env.bool(b))
                } else if let Ok(n) = value.parse::<IntValue>() {
                    Ok(env.int(n))
                } else {
                    Err(UsageError::InvalidParameterValue {
                        action: act.name.clone(),
                        param: act
                            .parameters
                            .get(i)
                            .map(|p| p.name().clone())
                            .unwrap_or_else(|| Sym::from(format!("#{i}"))),
                        value: value.to_string(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ActionInstance::new(id, values))
    }

    /// Human-readable form of the instance, e.g. `move(l1, l2)`.
    pub fn format(&self, problem: &Problem) -> String {
        let env = problem.env();
        let name = &problem.action(self.action).name;
        if self.parameters.is_empty() {
            name.to_string()
        } else {
            format!("{name}({})", self.parameters.iter().map(|&p| env / p).format(", "))
        }
    }
}

/// A sequence of action instances, applied one after the other from the initial state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequentialPlan {
    actions: Vec<ActionInstance>,
}

impl SequentialPlan {
    pub fn new(actions: Vec<ActionInstance>) -> Self {
        SequentialPlan { actions }
    }

    pub fn push(&mut self, action: ActionInstance) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[ActionInstance] {
        &self.actions
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionInstance> + '_ {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// One action per line.
    pub fn format(&self, problem: &Problem) -> String {
        self.actions.iter().map(|a| a.format(problem)).join("\n")
    }
}

impl FromIterator<ActionInstance> for SequentialPlan {
    fn from_iter<T: IntoIterator<Item = ActionInstance>>(iter: T) -> Self {
        SequentialPlan::new(iter.into_iter().collect())
    }
}
