use itertools::Itertools;
use thiserror::Error;

use crate::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionsError {
    #[error("duplicate action `{0}`")]
    DuplicateAction(Sym),
    #[error("unknown action `{0}`")]
    UnknownAction(Sym),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(u32);

/// Actions of a problem, in declaration order.
#[derive(Default, Clone, Debug)]
pub struct Actions {
    actions: Vec<Action>,
    by_name: hashbrown::HashMap<Sym, ActionId>,
}

impl Actions {
    pub fn add(&mut self, action: Action) -> Result<ActionId, ActionsError> {
        if self.by_name.contains_key(&action.name) {
            return Err(ActionsError::DuplicateAction(action.name));
        }
        let id = ActionId(self.actions.len() as u32);
        self.by_name.insert(action.name.clone(), id);
        self.actions.push(action);
        Ok(id)
    }

    pub fn get(&self, name: impl Into<Sym>) -> Result<ActionId, ActionsError> {
        let name = name.into();
        self.by_name.get(&name).copied().ok_or(ActionsError::UnknownAction(name))
    }

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionId, &Action)> + '_ {
        self.actions.iter().enumerate().map(|(i, a)| (ActionId(i as u32), a))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// An instantaneous action. Preconditions are interpreted conjunctively.
#[derive(Debug, Clone)]
pub struct Action {
    pub name: Sym,
    pub parameters: Vec<Param>,
    pub preconditions: Vec<ExprId>,
    pub effects: Vec<Effect>,
    pub simulated_effect: Option<SimulatedEffect>,
}

impl Action {
    pub fn new(name: impl Into<Sym>, parameters: Vec<Param>) -> Self {
        Self {
            name: name.into(),
            parameters,
            preconditions: Default::default(),
            effects: Default::default(),
            simulated_effect: None,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&Param> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    pub fn add_precondition(&mut self, env: &Environment, condition: ExprId) -> Result<(), TypeError> {
        Type::Bool.accepts(condition, env)?;
        self.preconditions.push(condition);
        Ok(())
    }

    pub fn add_effect(&mut self, env: &Environment, effect: Effect) -> Result<(), ProblemError> {
        effect.check(env)?;
        self.effects.push(effect);
        Ok(())
    }

    pub fn set_simulated_effect(&mut self, env: &Environment, effect: SimulatedEffect) -> Result<(), ProblemError> {
        effect.check(env)?;
        self.simulated_effect = Some(effect);
        Ok(())
    }
}

impl Display for Env<'_, &Action> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let a = self.elem;
        write!(
            f,
            "{}({})",
            a.name,
            a.parameters.iter().map(|p| self.env / p).format(", ")
        )?;
        write!(f, "\n    preconditions:")?;
        for &c in &a.preconditions {
            write!(f, "\n      {}", self.env / c)?;
        }
        write!(f, "\n    effects:")?;
        for eff in &a.effects {
            write!(f, "\n      {}", self.env / eff)?;
        }
        if let Some(sim) = &a.simulated_effect {
            write!(f, "\n    simulated: {}", sim.fluents.iter().map(|&e| self.env / e).format(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_by_name() -> anyhow::Result<()> {
        let mut env = Environment::new();
        let loc = env.types.add_type("location", None)?;
        let at = env.fluents.add_fluent("at", vec![Param::new("l", Type::User(loc))], Type::Bool, None)?;
        let to = Param::new("to", Type::User(loc));
        let mut mv = Action::new("move", vec![to.clone()]);
        let at_to = env.fluent(at, [env.param(&to)])?;
        mv.add_precondition(&env, env.not(at_to)?)?;
        assert!(mv.add_precondition(&env, env.int(1)).is_err());
        mv.add_effect(&env, Effect::assign(at_to, env.bool(true)))?;
        assert_eq!(mv.parameter("to"), Some(&to));

        let mut actions = Actions::default();
        let id = actions.add(mv.clone())?;
        assert_eq!(actions.get("move")?, id);
        assert!(matches!(actions.add(mv), Err(ActionsError::DuplicateAction(_))));
        assert!(actions.get("jump").is_err());
        Ok(())
    }
}
