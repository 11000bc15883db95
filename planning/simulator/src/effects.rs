use plankit_model::{walkers::*, *};
use tracing::trace;

use crate::SimulatorError;

/// How the value of a fluent was obtained while applying a single action.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Origin {
    /// Assigned by a simulated effect or an assignment.
    Assigned,
    /// Result of increase/decrease effects.
    Updated,
}

/// Accumulates the effects of a ground action applied in a state.
///
/// Effects are processed in order: the simulated effect first, then the declared effects in their
/// declaration order. Two assignments of different values to the same fluent conflict, unless the
/// fluent is boolean and the first value is `false` (the later `true` wins). A fluent that is both
/// assigned and increased/decreased always conflicts. Successive increases and decreases compose.
pub(crate) struct EffectResolver<'a> {
    problem: &'a Problem,
    state: &'a dyn State,
    eval: StateEvaluator<'a>,
    updates: hashbrown::HashMap<ExprId, (ExprId, Origin)>,
}

impl<'a> EffectResolver<'a> {
    pub fn new(problem: &'a Problem, state: &'a dyn State) -> Self {
        EffectResolver {
            problem,
            state,
            eval: StateEvaluator::new(state),
            updates: Default::default(),
        }
    }

    /// Resolves all effects of the action, returning the new value of each modified fluent.
    pub fn resolve(mut self, action: &GroundAction) -> Result<hashbrown::HashMap<ExprId, ExprId>, SimulatorError> {
        let problem = self.problem;
        let env = problem.env();
        let name = &problem.action(action.action).name;
        if let Some(sim) = &action.simulated_effect {
            let values = (sim.function)(problem, self.state, &action.parameters)?;
            if values.len() != sim.fluents.len() {
                return Err(SimulatorError::ProblemDefinition(format!(
                    "simulated effect of `{name}` returned {} values for {} fluents",
                    values.len(),
                    sim.fluents.len()
                )));
            }
            for (&fluent, value) in sim.fluents.iter().zip(values) {
                let target = self.target(fluent)?;
                if !env.is_constant(value) {
                    return Err(EvalError::NotAConstant((env / value).to_string()).into());
                }
                env.tpe(target).accepts(value, env)?;
                self.assign(name, target, value)?;
            }
        }
        for eff in &action.effects {
            if eff.is_forall() {
                let keys: Vec<ExprId> = eff.forall.iter().map(|v| env.var(v)).collect();
                for values in DomainExpander::for_variables(env, &eff.forall, eff.fluent)? {
                    let map: Substitution = keys.iter().copied().zip(values).collect();
                    let mut substituter = Substituter::new(env, map)?;
                    let instance = Effect {
                        fluent: substituter.substitute(env, eff.fluent)?,
                        value: substituter.substitute(env, eff.value)?,
                        kind: eff.kind,
                        condition: eff.condition.map(|c| substituter.substitute(env, c)).transpose()?,
                        forall: Vec::new(),
                    };
                    self.apply_effect(name, &instance)?;
                }
            } else {
                self.apply_effect(name, eff)?;
            }
        }
        Ok(self.updates.into_iter().map(|(k, (v, _))| (k, v)).collect())
    }

    /// The ground fluent targeted by an effect, whose arguments may need to be evaluated.
    fn target(&mut self, fluent: ExprId) -> Result<ExprId, SimulatorError> {
        let problem = self.problem;
        let env = problem.env();
        match env.node(fluent).expr() {
            Expr::Fluent(f, args) => {
                let args = args
                    .iter()
                    .map(|&a| self.eval.evaluate(env, a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(env.fluent(*f, args)?)
            }
            _ => Err(ProblemError::NotAFluent((env / fluent).to_string()).into()),
        }
    }

    fn apply_effect(&mut self, action: &Sym, eff: &Effect) -> Result<(), SimulatorError> {
        let problem = self.problem;
        let env = problem.env();
        if let Some(c) = eff.condition {
            if !self.eval.holds(env, c)? {
                return Ok(());
            }
        }
        let target = self.target(eff.fluent)?;
        let value = self.eval.evaluate(env, eff.value)?;
        match eff.kind {
            EffectKind::Assign => self.assign(action, target, value),
            EffectKind::Increase | EffectKind::Decrease => {
                let current = match self.updates.get(&target) {
                    Some(&(previous, Origin::Assigned)) => {
                        return Err(self.conflict(action, target, previous, value));
                    }
                    Some(&(running, Origin::Updated)) => running,
                    None => self
                        .state
                        .get_value(target)
                        .ok_or_else(|| EvalError::MissingValue((env / target).to_string()))?,
                };
                let (Some(current), Some(delta)) = (env.numeric_value(current), env.numeric_value(value)) else {
                    return Err(EvalError::NotAConstant((env / value).to_string()).into());
                };
                let next = if eff.kind == EffectKind::Increase {
                    &current + &delta
                } else {
                    &current - &delta
                };
                let next = env.number(next);
                trace!(fluent = %(env / target), value = %(env / next), "numeric update");
                self.updates.insert(target, (next, Origin::Updated));
                Ok(())
            }
        }
    }

    fn assign(&mut self, action: &Sym, target: ExprId, value: ExprId) -> Result<(), SimulatorError> {
        let problem = self.problem;
        let env = problem.env();
        match self.updates.get(&target) {
            None => {
                self.updates.insert(target, (value, Origin::Assigned));
                Ok(())
            }
            Some(&(previous, Origin::Assigned)) => {
                if same_value(env, previous, value) {
                    Ok(())
                } else if env.bool_value(previous) == Some(false) {
                    // add after delete: the later assignment wins
                    self.updates.insert(target, (value, Origin::Assigned));
                    Ok(())
                } else {
                    Err(self.conflict(action, target, previous, value))
                }
            }
            Some(&(previous, Origin::Updated)) => Err(self.conflict(action, target, previous, value)),
        }
    }

    fn conflict(&self, action: &Sym, fluent: ExprId, first: ExprId, second: ExprId) -> SimulatorError {
        let env = self.problem.env();
        SimulatorError::ConflictingEffects {
            action: action.to_string(),
            fluent: (env / fluent).to_string(),
            first: (env / first).to_string(),
            second: (env / second).to_string(),
        }
    }
}

fn same_value(env: &Environment, a: ExprId, b: ExprId) -> bool {
    a == b
        || matches!(
            (env.numeric_value(a), env.numeric_value(b)),
            (Some(x), Some(y)) if x == y
        )
}
