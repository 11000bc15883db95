use std::collections::BTreeSet;

use plankit_model::{walkers::*, *};
use tracing::debug;

use crate::SimulatorError;

/// A ground condition that must hold in every state.
#[derive(Clone, Debug)]
pub struct Invariant {
    pub condition: ExprId,
    /// Fluents whose value may change the truth value of the condition.
    watched: BTreeSet<FluentId>,
}

impl Invariant {
    pub fn watches(&self, fluent: FluentId) -> bool {
        self.watched.contains(&fluent)
    }
}

/// State invariants of a problem.
///
/// They are built from the `always` trajectory constraints, whose quantifiers are removed, and from
/// the bounds of the numeric fluents: for each grounding `f(o)` of a fluent with a type `[lb, ub]`,
/// the invariant `lb <= f(o) and f(o) <= ub` is added.
#[derive(Clone, Debug, Default)]
pub struct Invariants {
    invariants: Vec<Invariant>,
}

impl Invariants {
    pub fn new(problem: &Problem) -> Result<Self, SimulatorError> {
        let env = problem.env();
        let mut remover = QuantifierRemover::new();
        let mut simplifier = Simplifier::new(Some(problem));
        let mut extractor = FluentsExtractor::new();
        let mut conditions = Vec::new();

        for &c in problem.trajectory_constraints() {
            match env.node(c).expr() {
                Expr::Always(body) => {
                    let ground = remover.remove_quantifiers(env, *body)?;
                    conditions.push(simplifier.simplify(env, ground)?);
                }
                _ => debug!(constraint = %(env / c), "not a state invariant, ignored"),
            }
        }
        for (fid, fluent) in env.fluents.iter() {
            if !fluent.return_type.is_bounded() {
                continue;
            }
            let domains = fluent
                .parameters
                .iter()
                .map(|p| domain_of(env, p.tpe()))
                .collect::<Result<Vec<_>, _>>();
            let domains = match domains {
                Ok(domains) => domains,
                Err(EvalError::InfiniteDomain(_)) => {
                    debug!(fluent = %fluent.name(), "bounds of the fluent are not enforced");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let expander = DomainExpander::new(domains);
            expander.check_size(|| fluent.name().to_string())?;
            for args in expander {
                let f = env.fluent(fid, args)?;
                conditions.push(bounds(env, &fluent.return_type, f)?);
            }
        }

        let mut invariants = Vec::with_capacity(conditions.len());
        for condition in conditions {
            if env.bool_value(condition) == Some(true) {
                continue;
            }
            let watched = extractor.fluents(env, condition)?.as_ref().clone();
            invariants.push(Invariant { condition, watched });
        }
        debug!(num_invariants = invariants.len(), "collected state invariants");
        Ok(Invariants { invariants })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Invariant> + '_ {
        self.invariants.iter()
    }

    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    /// Invariants that do not evaluate to true in `state`.
    ///
    /// If `modified` is given, only the invariants watching one of these fluents are checked.
    pub fn violated(
        &self,
        env: &Environment,
        state: &dyn State,
        modified: Option<&hashbrown::HashSet<FluentId>>,
        early_termination: bool,
    ) -> Result<Vec<ExprId>, SimulatorError> {
        let mut eval = StateEvaluator::new(state);
        let mut violated = Vec::new();
        for inv in &self.invariants {
            if let Some(modified) = modified {
                if !modified.iter().any(|&f| inv.watches(f)) {
                    continue;
                }
            }
            let value = eval.evaluate(env, inv.condition)?;
            if env.bool_value(value) != Some(true) {
                violated.push(inv.condition);
                if early_termination {
                    break;
                }
            }
        }
        Ok(violated)
    }
}

/// `lb <= f and f <= ub`, omitting missing bounds.
fn bounds(env: &Environment, tpe: &Type, f: ExprId) -> Result<ExprId, TypeError> {
    let (lb, ub) = match tpe {
        Type::Int(itv) => (itv.lb().map(|lb| env.int(lb)), itv.ub().map(|ub| env.int(ub))),
        Type::Real(itv) => (
            itv.lb().map(|lb| env.real(lb.clone())),
            itv.ub().map(|ub| env.real(ub.clone())),
        ),
        _ => (None, None),
    };
    let mut conjuncts = Vec::with_capacity(2);
    if let Some(lb) = lb {
        conjuncts.push(env.le(lb, f)?);
    }
    if let Some(ub) = ub {
        conjuncts.push(env.le(f, ub)?);
    }
    env.conjunction(conjuncts)
}

/// A state seen through a set of pending updates.
pub(crate) struct OverlayState<'a> {
    pub base: &'a dyn State,
    pub updates: &'a hashbrown::HashMap<ExprId, ExprId>,
}

impl State for OverlayState<'_> {
    fn get_value(&self, fluent: ExprId) -> Option<ExprId> {
        self.updates
            .get(&fluent)
            .copied()
            .or_else(|| self.base.get_value(fluent))
    }

    fn env_id(&self) -> EnvId {
        self.base.env_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariants_from_bounds_and_constraints() -> anyhow::Result<()> {
        let mut pb = ProblemBuilder::new("inv");
        let loc = pb.add_type("location", None)?;
        let l1 = pb.add_object("l1", loc)?;
        let l2 = pb.add_object("l2", loc)?;
        let level = pb.add_fluent("level", vec![Param::new("l", Type::User(loc))], Type::int(0, 5)?, None)?;
        pb.add_fluent("unbounded", vec![], Type::INT, None)?;
        let on = pb.add_fluent("on", vec![], Type::Bool, None)?;
        let env = pb.env();
        let on = env.fluent(on, [])?;
        let x = Param::new("x", Type::User(loc));
        let always = env.always(env.forall(vec![x.clone()], env.le(env.fluent(level, [env.var(&x)])?, env.int(4))?)?)?;
        pb.add_trajectory_constraint(always)?;
        let problem = pb.build()?;
        let env = problem.env();

        let invariants = Invariants::new(&problem)?;
        // one for the constraint, one per grounding of `level`
        assert_eq!(invariants.len(), 3);
        let level_id = env.fluents.get("level")?;
        assert!(invariants.iter().all(|i| i.watches(level_id)));

        let (l1, l2) = (env.object(l1), env.object(l2));
        let level_l1 = env.fluent(level_id, [l1])?;
        let level_l2 = env.fluent(level_id, [l2])?;
        let state = SequentialState::new(env, [(level_l1, env.int(3)), (level_l2, env.int(0)), (on, env.bool(true))]);
        assert!(invariants.violated(env, &state, None, false)?.is_empty());

        let updates: hashbrown::HashMap<_, _> = [(level_l2, env.int(5))].into_iter().collect();
        let overlay = OverlayState {
            base: &state,
            updates: &updates,
        };
        // above the bound of the constraint but within the type
        assert_eq!(invariants.violated(env, &overlay, None, false)?.len(), 1);
        let untouched: hashbrown::HashSet<_> = [env.fluents.get("on")?].into_iter().collect();
        assert!(invariants.violated(env, &overlay, Some(&untouched), false)?.is_empty());
        Ok(())
    }

    #[test]
    fn conjunctions_of_constraints_are_split() -> anyhow::Result<()> {
        let mut pb = ProblemBuilder::new("split");
        let x = pb.add_fluent("x", vec![], Type::INT, Some(pb.env().int(0)))?;
        let env = pb.env();
        let x = env.fluent(x, [])?;
        let mut up = Action::new("up", vec![]);
        up.add_effect(env, Effect::increase(x, env.int(10)))?;
        let below = env.always(env.le(x, env.int(5))?)?;
        let above = env.always(env.le(env.int(0), x)?)?;
        let both = env.and([below, above])?;
        let up = pb.add_action(up)?;
        pb.add_trajectory_constraint(both)?;
        let problem = pb.build()?;
        assert_eq!(problem.trajectory_constraints(), &[below, above]);

        let invariants = Invariants::new(&problem)?;
        assert_eq!(invariants.len(), 2);
        let sim = crate::SequentialSimulator::new(&problem, true)?;
        let s0 = sim.get_initial_state()?;
        assert_eq!(sim.apply(&s0, up, &[])?, None);
        let (violated, reason) = sim.get_unsatisfied_conditions(&s0, up, &[], false, true)?;
        assert_eq!(reason, Some(crate::InapplicabilityReason::ViolatesStateInvariants));
        assert_eq!(violated.len(), 1);
        Ok(())
    }
}
