use std::{cell::RefCell, num::NonZeroUsize, rc::Rc};

use itertools::{Either, Itertools};
use lru::LruCache;
use once_cell::unsync::OnceCell;
use plankit_model::{settings::PLANKIT_GROUNDING_CACHE, walkers::*, *};
use tracing::{Level, debug, trace, warn};

use crate::{
    ActionInstance, InapplicabilityReason, Invariants, SimulatorError, effects::EffectResolver,
    invariants::OverlayState,
};

type GroundingKey = (ActionId, Vec<ExprId>);

/// Failed conditions of an action together with the reason why it is not applicable, if any.
pub type UnsatisfiedConditions = (Vec<ExprId>, Option<InapplicabilityReason>);

/// Computes the successors of states by applying ground actions one at a time.
///
/// The simulator does not hold any state: each operation receives the state it operates on and
/// returns a new one. Groundings of actions are cached.
pub struct SequentialSimulator<'pb> {
    problem: &'pb Problem,
    invariants: Invariants,
    grounder: RefCell<Grounder<'pb>>,
    groundings: RefCell<LruCache<GroundingKey, Rc<GroundingOutcome>>>,
    initial_state: OnceCell<SequentialState>,
}

impl<'pb> SequentialSimulator<'pb> {
    /// Creates a simulator for the problem.
    ///
    /// If the problem has features that the simulator does not support, construction fails when
    /// `error_on_failed_checks` is set. Otherwise a warning is emitted.
    pub fn new(problem: &'pb Problem, error_on_failed_checks: bool) -> Result<Self, SimulatorError> {
        let _span = tracing::span!(Level::DEBUG, "simulator", problem = %problem.name()).entered();
        let unsupported = problem.kind().unsupported(&Self::supported_kind());
        if !unsupported.is_empty() {
            let features = unsupported.iter().format(", ").to_string();
            if error_on_failed_checks {
                return Err(SimulatorError::Unsupported(features));
            }
            warn!(%features, "the problem has features unsupported by the simulator");
        }
        let invariants = Invariants::new(problem)?;
        let capacity = NonZeroUsize::new(PLANKIT_GROUNDING_CACHE.get()).unwrap_or(NonZeroUsize::MIN);
        Ok(SequentialSimulator {
            problem,
            invariants,
            grounder: RefCell::new(Grounder::new(problem)),
            groundings: RefCell::new(LruCache::new(capacity)),
            initial_state: OnceCell::new(),
        })
    }

    /// Features of the problems that can be simulated.
    pub fn supported_kind() -> ProblemKind {
        use Feature::*;
        Feature::ALL
            .iter()
            .copied()
            .filter(|f| {
                !matches!(
                    f,
                    TimingExpressions | PresenceExpressions | MultiAgent | TrajectoryConstraints | Makespan
                )
            })
            .collect()
    }

    pub fn supports(kind: &ProblemKind) -> bool {
        kind.is_subset_of(&Self::supported_kind())
    }

    pub fn problem(&self) -> &'pb Problem {
        self.problem
    }

    pub fn invariants(&self) -> &Invariants {
        &self.invariants
    }

    /// The initial state of the problem.
    ///
    /// Fails if the initial state violates a state invariant.
    pub fn get_initial_state(&self) -> Result<SequentialState, SimulatorError> {
        let state = self.initial_state.get_or_try_init(|| {
            let env = self.problem.env();
            let values = self.problem.initial_values()?;
            let state = SequentialState::new(env, values.iter().map(|(&k, &v)| (k, v)));
            let violated = self.invariants.violated(env, &state, None, false)?;
            if !violated.is_empty() {
                return Err(SimulatorError::ProblemDefinition(format!(
                    "the initial state violates the invariants {}",
                    violated.iter().map(|&i| env / i).format(", ")
                )));
            }
            debug!(num_values = state.len(), "initial state");
            Ok(state)
        })?;
        Ok(state.clone())
    }

    fn check_state(&self, state: &dyn State) -> Result<(), SimulatorError> {
        if state.env_id() != self.problem.env().id() {
            Err(UsageError::ForeignState.into())
        } else {
            Ok(())
        }
    }

    fn ground(&self, action: ActionId, params: &[ExprId]) -> Result<Rc<GroundingOutcome>, SimulatorError> {
        let key = (action, params.to_vec());
        if let Some(outcome) = self.groundings.borrow_mut().get(&key) {
            return Ok(outcome.clone());
        }
        let outcome = Rc::new(self.grounder.borrow_mut().ground(action, params)?);
        self.groundings.borrow_mut().put(key, outcome.clone());
        Ok(outcome)
    }

    fn name(&self, action: ActionId) -> String {
        self.problem.action(action).name.to_string()
    }

    /// True if all preconditions of the action hold in the state.
    pub fn is_applicable(
        &self,
        state: &dyn State,
        action: ActionId,
        params: &[ExprId],
    ) -> Result<bool, SimulatorError> {
        let (_, reason) = self.get_unsatisfied_conditions(state, action, params, true, false)?;
        Ok(reason.is_none())
    }

    /// Conditions that prevent applying the action in the state.
    ///
    /// With `early_termination`, at most one failed condition is reported. With `full_check`,
    /// the effects are also resolved (without building the next state) to detect conflicting
    /// effects and violated state invariants.
    pub fn get_unsatisfied_conditions(
        &self,
        state: &dyn State,
        action: ActionId,
        params: &[ExprId],
        early_termination: bool,
        full_check: bool,
    ) -> Result<UnsatisfiedConditions, SimulatorError> {
        self.check_state(state)?;
        let env = self.problem.env();
        let ground = match self.ground(action, params)?.as_ref() {
            GroundingOutcome::Vacuous { violated } => {
                return Ok((vec![*violated], Some(InapplicabilityReason::ViolatesConditions)));
            }
            GroundingOutcome::Grounded(ground) => ground.clone(),
        };

        let mut eval = StateEvaluator::new(state);
        let mut unsatisfied = Vec::new();
        for &c in &ground.preconditions {
            if !eval.holds(env, c)? {
                unsatisfied.push(c);
                if early_termination {
                    break;
                }
            }
        }
        if !unsatisfied.is_empty() {
            return Ok((unsatisfied, Some(InapplicabilityReason::ViolatesConditions)));
        }
        if full_check {
            let updates = match EffectResolver::new(self.problem, state).resolve(&ground) {
                Ok(updates) => updates,
                Err(SimulatorError::ConflictingEffects { .. }) => {
                    return Ok((Vec::new(), Some(InapplicabilityReason::ConflictingEffects)));
                }
                Err(e) => return Err(e),
            };
            let modified = modified_fluents(env, updates.keys().copied());
            let overlay = OverlayState { base: state, updates: &updates };
            let violated = self
                .invariants
                .violated(env, &overlay, Some(&modified), early_termination)?;
            if !violated.is_empty() {
                return Ok((violated, Some(InapplicabilityReason::ViolatesStateInvariants)));
            }
        }
        Ok((Vec::new(), None))
    }

    /// Applies the action, returning `None` if it is not applicable, has conflicting effects or
    /// leads to a state violating an invariant.
    pub fn apply(
        &self,
        state: &SequentialState,
        action: ActionId,
        params: &[ExprId],
    ) -> Result<Option<SequentialState>, SimulatorError> {
        let (unsatisfied, reason) = self.get_unsatisfied_conditions(state, action, params, true, true)?;
        if let Some(reason) = reason {
            debug!(action = %self.name(action), %reason, num_unsatisfied = unsatisfied.len(), "not applicable");
            return Ok(None);
        }
        match self.apply_unsafe(state, action, params) {
            Ok(next) => Ok(Some(next)),
            Err(e) if e.is_inapplicability() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Applies the action without checking its preconditions.
    ///
    /// Fails on conflicting effects and if the resulting state violates an invariant.
    pub fn apply_unsafe(
        &self,
        state: &SequentialState,
        action: ActionId,
        params: &[ExprId],
    ) -> Result<SequentialState, SimulatorError> {
        self.check_state(state)?;
        let env = self.problem.env();
        let ground = match self.ground(action, params)?.as_ref() {
            GroundingOutcome::Grounded(ground) => ground.clone(),
            GroundingOutcome::Vacuous { .. } => {
                return Err(SimulatorError::InvalidAction {
                    action: self.name(action),
                    reason: InapplicabilityReason::ViolatesConditions,
                });
            }
        };
        let updates = EffectResolver::new(self.problem, state).resolve(&ground)?;
        trace!(action = %self.name(action), num_updates = updates.len(), "applying");
        let next = state.make_child(updates);
        let violated = self.invariants.violated(env, &next, None, true)?;
        if !violated.is_empty() {
            return Err(SimulatorError::InvalidAction {
                action: self.name(action),
                reason: InapplicabilityReason::ViolatesStateInvariants,
            });
        }
        Ok(next)
    }

    /// Lazily enumerates the ground actions applicable in the state.
    pub fn get_applicable_actions<'a>(
        &'a self,
        state: &'a SequentialState,
    ) -> impl Iterator<Item = Result<ActionInstance, SimulatorError>> + 'a {
        let env = self.problem.env();
        self.problem
            .actions()
            .iter()
            .flat_map(move |(id, action)| {
                let expander = action
                    .parameters
                    .iter()
                    .map(|p| domain_of(env, p.tpe()))
                    .collect::<Result<Vec<_>, _>>()
                    .and_then(|domains| {
                        let expander = DomainExpander::new(domains);
                        expander.check_size(|| action.name.to_string())?;
                        Ok(expander)
                    });
                match expander {
                    Ok(expander) => Either::Left(expander.map(move |params| Ok(ActionInstance::new(id, params)))),
                    Err(e) => Either::Right(std::iter::once(Err(SimulatorError::from(e)))),
                }
            })
            .filter_map(move |candidate| match candidate {
                Ok(instance) => match self.is_applicable(state, instance.action, &instance.parameters) {
                    Ok(true) => Some(Ok(instance)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                },
                Err(e) => Some(Err(e)),
            })
    }

    /// Goals that do not hold in the state.
    pub fn get_unsatisfied_goals(
        &self,
        state: &dyn State,
        early_termination: bool,
    ) -> Result<Vec<ExprId>, SimulatorError> {
        self.check_state(state)?;
        let env = self.problem.env();
        let mut eval = StateEvaluator::new(state);
        let mut unsatisfied = Vec::new();
        for &g in self.problem.goals() {
            if !eval.holds(env, g)? {
                unsatisfied.push(g);
                if early_termination {
                    break;
                }
            }
        }
        Ok(unsatisfied)
    }

    pub fn is_goal(&self, state: &dyn State) -> Result<bool, SimulatorError> {
        Ok(self.get_unsatisfied_goals(state, true)?.is_empty())
    }
}

fn modified_fluents(env: &Environment, updated: impl Iterator<Item = ExprId>) -> hashbrown::HashSet<FluentId> {
    updated
        .filter_map(|e| match env.node(e).expr() {
            Expr::Fluent(f, _) => Some(*f),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counters {
        problem: Problem,
        f: ExprId,
        flag: ExprId,
        actions: Vec<ActionId>,
    }

    /// A problem whose actions each exercise one rule of effect resolution.
    fn counters() -> anyhow::Result<Counters> {
        let mut pb = ProblemBuilder::new("counters");
        let f = pb.add_fluent("f", vec![], Type::int(0, 30)?, Some(pb.env().int(10)))?;
        let flag = pb.add_fluent("flag", vec![], Type::Bool, Some(pb.env().bool(true)))?;
        let env = pb.env();
        let (f, flag) = (env.fluent(f, [])?, env.fluent(flag, [])?);
        let (t, fl) = (env.bool(true), env.bool(false));

        let mut actions = Vec::new();
        let mut conflicting = Action::new("conflicting", vec![]);
        conflicting.add_effect(env, Effect::assign(f, env.int(1)))?;
        conflicting.add_effect(env, Effect::assign(f, env.int(2)))?;
        actions.push(conflicting);

        let mut add_after_delete = Action::new("add_after_delete", vec![]);
        add_after_delete.add_effect(env, Effect::assign(flag, fl))?;
        add_after_delete.add_effect(env, Effect::assign(flag, t))?;
        actions.push(add_after_delete);

        let mut delete_after_add = Action::new("delete_after_add", vec![]);
        delete_after_add.add_effect(env, Effect::assign(flag, t))?;
        delete_after_add.add_effect(env, Effect::assign(flag, fl))?;
        actions.push(delete_after_add);

        let mut increases = Action::new("increases", vec![]);
        increases.add_effect(env, Effect::increase(f, env.int(3)))?;
        increases.add_effect(env, Effect::increase(f, env.int(4)))?;
        increases.add_effect(env, Effect::decrease(f, env.int(1)))?;
        actions.push(increases);

        let mut assign_and_increase = Action::new("assign_and_increase", vec![]);
        assign_and_increase.add_effect(env, Effect::assign(f, env.int(3)))?;
        assign_and_increase.add_effect(env, Effect::increase(f, env.int(1)))?;
        actions.push(assign_and_increase);

        let mut overflow = Action::new("overflow", vec![]);
        overflow.add_effect(env, Effect::increase(f, env.int(25)))?;
        actions.push(overflow);

        let mut guarded = Action::new("guarded", vec![]);
        guarded.add_precondition(env, env.not(flag)?)?;
        actions.push(guarded);

        let actions = actions
            .into_iter()
            .map(|a| pb.add_action(a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Counters {
            problem: pb.build()?,
            f,
            flag,
            actions,
        })
    }

    #[test]
    fn conflicting_assignments() -> anyhow::Result<()> {
        let Counters { problem, actions, .. } = counters()?;
        let sim = SequentialSimulator::new(&problem, true)?;
        let s0 = sim.get_initial_state()?;
        assert!(matches!(
            sim.apply_unsafe(&s0, actions[0], &[]),
            Err(SimulatorError::ConflictingEffects { .. })
        ));
        assert_eq!(sim.apply(&s0, actions[0], &[])?, None);
        let (_, reason) = sim.get_unsatisfied_conditions(&s0, actions[0], &[], false, true)?;
        assert_eq!(reason, Some(InapplicabilityReason::ConflictingEffects));
        // preconditions alone are satisfied
        assert!(sim.is_applicable(&s0, actions[0], &[])?);
        Ok(())
    }

    #[test]
    fn add_after_delete_is_asymmetric() -> anyhow::Result<()> {
        let Counters {
            problem, flag, actions, ..
        } = counters()?;
        let env = problem.env();
        let sim = SequentialSimulator::new(&problem, true)?;
        let s0 = sim.get_initial_state()?;
        let s1 = sim.apply_unsafe(&s0, actions[1], &[])?;
        assert_eq!(s1.get_value(flag), Some(env.bool(true)));
        // true then false is not resolved
        assert!(matches!(
            sim.apply_unsafe(&s0, actions[2], &[]),
            Err(SimulatorError::ConflictingEffects { .. })
        ));
        Ok(())
    }

    #[test]
    fn numeric_effects_compose() -> anyhow::Result<()> {
        let Counters {
            problem, f, actions, ..
        } = counters()?;
        let env = problem.env();
        let sim = SequentialSimulator::new(&problem, true)?;
        let s0 = sim.get_initial_state()?;
        let s1 = sim.apply_unsafe(&s0, actions[3], &[])?;
        assert_eq!(s1.get_value(f), Some(env.int(16)));
        assert_eq!(s0.get_value(f), Some(env.int(10)));
        assert!(matches!(
            sim.apply_unsafe(&s0, actions[4], &[]),
            Err(SimulatorError::ConflictingEffects { .. })
        ));
        Ok(())
    }

    #[test]
    fn bounds_are_enforced() -> anyhow::Result<()> {
        let Counters {
            problem, f, actions, ..
        } = counters()?;
        let env = problem.env();
        let sim = SequentialSimulator::new(&problem, true)?;
        let s0 = sim.get_initial_state()?;
        assert_eq!(sim.apply(&s0, actions[5], &[])?, None);
        let (violated, reason) = sim.get_unsatisfied_conditions(&s0, actions[5], &[], false, true)?;
        assert_eq!(reason, Some(InapplicabilityReason::ViolatesStateInvariants));
        assert_eq!(violated.len(), 1);
        assert!(matches!(
            sim.apply_unsafe(&s0, actions[5], &[]),
            Err(SimulatorError::InvalidAction {
                reason: InapplicabilityReason::ViolatesStateInvariants,
                ..
            })
        ));
        // the initial state is untouched
        assert_eq!(sim.get_initial_state()?.get_value(f), Some(env.int(10)));
        Ok(())
    }

    #[test]
    fn preconditions_and_applicable_actions() -> anyhow::Result<()> {
        let Counters { problem, actions, .. } = counters()?;
        let sim = SequentialSimulator::new(&problem, true)?;
        let s0 = sim.get_initial_state()?;
        let (unsatisfied, reason) = sim.get_unsatisfied_conditions(&s0, actions[6], &[], false, false)?;
        assert_eq!(reason, Some(InapplicabilityReason::ViolatesConditions));
        assert_eq!(unsatisfied.len(), 1);
        assert_eq!(sim.apply(&s0, actions[6], &[])?, None);

        let applicable: Vec<ActionId> = sim
            .get_applicable_actions(&s0)
            .map_ok(|a| a.action)
            .collect::<Result<_, _>>()?;
        // all but the guarded action have satisfied preconditions
        assert_eq!(applicable, actions[..6].to_vec());
        Ok(())
    }

    #[test]
    fn foreign_states_are_rejected() -> anyhow::Result<()> {
        let Counters { problem, actions, .. } = counters()?;
        let other = counters()?;
        let sim = SequentialSimulator::new(&problem, true)?;
        let foreign = SequentialSimulator::new(&other.problem, true)?.get_initial_state()?;
        assert_eq!(
            sim.apply(&foreign, actions[3], &[]),
            Err(SimulatorError::Usage(UsageError::ForeignState))
        );
        assert!(matches!(
            sim.is_goal(&foreign),
            Err(SimulatorError::Usage(UsageError::ForeignState))
        ));
        Ok(())
    }

    #[test]
    fn unsupported_features() -> anyhow::Result<()> {
        let mut pb = ProblemBuilder::new("unsupported");
        let f = pb.add_fluent("f", vec![], Type::Bool, Some(pb.env().bool(false)))?;
        let f = pb.env().fluent(f, [])?;
        pb.add_trajectory_constraint(pb.env().sometime(f)?)?;
        pb.add_goal(f)?;
        let problem = pb.build()?;
        assert!(!SequentialSimulator::supports(problem.kind()));
        assert!(matches!(
            SequentialSimulator::new(&problem, true),
            Err(SimulatorError::Unsupported(_))
        ));
        let sim = SequentialSimulator::new(&problem, false)?;
        assert!(!sim.is_goal(&sim.get_initial_state()?)?);
        Ok(())
    }

    #[test]
    fn forall_delete_then_add() -> anyhow::Result<()> {
        let mut pb = ProblemBuilder::new("teleport");
        let loc = pb.add_type("location", None)?;
        let objects = ["l1", "l2", "l3"]
            .into_iter()
            .map(|l| pb.add_object(l, loc))
            .collect::<Result<Vec<_>, _>>()?;
        let l = Param::new("l", Type::User(loc));
        let at = pb.add_fluent("at", vec![l], Type::Bool, Some(pb.env().bool(false)))?;
        let env = pb.env();
        let (to, v) = (Param::new("to", Type::User(loc)), Param::new("v", Type::User(loc)));
        let mut teleport = Action::new("teleport", vec![to.clone()]);
        let leave = Effect::assign(env.fluent(at, [env.var(&v)])?, env.bool(false)).with_forall(vec![v]);
        teleport.add_effect(env, leave)?;
        teleport.add_effect(env, Effect::assign(env.fluent(at, [env.param(&to)])?, env.bool(true)))?;
        let teleport = pb.add_action(teleport)?;
        let at_l1 = pb.env().fluent(at, [pb.env().object(objects[0])])?;
        pb.set_initial_value(at_l1, pb.env().bool(true))?;
        let problem = pb.build()?;
        let env = problem.env();
        assert!(problem.kind().has(Feature::ForallEffects));

        let sim = SequentialSimulator::new(&problem, true)?;
        let s0 = sim.get_initial_state()?;
        let s1 = sim
            .apply(&s0, teleport, &[env.object(objects[1])])?
            .ok_or_else(|| anyhow::anyhow!("teleport is applicable"))?;
        let at_values = objects
            .iter()
            .map(|&o| s1.get_value(env.fluent(at, [env.object(o)])?).ok_or_else(|| anyhow::anyhow!("no value")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        assert_eq!(at_values, vec![env.bool(false), env.bool(true), env.bool(false)]);
        Ok(())
    }

    #[test]
    fn simulated_effects_come_first() -> anyhow::Result<()> {
        let mut pb = ProblemBuilder::new("simulated");
        let n = pb.add_fluent("n", vec![], Type::INT, Some(pb.env().int(0)))?;
        let env = pb.env();
        let n = env.fluent(n, [])?;
        let seven = |pb: &Problem, _: &dyn State, _: &[ExprId]| -> Result<Vec<ExprId>, EvalError> {
            Ok(vec![pb.env().int(7)])
        };

        let mut set = Action::new("set", vec![]);
        set.set_simulated_effect(env, SimulatedEffect::new(vec![n], seven))?;
        let mut set_and_increase = Action::new("set_and_increase", vec![]);
        set_and_increase.set_simulated_effect(env, SimulatedEffect::new(vec![n], seven))?;
        set_and_increase.add_effect(env, Effect::increase(n, env.int(1)))?;
        let mut too_few = Action::new("too_few", vec![]);
        too_few.set_simulated_effect(env, SimulatedEffect::new(vec![n], |_, _, _| Ok(Vec::new())))?;
        let set = pb.add_action(set)?;
        let set_and_increase = pb.add_action(set_and_increase)?;
        let too_few = pb.add_action(too_few)?;
        let problem = pb.build()?;
        let env = problem.env();
        assert!(problem.kind().has(Feature::SimulatedEffects));
        assert!(problem.static_fluents().is_empty());

        let sim = SequentialSimulator::new(&problem, true)?;
        let s0 = sim.get_initial_state()?;
        assert_eq!(sim.apply_unsafe(&s0, set, &[])?.get_value(n), Some(env.int(7)));
        assert!(matches!(
            sim.apply_unsafe(&s0, set_and_increase, &[]),
            Err(SimulatorError::ConflictingEffects { .. })
        ));
        assert_eq!(sim.apply(&s0, set_and_increase, &[])?, None);
        assert!(matches!(
            sim.apply_unsafe(&s0, too_few, &[]),
            Err(SimulatorError::ProblemDefinition(_))
        ));
        Ok(())
    }

    #[test]
    fn initial_state_must_satisfy_invariants() -> anyhow::Result<()> {
        let mut pb = ProblemBuilder::new("broken");
        let x = pb.add_fluent("x", vec![], Type::int(0, 10)?, Some(pb.env().int(8)))?;
        let x = pb.env().fluent(x, [])?;
        pb.add_trajectory_constraint(pb.env().always(pb.env().le(x, pb.env().int(5))?)?)?;
        let problem = pb.build()?;
        let sim = SequentialSimulator::new(&problem, true)?;
        assert!(matches!(
            sim.get_initial_state(),
            Err(SimulatorError::ProblemDefinition(_))
        ));
        Ok(())
    }
}
