use tracing::trace;

use crate::{settings::PLANKIT_MAX_GROUNDINGS, walkers::*, *};

/// Values that a variable of the given type may take.
///
/// Only user types (their objects, including those of subtypes), booleans and bounded integers
/// have a finite domain.
pub fn domain_of(env: &Environment, tpe: &Type) -> Result<Vec<ExprId>, EvalError> {
    match tpe {
        Type::User(t) => Ok(env.objects.of_type(*t, &env.types).map(|o| env.object(o)).collect()),
        Type::Bool => Ok(vec![env.bool(false), env.bool(true)]),
        Type::Int(itv) => match (itv.lb(), itv.ub()) {
            (Some(lb), Some(ub)) => {
                let size = (ub as i128 - lb as i128 + 1).max(0) as u128;
                let limit = PLANKIT_MAX_GROUNDINGS.get();
                if size > limit as u128 {
                    return Err(EvalError::GroundingTooLarge {
                        expr: (env / tpe).to_string(),
                        size,
                        limit,
                    });
                }
                Ok((lb..=ub).map(|i| env.int(i)).collect())
            }
            _ => Err(EvalError::InfiniteDomain((env / tpe).to_string())),
        },
        Type::Real(_) => Err(EvalError::InfiniteDomain((env / tpe).to_string())),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Progress {
    NotStarted,
    Running,
    Exhausted,
}

/// Iterator over the cartesian product of finite domains, in lexicographic order (the last
/// dimension varies fastest).
///
/// Tuples are produced one at a time without materializing the product. With no dimension, a
/// single empty tuple is produced; if any domain is empty, none is.
#[derive(Clone, Debug)]
pub struct DomainExpander {
    domains: Vec<Vec<ExprId>>,
    indices: Vec<usize>,
    progress: Progress,
}

impl DomainExpander {
    pub fn new(domains: Vec<Vec<ExprId>>) -> Self {
        let indices = vec![0; domains.len()];
        DomainExpander {
            domains,
            indices,
            progress: Progress::NotStarted,
        }
    }

    /// Expander over the domains of the given variables, failing if the number of tuples exceeds
    /// the grounding limit. `source` is only used for reporting.
    pub fn for_variables(env: &Environment, vars: &[Param], source: ExprId) -> Result<Self, EvalError> {
        let domains = vars
            .iter()
            .map(|v| domain_of(env, v.tpe()))
            .collect::<Result<Vec<_>, _>>()?;
        let expander = DomainExpander::new(domains);
        expander.check_size(|| (env / source).to_string())?;
        Ok(expander)
    }

    /// Total number of tuples of the product.
    pub fn size(&self) -> u128 {
        self.domains
            .iter()
            .map(|d| d.len() as u128)
            .try_fold(1u128, |acc, n| acc.checked_mul(n))
            .unwrap_or(u128::MAX)
    }

    pub fn check_size(&self, source: impl FnOnce() -> String) -> Result<(), EvalError> {
        let limit = PLANKIT_MAX_GROUNDINGS.get();
        let size = self.size();
        if size > limit as u128 {
            Err(EvalError::GroundingTooLarge {
                expr: source(),
                size,
                limit,
            })
        } else {
            Ok(())
        }
    }

    /// Resets the iterator to its first tuple.
    pub fn restart(&mut self) {
        self.indices.iter_mut().for_each(|i| *i = 0);
        self.progress = Progress::NotStarted;
    }

    fn current(&self) -> Vec<ExprId> {
        self.indices.iter().zip(&self.domains).map(|(&i, d)| d[i]).collect()
    }

    /// Moves to the next tuple, returning false if there is none.
    fn advance(&mut self) -> bool {
        for dim in (0..self.indices.len()).rev() {
            self.indices[dim] += 1;
            if self.indices[dim] < self.domains[dim].len() {
                return true;
            }
            self.indices[dim] = 0;
        }
        false
    }

    /// Number of tuples not produced yet.
    fn remaining(&self) -> u128 {
        match self.progress {
            Progress::NotStarted => self.size(),
            Progress::Exhausted => 0,
            Progress::Running => {
                // rank of the current tuple in the lexicographic order
                let mut rank = 0u128;
                for (&i, d) in self.indices.iter().zip(&self.domains) {
                    rank = rank.saturating_mul(d.len() as u128).saturating_add(i as u128);
                }
                self.size().saturating_sub(rank + 1)
            }
        }
    }
}

impl Iterator for DomainExpander {
    type Item = Vec<ExprId>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.progress {
            Progress::NotStarted => {
                if self.domains.iter().any(|d| d.is_empty()) {
                    self.progress = Progress::Exhausted;
                    None
                } else {
                    self.progress = Progress::Running;
                    Some(self.current())
                }
            }
            Progress::Running => {
                if self.advance() {
                    Some(self.current())
                } else {
                    self.progress = Progress::Exhausted;
                    None
                }
            }
            Progress::Exhausted => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        match usize::try_from(remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

/// An action whose parameters have been replaced by constants.
///
/// Preconditions and effects are simplified: preconditions that are trivially true and effects
/// whose condition is trivially false are removed. Forall effects keep their variables.
#[derive(Clone, Debug)]
pub struct GroundAction {
    pub action: ActionId,
    pub parameters: Vec<ExprId>,
    pub preconditions: Vec<ExprId>,
    pub effects: Vec<Effect>,
    pub simulated_effect: Option<SimulatedEffect>,
}

#[derive(Clone, Debug)]
pub enum GroundingOutcome {
    Grounded(GroundAction),
    /// A precondition is false regardless of the state.
    Vacuous { violated: ExprId },
}

/// Instantiates the actions of a problem.
pub struct Grounder<'pb> {
    problem: &'pb Problem,
    simplifier: Simplifier<'pb>,
}

impl<'pb> Grounder<'pb> {
    pub fn new(problem: &'pb Problem) -> Self {
        Grounder {
            problem,
            simplifier: Simplifier::new(Some(problem)),
        }
    }

    pub fn problem(&self) -> &'pb Problem {
        self.problem
    }

    fn check_parameters(&self, action: &Action, params: &[ExprId]) -> Result<(), UsageError> {
        let env = self.problem.env();
        if action.parameters.len() != params.len() {
            return Err(UsageError::ParameterCountMismatch {
                action: action.name.clone(),
                expected: action.parameters.len(),
                found: params.len(),
            });
        }
        for (p, &v) in action.parameters.iter().zip(params) {
            let in_bounds = match (p.tpe(), env.node(v).expr()) {
                (Type::Int(itv), Expr::Int(i)) => itv.contains(i),
                (Type::Real(itv), value) => value.numeric_value().is_some_and(|r| itv.contains(&r)),
                _ => true,
            };
            if !env.is_constant(v) || !in_bounds || p.tpe().accepts(v, env).is_err() {
                return Err(UsageError::InvalidParameterValue {
                    action: action.name.clone(),
                    param: p.name().clone(),
                    value: (env / v).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Grounds the action with the given parameter values, reporting statically violated
    /// preconditions.
    pub fn ground(&mut self, action_id: ActionId, params: &[ExprId]) -> Result<GroundingOutcome, GroundingError> {
        let problem = self.problem;
        let env = problem.env();
        let action = problem.actions().action(action_id);
        self.check_parameters(action, params)?;
        let map: Substitution = action
            .parameters
            .iter()
            .map(|p| env.param(p))
            .zip(params.iter().copied())
            .collect();
        let mut substituter = Substituter::new(env, map)?;
        let mut ground = |e: ExprId| -> Result<ExprId, EvalError> {
            let e = substituter.substitute(env, e)?;
            self.simplifier.simplify(env, e)
        };

        let mut preconditions = Vec::with_capacity(action.preconditions.len());
        for &c in &action.preconditions {
            let c = ground(c)?;
            match env.bool_value(c) {
                Some(true) => {}
                Some(false) => {
                    trace!(action = %action.name, "statically inapplicable grounding");
                    return Ok(GroundingOutcome::Vacuous { violated: c });
                }
                None => preconditions.push(c),
            }
        }

        let mut effects = Vec::with_capacity(action.effects.len());
        for eff in &action.effects {
            let condition = match eff.condition {
                Some(c) => {
                    let c = ground(c)?;
                    match env.bool_value(c) {
                        Some(true) => None,
                        Some(false) => continue,
                        None => Some(c),
                    }
                }
                None => None,
            };
            effects.push(Effect {
                fluent: ground(eff.fluent)?,
                value: ground(eff.value)?,
                kind: eff.kind,
                condition,
                forall: eff.forall.clone(),
            });
        }

        let simulated_effect = match &action.simulated_effect {
            Some(sim) => Some(SimulatedEffect {
                fluents: sim
                    .fluents
                    .iter()
                    .map(|&f| ground(f))
                    .collect::<Result<_, _>>()?,
                function: sim.function.clone(),
            }),
            None => None,
        };

        Ok(GroundingOutcome::Grounded(GroundAction {
            action: action_id,
            parameters: params.to_vec(),
            preconditions,
            effects,
            simulated_effect,
        }))
    }

    /// Grounds the action with the given parameter values, returning `None` if the grounding is
    /// statically inapplicable.
    pub fn ground_action(
        &mut self,
        action: ActionId,
        params: &[ExprId],
    ) -> Result<Option<GroundAction>, GroundingError> {
        match self.ground(action, params)? {
            GroundingOutcome::Grounded(ground) => Ok(Some(ground)),
            GroundingOutcome::Vacuous { .. } => Ok(None),
        }
    }

    /// Lazily enumerates the groundings of all actions over the domains of their parameters,
    /// skipping statically inapplicable ones.
    pub fn get_grounded_actions(&mut self) -> GroundActions<'_, 'pb> {
        GroundActions {
            grounder: self,
            next_action: 0,
            current: None,
        }
    }
}

/// Iterator over the ground actions of a problem, see [Grounder::get_grounded_actions].
pub struct GroundActions<'g, 'pb> {
    grounder: &'g mut Grounder<'pb>,
    next_action: usize,
    current: Option<(ActionId, DomainExpander)>,
}

impl Iterator for GroundActions<'_, '_> {
    type Item = Result<GroundAction, GroundingError>;

    fn next(&mut self) -> Option<Self::Item> {
        let problem = self.grounder.problem;
        let env = problem.env();
        loop {
            if let Some((action, expander)) = &mut self.current {
                let action = *action;
                match expander.next() {
                    Some(params) => match self.grounder.ground_action(action, &params) {
                        Ok(Some(ground)) => return Some(Ok(ground)),
                        Ok(None) => continue,
                        Err(e) => return Some(Err(e)),
                    },
                    None => self.current = None,
                }
            }
            let (id, action) = problem.actions().iter().nth(self.next_action)?;
            self.next_action += 1;
            let domains = action
                .parameters
                .iter()
                .map(|p| domain_of(env, p.tpe()))
                .collect::<Result<Vec<_>, _>>();
            match domains {
                Ok(domains) => {
                    let expander = DomainExpander::new(domains);
                    if let Err(e) = expander.check_size(|| action.name.to_string()) {
                        return Some(Err(e.into()));
                    }
                    self.current = Some((id, expander));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(env: &Environment, values: &[IntValue]) -> Vec<ExprId> {
        values.iter().map(|&i| env.int(i)).collect()
    }

    #[test]
    fn expander_enumerates_lexicographically() {
        let env = Environment::new();
        let mut expander = DomainExpander::new(vec![ints(&env, &[0, 1]), ints(&env, &[5, 6, 7])]);
        assert_eq!(expander.size(), 6);
        assert_eq!(expander.size_hint(), (6, Some(6)));
        assert_eq!(expander.next(), Some(ints(&env, &[0, 5])));
        assert_eq!(expander.next(), Some(ints(&env, &[0, 6])));
        assert_eq!(expander.size_hint(), (4, Some(4)));
        let rest: Vec<_> = expander.by_ref().collect();
        assert_eq!(rest.len(), 4);
        assert_eq!(rest[3], ints(&env, &[1, 7]));
        assert_eq!(expander.next(), None);
        assert_eq!(expander.size_hint(), (0, Some(0)));

        expander.restart();
        assert_eq!(expander.count(), 6);
    }

    #[test]
    fn degenerate_products() {
        let env = Environment::new();
        let mut none = DomainExpander::new(vec![]);
        assert_eq!(none.next(), Some(vec![]));
        assert_eq!(none.next(), None);

        let empty = DomainExpander::new(vec![ints(&env, &[1, 2]), vec![]]);
        assert_eq!(empty.size(), 0);
        assert_eq!(empty.count(), 0);
    }

    #[test]
    fn domains() -> anyhow::Result<()> {
        let mut env = Environment::new();
        let loc = env.types.add_type("location", None)?;
        let room = env.types.add_type("room", Some(loc))?;
        let l = env.objects.add_object("l", loc)?;
        let r = env.objects.add_object("r", room)?;
        assert_eq!(domain_of(&env, &Type::User(loc))?, vec![env.object(l), env.object(r)]);
        assert_eq!(domain_of(&env, &Type::User(room))?, vec![env.object(r)]);
        assert_eq!(domain_of(&env, &Type::Bool)?, vec![env.bool(false), env.bool(true)]);
        assert_eq!(domain_of(&env, &Type::int(-1, 1)?)?, ints(&env, &[-1, 0, 1]));
        assert!(matches!(domain_of(&env, &Type::REAL), Err(EvalError::InfiniteDomain(_))));
        assert!(matches!(
            domain_of(&env, &Type::int(0, IntValue::MAX)?),
            Err(EvalError::GroundingTooLarge { .. })
        ));
        Ok(())
    }

    /// `move(from, to)` with a precondition `from != to` and a conditional effect.
    fn moves() -> anyhow::Result<(Problem, ActionId)> {
        let mut pb = ProblemBuilder::new("moves");
        let loc = pb.add_type("location", None)?;
        pb.add_object("l1", loc)?;
        pb.add_object("l2", loc)?;
        pb.add_object("l3", loc)?;
        let at = pb.add_fluent("at", vec![Param::new("l", Type::User(loc))], Type::Bool, None)?;
        let connected = pb.add_fluent(
            "connected",
            vec![Param::new("a", Type::User(loc)), Param::new("b", Type::User(loc))],
            Type::Bool,
            Some(pb.env().bool(false)),
        )?;
        let moves = pb.add_fluent("moves", vec![], Type::int(0, 10)?, None)?;

        let from = Param::new("from", Type::User(loc));
        let to = Param::new("to", Type::User(loc));
        let env = pb.env();
        let (vfrom, vto) = (env.param(&from), env.param(&to));
        let moves = env.fluent(moves, [])?;
        let mut act = Action::new("move", vec![from, to]);
        act.add_precondition(env, env.not(env.eq(vfrom, vto)?)?)?;
        act.add_precondition(env, env.fluent(at, [vfrom])?)?;
        act.add_precondition(env, env.fluent(connected, [vfrom, vto])?)?;
        act.add_effect(env, Effect::assign(env.fluent(at, [vfrom])?, env.bool(false)))?;
        act.add_effect(env, Effect::assign(env.fluent(at, [vto])?, env.bool(true)))?;
        act.add_effect(
            env,
            Effect::increase(moves, env.int(1)).with_condition(env.eq(vfrom, vto)?),
        )?;
        let l1 = env.object(pb.env().objects.get("l1")?);
        let l2 = env.object(pb.env().objects.get("l2")?);
        let conn = env.fluent(connected, [l1, l2])?;
        let id = pb.add_action(act)?;
        pb.set_initial_value(conn, pb.env().bool(true))?;
        Ok((pb.build()?, id))
    }

    #[test]
    fn grounding_simplifies() -> anyhow::Result<()> {
        let (problem, id) = moves()?;
        let env = problem.env();
        let l1 = env.object(env.objects.get("l1")?);
        let l2 = env.object(env.objects.get("l2")?);
        let l3 = env.object(env.objects.get("l3")?);
        let mut grounder = Grounder::new(&problem);

        // connected is static: connected(l1, l2) is replaced by its initial value
        let ground = grounder.ground_action(id, &[l1, l2])?.expect("applicable");
        let at = env.fluents.get("at")?;
        assert_eq!(ground.preconditions, vec![env.fluent(at, [l1])?]);
        // the conditional increase can never trigger
        assert_eq!(ground.effects.len(), 2);
        assert!(ground.effects.iter().all(|e| e.condition.is_none()));

        assert!(matches!(
            grounder.ground(id, &[l1, l1])?,
            GroundingOutcome::Vacuous { .. }
        ));
        assert!(grounder.ground_action(id, &[l2, l3])?.is_none());
        Ok(())
    }

    #[test]
    fn invalid_parameters() -> anyhow::Result<()> {
        let (problem, id) = moves()?;
        let env = problem.env();
        let l1 = env.object(env.objects.get("l1")?);
        let mut grounder = Grounder::new(&problem);
        assert!(matches!(
            grounder.ground(id, &[l1]),
            Err(GroundingError::Usage(UsageError::ParameterCountMismatch {
                expected: 2,
                found: 1,
                ..
            }))
        ));
        assert!(matches!(
            grounder.ground(id, &[l1, env.int(3)]),
            Err(GroundingError::Usage(UsageError::InvalidParameterValue { .. }))
        ));
        let at = env.fluents.get("at")?;
        assert!(matches!(
            grounder.ground(id, &[l1, env.fluent(at, [l1])?]),
            Err(GroundingError::Usage(UsageError::InvalidParameterValue { .. }))
        ));
        Ok(())
    }

    #[test]
    fn lazy_enumeration_skips_vacuous_groundings() -> anyhow::Result<()> {
        let (problem, _) = moves()?;
        let env = problem.env();
        let mut grounder = Grounder::new(&problem);
        let grounded: Vec<GroundAction> = grounder.get_grounded_actions().collect::<Result<_, _>>()?;
        // only connected(l1, l2) holds
        assert_eq!(grounded.len(), 1);
        let l1 = env.object(env.objects.get("l1")?);
        let l2 = env.object(env.objects.get("l2")?);
        assert_eq!(grounded[0].parameters, vec![l1, l2]);

        let mut iter = grounder.get_grounded_actions();
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        Ok(())
    }
}
