use std::collections::BTreeMap;

use itertools::Itertools;
use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::{walkers::*, *};

/// Mutable view of a problem under construction. Every addition is validated immediately.
pub struct ProblemBuilder {
    name: Sym,
    env: Environment,
    actions: Actions,
    initial_values: BTreeMap<ExprId, ExprId>,
    goals: Vec<ExprId>,
    trajectory_constraints: Vec<ExprId>,
    quality_metrics: Vec<QualityMetric>,
}

impl ProblemBuilder {
    pub fn new(name: impl Into<Sym>) -> Self {
        ProblemBuilder {
            name: name.into(),
            env: Environment::new(),
            actions: Default::default(),
            initial_values: Default::default(),
            goals: Default::default(),
            trajectory_constraints: Default::default(),
            quality_metrics: Default::default(),
        }
    }

    /// Environment in which the expressions of the problem must be created.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn add_type(&mut self, name: impl Into<Sym>, parent: Option<UserTypeId>) -> Result<UserTypeId, ProblemError> {
        Ok(self.env.types.add_type(name, parent)?)
    }

    pub fn add_object(&mut self, name: impl Into<Sym>, tpe: UserTypeId) -> Result<ObjectId, ProblemError> {
        Ok(self.env.objects.add_object(name, tpe)?)
    }

    /// Declares a fluent, with an optional default value for all its groundings.
    pub fn add_fluent(
        &mut self,
        name: impl Into<Sym>,
        parameters: Vec<Param>,
        tpe: Type,
        default: Option<ExprId>,
    ) -> Result<FluentId, ProblemError> {
        if let Some(d) = default {
            if !self.env.is_constant(d) {
                return Err(ProblemError::NotAConstant((&self.env / d).to_string()));
            }
            tpe.accepts(d, &self.env)?;
        }
        Ok(self.env.fluents.add_fluent(name, parameters, tpe, default)?)
    }

    pub fn add_action(&mut self, action: Action) -> Result<ActionId, ProblemError> {
        for &c in &action.preconditions {
            Type::Bool.accepts(c, &self.env)?;
        }
        for eff in &action.effects {
            eff.check(&self.env)?;
        }
        if let Some(sim) = &action.simulated_effect {
            sim.check(&self.env)?;
        }
        Ok(self.actions.add(action)?)
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    /// Sets the initial value of a ground fluent.
    pub fn set_initial_value(&mut self, fluent: ExprId, value: ExprId) -> Result<(), ProblemError> {
        let env = &self.env;
        let ground = match env.node(fluent).expr() {
            Expr::Fluent(_, args) => args.iter().all(|&a| env.is_constant(a)),
            _ => false,
        };
        if !ground {
            return Err(ProblemError::NotAGroundFluent((env / fluent).to_string()));
        }
        if !env.is_constant(value) {
            return Err(ProblemError::NotAConstant((env / value).to_string()));
        }
        env.tpe(fluent).accepts(value, env)?;
        self.initial_values.insert(fluent, value);
        Ok(())
    }

    pub fn add_goal(&mut self, goal: ExprId) -> Result<(), ProblemError> {
        Type::Bool.accepts(goal, &self.env)?;
        self.goals.push(goal);
        Ok(())
    }

    /// Adds a trajectory constraint. A conjunction is split into one constraint per conjunct.
    pub fn add_trajectory_constraint(&mut self, constraint: ExprId) -> Result<(), ProblemError> {
        Type::Bool.accepts(constraint, &self.env)?;
        let mut pending = vec![constraint];
        let mut constraints = Vec::new();
        while let Some(c) = pending.pop() {
            match self.env.node(c).expr() {
                Expr::And(conjuncts) => pending.extend(conjuncts.iter().rev()),
                Expr::Bool(true) => {}
                e if e.kind().is_trajectory_constraint() => constraints.push(c),
                _ => return Err(ProblemError::NotATrajectoryConstraint((&self.env / c).to_string())),
            }
        }
        for c in constraints {
            if !self.trajectory_constraints.contains(&c) {
                self.trajectory_constraints.push(c);
            }
        }
        Ok(())
    }

    pub fn add_quality_metric(&mut self, metric: QualityMetric) -> Result<(), ProblemError> {
        metric.check(&self.env)?;
        self.quality_metrics.push(metric);
        Ok(())
    }

    /// Freezes the problem.
    pub fn build(self) -> Result<Problem, ProblemError> {
        let mut written: hashbrown::HashSet<FluentId> = hashbrown::HashSet::new();
        for (_, a) in self.actions.iter() {
            let targets = a
                .effects
                .iter()
                .map(|e| e.fluent)
                .chain(a.simulated_effect.iter().flat_map(|s| s.fluents.iter().copied()));
            for t in targets {
                if let Expr::Fluent(f, _) = self.env.node(t).expr() {
                    written.insert(*f);
                }
            }
        }
        let static_fluents = self
            .env
            .fluents
            .iter()
            .map(|(id, _)| id)
            .filter(|f| !written.contains(f))
            .collect();

        let mut problem = Problem {
            name: self.name,
            env: self.env,
            actions: self.actions,
            explicit_initial_values: self.initial_values,
            goals: self.goals,
            trajectory_constraints: self.trajectory_constraints,
            quality_metrics: self.quality_metrics,
            static_fluents,
            kind: ProblemKind::new(),
            initial_values: OnceCell::new(),
        };
        problem.kind = problem.compute_kind()?;
        debug!(problem = %problem.name, kind = %problem.kind, "built problem");
        Ok(problem)
    }
}

/// An immutable planning problem.
pub struct Problem {
    name: Sym,
    env: Environment,
    actions: Actions,
    explicit_initial_values: BTreeMap<ExprId, ExprId>,
    goals: Vec<ExprId>,
    trajectory_constraints: Vec<ExprId>,
    quality_metrics: Vec<QualityMetric>,
    static_fluents: hashbrown::HashSet<FluentId>,
    kind: ProblemKind,
    initial_values: OnceCell<BTreeMap<ExprId, ExprId>>,
}

impl Problem {
    pub fn name(&self) -> &Sym {
        &self.name
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    pub fn action(&self, id: ActionId) -> &Action {
        self.actions.action(id)
    }

    pub fn goals(&self) -> &[ExprId] {
        &self.goals
    }

    pub fn trajectory_constraints(&self) -> &[ExprId] {
        &self.trajectory_constraints
    }

    pub fn quality_metrics(&self) -> &[QualityMetric] {
        &self.quality_metrics
    }

    pub fn kind(&self) -> &ProblemKind {
        &self.kind
    }

    /// Fluents that are not modified by any action.
    pub fn static_fluents(&self) -> &hashbrown::HashSet<FluentId> {
        &self.static_fluents
    }

    pub fn is_static(&self, fluent: FluentId) -> bool {
        self.static_fluents.contains(&fluent)
    }

    /// Objects of the given type, including those of its subtypes.
    pub fn objects(&self, tpe: UserTypeId) -> Vec<ObjectId> {
        self.env.objects.of_type(tpe, &self.env.types).collect()
    }

    pub fn explicit_initial_values(&self) -> &BTreeMap<ExprId, ExprId> {
        &self.explicit_initial_values
    }

    /// Initial value of a ground fluent: the one explicitly set or the default of its fluent.
    pub fn initial_value(&self, fluent: ExprId) -> Option<ExprId> {
        if let Some(&v) = self.explicit_initial_values.get(&fluent) {
            return Some(v);
        }
        match self.env.node(fluent).expr() {
            Expr::Fluent(f, _) => self.env.fluents.fluent(*f).default,
            _ => None,
        }
    }

    /// Initial values of all groundings of all fluents.
    ///
    /// Groundings that are not explicitly initialized take the default value of their fluent.
    /// Fluents with a parameter of infinite domain only have their explicit values.
    pub fn initial_values(&self) -> Result<&BTreeMap<ExprId, ExprId>, ProblemError> {
        self.initial_values.get_or_try_init(|| self.complete_initial_values())
    }

    fn complete_initial_values(&self) -> Result<BTreeMap<ExprId, ExprId>, ProblemError> {
        let env = &self.env;
        let mut values = self.explicit_initial_values.clone();
        for (fid, fluent) in env.fluents.iter() {
            let domains = fluent
                .parameters
                .iter()
                .map(|p| domain_of(env, p.tpe()))
                .collect::<Result<Vec<_>, _>>();
            let domains = match domains {
                Ok(domains) => domains,
                Err(EvalError::InfiniteDomain(tpe)) => {
                    debug!(fluent = %fluent.name(), %tpe, "not enumerating groundings over an infinite domain");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let expander = DomainExpander::new(domains);
            expander.check_size(|| fluent.name().to_string())?;
            for args in expander {
                let ground = env.fluent(fid, args)?;
                if values.contains_key(&ground) {
                    continue;
                }
                match fluent.default {
                    Some(d) => {
                        values.insert(ground, d);
                    }
                    None => return Err(ProblemError::MissingInitialValue((env / ground).to_string())),
                }
            }
        }
        Ok(values)
    }

    fn compute_kind(&self) -> Result<ProblemKind, ProblemError> {
        use Feature::*;
        let env = &self.env;
        let mut kind = ProblemKind::new();
        kind.set(ActionBased);
        if env.types.iter().next().is_some() {
            kind.set(if env.types.is_hierarchical() {
                HierarchicalTyping
            } else {
                FlatTyping
            });
        }
        for (_, fluent) in env.fluents.iter() {
            match &fluent.return_type {
                t @ (Type::Int(_) | Type::Real(_)) => {
                    kind.set(NumericFluents);
                    if t.is_bounded() {
                        kind.set(BoundedTypes);
                    }
                }
                Type::User(_) => kind.set(ObjectFluents),
                Type::Bool => {}
            }
        }

        let mut conditions: Vec<ExprId> = self.goals.clone();
        for (_, action) in self.actions.iter() {
            conditions.extend_from_slice(&action.preconditions);
            for eff in &action.effects {
                match eff.kind {
                    EffectKind::Assign => {}
                    EffectKind::Increase => kind.set(IncreaseEffects),
                    EffectKind::Decrease => kind.set(DecreaseEffects),
                }
                if let Some(c) = eff.condition {
                    kind.set(ConditionalEffects);
                    conditions.push(c);
                }
                if eff.is_forall() {
                    kind.set(ForallEffects);
                }
                conditions.extend([eff.fluent, eff.value]);
            }
            if action.simulated_effect.is_some() {
                kind.set(SimulatedEffects);
            }
        }
        conditions.extend_from_slice(&self.trajectory_constraints);
        for metric in &self.quality_metrics {
            kind.set(match metric {
                QualityMetric::MinimizeActionCosts { .. } => ActionsCost,
                QualityMetric::MinimizeSequentialPlanLength => PlanLength,
                QualityMetric::MinimizeExpressionOnFinalState(_) | QualityMetric::MaximizeExpressionOnFinalState(_) => {
                    FinalValue
                }
                QualityMetric::Oversubscription { .. } => Oversubscription,
                QualityMetric::MinimizeMakespan => Makespan,
            });
            conditions.extend(metric.expressions());
        }

        let mut extractor = OperatorsExtractor::new();
        for c in conditions.into_iter().unique() {
            for op in extractor.operators(env, c)?.iter() {
                match op {
                    OperatorKind::Not => kind.set(NegativeConditions),
                    OperatorKind::Or | OperatorKind::Implies | OperatorKind::Iff => kind.set(DisjunctiveConditions),
                    OperatorKind::Equals => kind.set(Equalities),
                    OperatorKind::Exists => kind.set(ExistentialConditions),
                    OperatorKind::Forall => kind.set(UniversalConditions),
                    OperatorKind::TimingRef => kind.set(TimingExpressions),
                    OperatorKind::PresenceRef => kind.set(PresenceExpressions),
                    OperatorKind::Dot => kind.set(MultiAgent),
                    OperatorKind::Always => kind.set(StateInvariants),
                    OperatorKind::Sometime
                    | OperatorKind::AtMostOnce
                    | OperatorKind::SometimeBefore
                    | OperatorKind::SometimeAfter => kind.set(TrajectoryConstraints),
                    _ => {}
                }
            }
        }
        Ok(kind)
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env = &self.env;
        writeln!(f, "problem {}", self.name)?;
        writeln!(f, "kind: {}", self.kind)?;
        write!(f, "{}", env / &env.objects)?;
        writeln!(f, "{}", env / &env.fluents)?;
        writeln!(f, "Actions:")?;
        for (_, a) in self.actions.iter() {
            writeln!(f, "  {}", env / a)?;
        }
        writeln!(f, "Initial values:")?;
        for (k, v) in &self.explicit_initial_values {
            writeln!(f, "  {} := {}", env / *k, env / *v)?;
        }
        writeln!(f, "Goals: {}", self.goals.iter().map(|&g| env / g).format(", "))?;
        if !self.trajectory_constraints.is_empty() {
            writeln!(
                f,
                "Trajectory constraints: {}",
                self.trajectory_constraints.iter().map(|&c| env / c).format(", ")
            )?;
        }
        for m in &self.quality_metrics {
            writeln!(f, "Metric: {}", env / m)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_values_are_completed() -> anyhow::Result<()> {
        let mut pb = ProblemBuilder::new("test");
        let loc = pb.add_type("location", None)?;
        let l1 = pb.add_object("l1", loc)?;
        let l2 = pb.add_object("l2", loc)?;
        let f = pb.env().bool(false);
        let visited = pb.add_fluent("visited", vec![Param::new("l", Type::User(loc))], Type::Bool, Some(f))?;
        let counter = pb.add_fluent("counter", vec![], Type::INT, None)?;
        let visited_l1 = pb.env().fluent(visited, [pb.env().object(l1)])?;
        let visited_l2 = pb.env().fluent(visited, [pb.env().object(l2)])?;
        let counter = pb.env().fluent(counter, [])?;
        pb.set_initial_value(visited_l1, pb.env().bool(true))?;
        assert!(pb.set_initial_value(counter, pb.env().bool(true)).is_err());
        let x = Param::new("x", Type::User(loc));
        let lifted = pb.env().fluent(visited, [pb.env().param(&x)])?;
        assert!(matches!(
            pb.set_initial_value(lifted, pb.env().bool(true)),
            Err(ProblemError::NotAGroundFluent(_))
        ));

        let problem = pb.build()?;
        // counter has no value and no default
        assert!(matches!(problem.initial_values(), Err(ProblemError::MissingInitialValue(_))));
        assert_eq!(problem.initial_value(visited_l2), Some(problem.env().bool(false)));
        assert_eq!(problem.initial_value(counter), None);
        Ok(())
    }

    #[test]
    fn static_fluents_and_kind() -> anyhow::Result<()> {
        let mut pb = ProblemBuilder::new("kind");
        let ground = pb.add_fluent("ground", vec![], Type::Bool, None)?;
        let fuel = pb.add_fluent("fuel", vec![], Type::int(0, 10)?, None)?;
        let ground = pb.env().fluent(ground, [])?;
        let fuel = pb.env().fluent(fuel, [])?;
        let mut act = Action::new("burn", vec![]);
        act.add_precondition(pb.env(), pb.env().not(ground)?)?;
        act.add_effect(pb.env(), Effect::decrease(fuel, pb.env().int(1)))?;
        let act = pb.add_action(act)?;
        pb.add_quality_metric(QualityMetric::MinimizeSequentialPlanLength)?;
        pb.add_goal(pb.env().le(fuel, pb.env().int(2))?)?;
        assert!(pb.add_goal(fuel).is_err());
        let problem = pb.build()?;

        let static_fluents: Vec<_> = problem.static_fluents().iter().copied().collect();
        assert_eq!(static_fluents, vec![problem.env().fluents.get("ground")?]);
        let kind = problem.kind();
        for f in [
            Feature::ActionBased,
            Feature::NumericFluents,
            Feature::BoundedTypes,
            Feature::NegativeConditions,
            Feature::DecreaseEffects,
            Feature::PlanLength,
        ] {
            assert!(kind.has(f), "missing {f}");
        }
        assert!(!kind.has(Feature::ConditionalEffects));
        assert!(!kind.has(Feature::FlatTyping));
        assert_eq!(problem.actions().get("burn")?, act);
        Ok(())
    }

    #[test]
    fn trajectory_constraints_are_flattened() -> anyhow::Result<()> {
        let mut pb = ProblemBuilder::new("constraints");
        let p = pb.add_fluent("p", vec![], Type::Bool, Some(pb.env().bool(true)))?;
        let q = pb.add_fluent("q", vec![], Type::Bool, Some(pb.env().bool(false)))?;
        let env = pb.env();
        let (p, q) = (env.fluent(p, [])?, env.fluent(q, [])?);
        let always_p = env.always(p)?;
        let sometime_q = env.sometime(q)?;
        let nested = env.and([always_p, env.and([sometime_q, env.bool(true)])?])?;
        pb.add_trajectory_constraint(nested)?;
        pb.add_trajectory_constraint(always_p)?;
        assert!(matches!(
            pb.add_trajectory_constraint(p),
            Err(ProblemError::NotATrajectoryConstraint(_))
        ));
        assert!(matches!(
            pb.add_trajectory_constraint(pb.env().and([always_p, q])?),
            Err(ProblemError::NotATrajectoryConstraint(_))
        ));
        let problem = pb.build()?;
        assert_eq!(problem.trajectory_constraints(), &[always_p, sometime_q]);
        assert!(problem.kind().has(Feature::StateInvariants));
        assert!(problem.kind().has(Feature::TrajectoryConstraints));
        Ok(())
    }
}
