use malachite::Rational;
use plankit_model::{walkers::*, *};

use crate::{SequentialSimulator, SimulatorError};

fn numeric(env: &Environment, e: ExprId) -> Result<Rational, SimulatorError> {
    env.numeric_value(e)
        .ok_or_else(|| EvalError::NotAConstant((env / e).to_string()).into())
}

impl SequentialSimulator<'_> {
    /// Value of the metric for the empty plan ending in `state`.
    pub fn evaluate_quality_metric_in_initial_state(
        &self,
        metric: &QualityMetric,
        state: &SequentialState,
    ) -> Result<ExprId, SimulatorError> {
        let env = self.problem().env();
        match metric {
            QualityMetric::MinimizeActionCosts { .. } | QualityMetric::MinimizeSequentialPlanLength => Ok(env.int(0)),
            QualityMetric::MinimizeExpressionOnFinalState(e) | QualityMetric::MaximizeExpressionOnFinalState(e) => {
                Ok(evaluate(env, *e, state)?)
            }
            QualityMetric::Oversubscription { goals } => self.gains(goals, state),
            QualityMetric::MinimizeMakespan => Err(SimulatorError::Unsupported(Feature::Makespan.to_string())),
        }
    }

    /// Value of the metric after the transition from `state` to `next_state` with the given action,
    /// `value` being its value in `state`.
    pub fn evaluate_quality_metric(
        &self,
        metric: &QualityMetric,
        value: ExprId,
        state: &SequentialState,
        action: ActionId,
        params: &[ExprId],
        next_state: &SequentialState,
    ) -> Result<ExprId, SimulatorError> {
        let problem = self.problem();
        let env = problem.env();
        match metric {
            QualityMetric::MinimizeActionCosts { costs, default } => {
                let Some(&cost) = costs.get(&action).or(default.as_ref()) else {
                    return Ok(value);
                };
                let map: Substitution = problem
                    .action(action)
                    .parameters
                    .iter()
                    .map(|p| env.param(p))
                    .zip(params.iter().copied())
                    .collect();
                let cost = substitute(env, cost, map)?;
                let cost = evaluate(env, cost, state)?;
                Ok(env.number(numeric(env, value)? + numeric(env, cost)?))
            }
            QualityMetric::MinimizeSequentialPlanLength => Ok(env.number(numeric(env, value)? + Rational::from(1))),
            QualityMetric::MinimizeExpressionOnFinalState(e) | QualityMetric::MaximizeExpressionOnFinalState(e) => {
                Ok(evaluate(env, *e, next_state)?)
            }
            QualityMetric::Oversubscription { goals } => self.gains(goals, next_state),
            QualityMetric::MinimizeMakespan => Err(SimulatorError::Unsupported(Feature::Makespan.to_string())),
        }
    }

    /// Sum of the gains of the goals holding in the state.
    fn gains(&self, goals: &[(ExprId, ExprId)], state: &SequentialState) -> Result<ExprId, SimulatorError> {
        let env = self.problem().env();
        let mut eval = StateEvaluator::new(state);
        let mut total = Rational::from(0);
        for &(goal, gain) in goals {
            if eval.holds(env, goal)? {
                total += numeric(env, gain)?;
            }
        }
        Ok(env.number(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_accumulate() -> anyhow::Result<()> {
        let mut pb = ProblemBuilder::new("metrics");
        let level = pb.add_fluent("level", vec![], Type::INT, Some(pb.env().int(0)))?;
        let done = pb.add_fluent("done", vec![], Type::Bool, Some(pb.env().bool(false)))?;
        let env = pb.env();
        let (level, done) = (env.fluent(level, [])?, env.fluent(done, [])?);
        let n = Param::new("n", Type::int(1, 3)?);
        let mut raise = Action::new("raise", vec![n.clone()]);
        raise.add_effect(env, Effect::increase(level, env.param(&n)))?;
        raise.add_effect(env, Effect::assign(done, env.bool(true)))?;
        let cost = env.times([env.int(2), env.param(&n)])?;
        let gains = vec![(done, env.int(5)), (env.not(done)?, env.int(1))];
        let raise = pb.add_action(raise)?;
        let costs = [(raise, cost)].into_iter().collect();
        let metrics = [
            QualityMetric::MinimizeActionCosts { costs, default: None },
            QualityMetric::MinimizeSequentialPlanLength,
            QualityMetric::MaximizeExpressionOnFinalState(level),
            QualityMetric::Oversubscription { goals: gains },
        ];
        for m in &metrics {
            pb.add_quality_metric(m.clone())?;
        }
        let problem = pb.build()?;
        let env = problem.env();
        let sim = SequentialSimulator::new(&problem, true)?;

        let s0 = sim.get_initial_state()?;
        let three = env.int(3);
        let s1 = sim.apply(&s0, raise, &[three])?.expect("applicable");
        let expected = [(0, 6), (0, 1), (0, 3), (1, 5)];
        for (m, (before, after)) in metrics.iter().zip(expected) {
            let v0 = sim.evaluate_quality_metric_in_initial_state(m, &s0)?;
            assert_eq!(v0, env.int(before));
            let v1 = sim.evaluate_quality_metric(m, v0, &s0, raise, &[three], &s1)?;
            assert_eq!(v1, env.int(after), "{}", env / m);
        }
        assert!(matches!(
            sim.evaluate_quality_metric_in_initial_state(&QualityMetric::MinimizeMakespan, &s0),
            Err(SimulatorError::Unsupported(_))
        ));
        Ok(())
    }
}
