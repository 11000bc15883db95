use itertools::Itertools;

use crate::{env::Env, *};

/// Objective of the planning problem, used to rank the plans reaching the goals.
///
/// Metrics never affect the goal condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QualityMetric {
    /// Sum of the costs of the actions of the plan. A cost expression may refer to the parameters
    /// of its action; actions without explicit cost use `default` (or zero).
    MinimizeActionCosts {
        costs: hashbrown::HashMap<ActionId, ExprId>,
        default: Option<ExprId>,
    },
    MinimizeSequentialPlanLength,
    MinimizeExpressionOnFinalState(ExprId),
    MaximizeExpressionOnFinalState(ExprId),
    /// Sum of the gains of the goals that hold in the final state.
    Oversubscription {
        goals: Vec<(ExprId, ExprId)>,
    },
    MinimizeMakespan,
}

impl QualityMetric {
    pub(crate) fn check(&self, env: &Environment) -> Result<(), ProblemError> {
        match self {
            QualityMetric::MinimizeActionCosts { costs, default } => {
                for &c in costs.values().chain(default.iter()) {
                    Type::REAL.accepts(c, env)?;
                }
            }
            QualityMetric::MinimizeExpressionOnFinalState(e) | QualityMetric::MaximizeExpressionOnFinalState(e) => {
                Type::REAL.accepts(*e, env)?;
            }
            QualityMetric::Oversubscription { goals } => {
                for &(goal, gain) in goals {
                    Type::Bool.accepts(goal, env)?;
                    Type::REAL.accepts(gain, env)?;
                    if !env.is_constant(gain) {
                        return Err(ProblemError::NotAConstant((env / gain).to_string()));
                    }
                }
            }
            QualityMetric::MinimizeSequentialPlanLength | QualityMetric::MinimizeMakespan => {}
        }
        Ok(())
    }

    /// Expressions appearing in the metric.
    pub fn expressions(&self) -> Vec<ExprId> {
        match self {
            QualityMetric::MinimizeActionCosts { costs, default } => {
                costs.values().copied().chain(default.iter().copied()).collect()
            }
            QualityMetric::MinimizeExpressionOnFinalState(e) | QualityMetric::MaximizeExpressionOnFinalState(e) => {
                vec![*e]
            }
            QualityMetric::Oversubscription { goals } => goals.iter().flat_map(|&(g, gain)| [g, gain]).collect(),
            QualityMetric::MinimizeSequentialPlanLength | QualityMetric::MinimizeMakespan => Vec::new(),
        }
    }
}

impl Display for Env<'_, &QualityMetric> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env = self.env;
        match self.elem {
            QualityMetric::MinimizeActionCosts { costs, default } => {
                write!(
                    f,
                    "minimize action-costs {{{}}}",
                    costs
                        .iter()
                        .sorted_by_key(|(a, _)| **a)
                        .map(|(a, c)| format!("{a:?}: {}", env / *c))
                        .format(", ")
                )?;
                if let Some(d) = default {
                    write!(f, " default {}", env / *d)?;
                }
                Ok(())
            }
            QualityMetric::MinimizeSequentialPlanLength => write!(f, "minimize plan-length"),
            QualityMetric::MinimizeExpressionOnFinalState(e) => write!(f, "minimize {}", env / *e),
            QualityMetric::MaximizeExpressionOnFinalState(e) => write!(f, "maximize {}", env / *e),
            QualityMetric::Oversubscription { goals } => write!(
                f,
                "oversubscription {{{}}}",
                goals
                    .iter()
                    .map(|(g, gain)| format!("{}: {}", env / *g, env / *gain))
                    .format(", ")
            ),
            QualityMetric::MinimizeMakespan => write!(f, "minimize makespan"),
        }
    }
}
