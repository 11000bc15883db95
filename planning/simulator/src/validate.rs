use derive_more::Display;
use plankit_model::*;
use tracing::{Level, debug};

use crate::{InapplicabilityReason, SequentialPlan, SequentialSimulator, SimulatorError};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum ValidationStatus {
    #[display("valid")]
    Valid,
    #[display("invalid")]
    Invalid,
}

/// Outcome of replaying a plan.
#[derive(Clone, Debug)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    /// Index of the action that could not be applied.
    pub failed_step: Option<usize>,
    pub reason: Option<InapplicabilityReason>,
    /// Conditions of the failed action, or goals unsatisfied at the end of the plan.
    pub unsatisfied: Vec<ExprId>,
    /// States visited by the plan, starting with the initial state.
    pub trace: Vec<SequentialState>,
    /// Final value of each quality metric of the problem, in declaration order.
    pub metric_values: Vec<ExprId>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }

    pub fn final_state(&self) -> Option<&SequentialState> {
        self.trace.last()
    }
}

/// Replays the plan from the initial state and checks that it reaches the goals.
pub fn validate_plan(
    simulator: &SequentialSimulator,
    plan: &SequentialPlan,
) -> Result<ValidationResult, SimulatorError> {
    let problem = simulator.problem();
    let _span = tracing::span!(Level::DEBUG, "validation", problem = %problem.name()).entered();
    let mut state = simulator.get_initial_state()?;
    let mut metric_values = problem
        .quality_metrics()
        .iter()
        .map(|m| simulator.evaluate_quality_metric_in_initial_state(m, &state))
        .collect::<Result<Vec<_>, _>>()?;
    let mut trace = vec![state.clone()];

    let invalid = |step: Option<usize>, reason, unsatisfied, trace, metric_values| ValidationResult {
        status: ValidationStatus::Invalid,
        failed_step: step,
        reason,
        unsatisfied,
        trace,
        metric_values,
    };

    for (i, instance) in plan.iter().enumerate() {
        let (unsatisfied, reason) =
            simulator.get_unsatisfied_conditions(&state, instance.action, &instance.parameters, false, true)?;
        if reason.is_some() {
            debug!(step = i, action = %instance.format(problem), "plan is invalid");
            return Ok(invalid(Some(i), reason, unsatisfied, trace, metric_values));
        }
        let next = match simulator.apply_unsafe(&state, instance.action, &instance.parameters) {
            Ok(next) => next,
            Err(SimulatorError::InvalidAction { reason, .. }) => {
                return Ok(invalid(Some(i), Some(reason), Vec::new(), trace, metric_values));
            }
            Err(SimulatorError::ConflictingEffects { .. }) => {
                let reason = Some(InapplicabilityReason::ConflictingEffects);
                return Ok(invalid(Some(i), reason, Vec::new(), trace, metric_values));
            }
            Err(e) => return Err(e),
        };
        for (value, metric) in metric_values.iter_mut().zip(problem.quality_metrics()) {
            *value = simulator.evaluate_quality_metric(
                metric,
                *value,
                &state,
                instance.action,
                &instance.parameters,
                &next,
            )?;
        }
        trace.push(next.clone());
        state = next;
    }

    let unsatisfied = simulator.get_unsatisfied_goals(&state, false)?;
    if !unsatisfied.is_empty() {
        debug!(num_unsatisfied = unsatisfied.len(), "goals not reached");
        return Ok(invalid(None, None, unsatisfied, trace, metric_values));
    }
    Ok(ValidationResult {
        status: ValidationStatus::Valid,
        failed_step: None,
        reason: None,
        unsatisfied,
        trace,
        metric_values,
    })
}
