use crate::{walkers::*, *};

/// Replaces each `exists` (resp. `forall`) by the disjunction (resp. conjunction) of its instances
/// over the finite domains of the quantified variables.
///
/// Domains are the objects of the environment (and the values of bounded integer and boolean
/// types). The result is only equivalent to the input with respect to these domains: an object
/// that is not declared in the environment is never considered. The number of instances of a
/// single quantifier is bounded by [PLANKIT_MAX_GROUNDINGS](crate::settings::PLANKIT_MAX_GROUNDINGS).
#[derive(Default)]
pub struct QuantifierRemover {
    memo: Memo<ExprId>,
}

impl QuantifierRemover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_quantifiers(&mut self, env: &Environment, e: ExprId) -> Result<ExprId, EvalError> {
        self.walk(env, e)
    }
}

impl Walker for QuantifierRemover {
    type Output = ExprId;

    fn memo(&mut self) -> &mut Memo<ExprId> {
        &mut self.memo
    }

    fn visit(&mut self, env: &Environment, id: ExprId, expr: &Expr, args: &[ExprId]) -> Result<ExprId, EvalError> {
        match expr {
            Expr::Exists(vars, _) | Expr::Forall(vars, _) => {
                // the body was already processed and does not contain any quantifier
                let body = args[0];
                let instances = instantiate(env, vars, body, id)?;
                if matches!(expr, Expr::Exists(_, _)) {
                    Ok(env.disjunction(instances)?)
                } else {
                    Ok(env.conjunction(instances)?)
                }
            }
            _ => rebuild(env, id, expr, args),
        }
    }
}

/// All instances of `body` obtained by replacing `vars` with the values of their domains.
pub(crate) fn instantiate(
    env: &Environment,
    vars: &[Param],
    body: ExprId,
    source: ExprId,
) -> Result<Vec<ExprId>, EvalError> {
    let expander = DomainExpander::for_variables(env, vars, source)?;
    let keys: Vec<ExprId> = vars.iter().map(|v| env.var(v)).collect();
    let mut instances = Vec::new();
    for values in expander {
        let map: Substitution = keys.iter().copied().zip(values).collect();
        instances.push(Substituter::new(env, map)?.substitute(env, body)?);
    }
    Ok(instances)
}
