use crate::{walkers::*, *};

/// Reduces ground expressions to constants, reading fluent values from a state.
///
/// Conjunctions, disjunctions, implications and quantifiers are evaluated lazily: evaluation stops
/// as soon as the result is known. Quantifiers range over the finite domains of their variables.
/// Action parameters must have been substituted beforehand.
pub struct StateEvaluator<'a> {
    state: &'a dyn State,
    arithmetic: Simplifier<'static>,
    memo: Memo<ExprId>,
}

impl<'a> StateEvaluator<'a> {
    pub fn new(state: &'a dyn State) -> Self {
        StateEvaluator {
            state,
            arithmetic: Simplifier::new(None),
            memo: Default::default(),
        }
    }

    pub fn evaluate(&mut self, env: &Environment, e: ExprId) -> Result<ExprId, EvalError> {
        self.walk(env, e)
    }

    /// Evaluates a boolean expression.
    pub fn holds(&mut self, env: &Environment, e: ExprId) -> Result<bool, EvalError> {
        let value = self.evaluate(env, e)?;
        env.bool_value(value).ok_or_else(|| EvalError::not_constant(env, value))
    }

    fn eval_bool(&mut self, env: &Environment, e: ExprId) -> Result<bool, EvalError> {
        let value = self.walk(env, e)?;
        env.bool_value(value)
            .ok_or_else(|| TypeError::incompatible(env, value, &Type::Bool).into())
    }

    /// Evaluates the instances of a quantified formula until one of them has the value `stop`.
    fn eval_quantified(
        &mut self,
        env: &Environment,
        id: ExprId,
        vars: &[Param],
        body: ExprId,
        stop: bool,
    ) -> Result<bool, EvalError> {
        let keys: Vec<ExprId> = vars.iter().map(|v| env.var(v)).collect();
        for values in DomainExpander::for_variables(env, vars, id)? {
            let map: Substitution = keys.iter().copied().zip(values).collect();
            let instance = Substituter::new(env, map)?.substitute(env, body)?;
            if self.eval_bool(env, instance)? == stop {
                return Ok(stop);
            }
        }
        Ok(!stop)
    }
}

impl Walker for StateEvaluator<'_> {
    type Output = ExprId;

    fn memo(&mut self) -> &mut Memo<ExprId> {
        &mut self.memo
    }

    fn pre_visit(&mut self, env: &Environment, id: ExprId, expr: &Expr) -> Result<Visit<ExprId>, EvalError> {
        let value = match expr {
            Expr::And(args) => {
                let mut res = true;
                for &a in args {
                    if !self.eval_bool(env, a)? {
                        res = false;
                        break;
                    }
                }
                res
            }
            Expr::Or(args) => {
                let mut res = false;
                for &a in args {
                    if self.eval_bool(env, a)? {
                        res = true;
                        break;
                    }
                }
                res
            }
            Expr::Implies(a, b) => !self.eval_bool(env, *a)? || self.eval_bool(env, *b)?,
            Expr::Exists(vars, body) => self.eval_quantified(env, id, vars, *body, true)?,
            Expr::Forall(vars, body) => self.eval_quantified(env, id, vars, *body, false)?,
            _ => return Ok(Visit::Children),
        };
        Ok(Visit::Done(env.bool(value)))
    }

    fn visit(&mut self, env: &Environment, id: ExprId, expr: &Expr, args: &[ExprId]) -> Result<ExprId, EvalError> {
        match expr {
            Expr::Bool(_) | Expr::Int(_) | Expr::Real(_) | Expr::Object(_) => Ok(id),
            Expr::Param(p) => Err(EvalError::UnboundParameter(p.name().clone())),
            Expr::Var(v) => Err(EvalError::FreeVariable(v.name().clone())),
            Expr::Fluent(f, _) => {
                let ground = env.fluent(*f, args.iter().copied())?;
                self.state.get_value(ground).ok_or_else(|| EvalError::missing(env, ground))
            }
            Expr::Not(_) | Expr::Iff(_, _) | Expr::And(_) | Expr::Or(_) | Expr::Implies(_, _) => {
                let res = self.arithmetic.visit(env, id, expr, args)?;
                Ok(res)
            }
            Expr::Plus(_)
            | Expr::Minus(_, _)
            | Expr::Times(_)
            | Expr::Div(_, _)
            | Expr::Le(_, _)
            | Expr::Lt(_, _)
            | Expr::Eq(_, _) => {
                // all arguments are constants, hence the simplifier folds the node into a constant
                let res = self.arithmetic.visit(env, id, expr, args)?;
                if env.is_constant(res) {
                    Ok(res)
                } else {
                    Err(EvalError::not_constant(env, res))
                }
            }
            Expr::Exists(_, _)
            | Expr::Forall(_, _)
            | Expr::Timing(_)
            | Expr::Present(_)
            | Expr::Always(_)
            | Expr::Sometime(_)
            | Expr::AtMostOnce(_)
            | Expr::SometimeBefore(_, _)
            | Expr::SometimeAfter(_, _)
            | Expr::Dot(_, _) => Err(EvalError::UnsupportedOperator(expr.kind())),
        }
    }
}

/// Evaluates `e` in `state`.
pub fn evaluate(env: &Environment, e: ExprId, state: &dyn State) -> Result<ExprId, EvalError> {
    StateEvaluator::new(state).evaluate(env, e)
}
