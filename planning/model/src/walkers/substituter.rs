use crate::{walkers::*, *};

pub type Substitution = hashbrown::HashMap<ExprId, ExprId>;

/// Replaces sub-expressions according to a substitution map.
///
/// A node matching a key is replaced and its children are not explored. Replacement values are
/// not themselves substituted. Below a quantifier, keys containing a free occurrence of one of the
/// quantified variables are ignored, so that bound variables are never captured.
pub struct Substituter {
    map: Substitution,
    free_vars: FreeVarsExtractor,
    memo: Memo<ExprId>,
}

impl Substituter {
    /// Creates a substituter, checking that each value can replace its key.
    pub fn new(env: &Environment, map: Substitution) -> Result<Self, TypeError> {
        for (&k, &v) in &map {
            env.tpe(k).accepts(v, env)?;
        }
        Ok(Self::new_unchecked(map))
    }

    fn new_unchecked(map: Substitution) -> Self {
        Substituter {
            map,
            free_vars: FreeVarsExtractor::new(),
            memo: Default::default(),
        }
    }

    pub fn substitute(&mut self, env: &Environment, e: ExprId) -> Result<ExprId, EvalError> {
        if self.map.is_empty() {
            return Ok(e);
        }
        self.walk(env, e)
    }
}

impl Walker for Substituter {
    type Output = ExprId;

    fn memo(&mut self) -> &mut Memo<ExprId> {
        &mut self.memo
    }

    fn pre_visit(&mut self, env: &Environment, id: ExprId, expr: &Expr) -> Result<Visit<ExprId>, EvalError> {
        if let Some(&value) = self.map.get(&id) {
            return Ok(Visit::Done(value));
        }
        if let Expr::Exists(vars, body) | Expr::Forall(vars, body) = expr {
            let mut inner = Substitution::new();
            for (&k, &v) in &self.map {
                let captured = self.free_vars.free_vars(env, k)?.iter().any(|fv| vars.contains(fv));
                if !captured {
                    inner.insert(k, v);
                }
            }
            if inner.len() < self.map.len() {
                let new_body = Substituter::new_unchecked(inner).substitute(env, *body)?;
                return Ok(Visit::Done(env.intern(expr.with_children(&[new_body]))?));
            }
        }
        Ok(Visit::Children)
    }

    fn visit(&mut self, env: &Environment, id: ExprId, expr: &Expr, args: &[ExprId]) -> Result<ExprId, EvalError> {
        rebuild(env, id, expr, args)
    }
}

/// Substitutes the keys of `map` in `e`.
pub fn substitute(env: &Environment, e: ExprId, map: Substitution) -> Result<ExprId, EvalError> {
    Substituter::new(env, map)?.substitute(env, e)
}
