use std::{collections::BTreeSet, rc::Rc};

use crate::{walkers::*, *};

/// Quantified variables that occur free in an expression, in order of first occurrence.
#[derive(Default)]
pub struct FreeVarsExtractor {
    memo: Memo<Rc<Vec<Param>>>,
}

impl FreeVarsExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn free_vars(&mut self, env: &Environment, e: ExprId) -> Result<Rc<Vec<Param>>, EvalError> {
        self.walk(env, e)
    }
}

impl Walker for FreeVarsExtractor {
    type Output = Rc<Vec<Param>>;

    fn memo(&mut self) -> &mut Memo<Self::Output> {
        &mut self.memo
    }

    fn visit(
        &mut self,
        _: &Environment,
        _: ExprId,
        expr: &Expr,
        args: &[Self::Output],
    ) -> Result<Self::Output, EvalError> {
        Ok(match expr {
            Expr::Var(v) => Rc::new(vec![v.clone()]),
            Expr::Exists(vars, _) | Expr::Forall(vars, _) => {
                let body = &args[0];
                if body.iter().any(|v| vars.contains(v)) {
                    Rc::new(body.iter().filter(|v| !vars.contains(v)).cloned().collect())
                } else {
                    body.clone()
                }
            }
            _ => match args {
                [] => Rc::new(Vec::new()),
                [single] => single.clone(),
                _ => {
                    let mut vars: Vec<Param> = Vec::new();
                    for v in args.iter().flat_map(|a| a.iter()) {
                        if !vars.contains(v) {
                            vars.push(v.clone());
                        }
                    }
                    Rc::new(vars)
                }
            },
        })
    }
}

/// Fluents referenced in an expression.
#[derive(Default)]
pub struct FluentsExtractor {
    memo: Memo<Rc<BTreeSet<FluentId>>>,
}

impl FluentsExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fluents(&mut self, env: &Environment, e: ExprId) -> Result<Rc<BTreeSet<FluentId>>, EvalError> {
        self.walk(env, e)
    }
}

impl Walker for FluentsExtractor {
    type Output = Rc<BTreeSet<FluentId>>;

    fn memo(&mut self) -> &mut Memo<Self::Output> {
        &mut self.memo
    }

    fn visit(
        &mut self,
        _: &Environment,
        _: ExprId,
        expr: &Expr,
        args: &[Self::Output],
    ) -> Result<Self::Output, EvalError> {
        let mut set: BTreeSet<FluentId> = BTreeSet::new();
        if let Expr::Fluent(f, _) = expr {
            set.insert(*f);
        } else if let [single] = args {
            return Ok(single.clone());
        }
        for a in args {
            set.extend(a.iter().copied());
        }
        Ok(Rc::new(set))
    }
}

/// Kinds of the operators appearing in an expression.
#[derive(Default)]
pub struct OperatorsExtractor {
    memo: Memo<Rc<BTreeSet<OperatorKind>>>,
}

impl OperatorsExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operators(&mut self, env: &Environment, e: ExprId) -> Result<Rc<BTreeSet<OperatorKind>>, EvalError> {
        self.walk(env, e)
    }
}

impl Walker for OperatorsExtractor {
    type Output = Rc<BTreeSet<OperatorKind>>;

    fn memo(&mut self) -> &mut Memo<Self::Output> {
        &mut self.memo
    }

    fn visit(
        &mut self,
        _: &Environment,
        _: ExprId,
        expr: &Expr,
        args: &[Self::Output],
    ) -> Result<Self::Output, EvalError> {
        let mut set: BTreeSet<OperatorKind> = args.iter().flat_map(|a| a.iter().copied()).collect();
        set.insert(expr.kind());
        Ok(Rc::new(set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_variables() -> anyhow::Result<()> {
        let mut env = Environment::new();
        let loc = env.types.add_type("location", None)?;
        let at = env.fluents.add_fluent("at", vec![Param::new("l", Type::User(loc))], Type::Bool, None)?;
        let x = Param::new("x", Type::User(loc));
        let y = Param::new("y", Type::User(loc));
        let at_x = env.fluent(at, [env.var(&x)])?;
        let at_y = env.fluent(at, [env.var(&y)])?;
        let body = env.and([at_x, at_y])?;
        let q = env.exists(vec![x.clone()], body)?;

        let mut extractor = FreeVarsExtractor::new();
        assert_eq!(*extractor.free_vars(&env, body)?, vec![x.clone(), y.clone()]);
        assert_eq!(*extractor.free_vars(&env, q)?, vec![y.clone()]);
        let closed = env.forall(vec![y], q)?;
        assert!(extractor.free_vars(&env, closed)?.is_empty());

        let mut fluents = FluentsExtractor::new();
        assert_eq!(fluents.fluents(&env, closed)?.iter().copied().collect::<Vec<_>>(), vec![at]);
        let mut operators = OperatorsExtractor::new();
        let ops = operators.operators(&env, q)?;
        assert!(ops.contains(&OperatorKind::Exists));
        assert!(ops.contains(&OperatorKind::VariableRef));
        assert!(!ops.contains(&OperatorKind::Forall));
        Ok(())
    }
}
