use malachite::Rational;

use crate::{settings::PLANKIT_SIMPLIFY_STATIC, walkers::*, *};

/// Constant folding and normalization of expressions.
///
/// The result is equivalent to the input, and simplifying it again returns the same expression.
/// When a problem is given, static fluents applied to constant arguments are replaced by their
/// initial value (if one is known).
pub struct Simplifier<'pb> {
    problem: Option<&'pb Problem>,
    free_vars: FreeVarsExtractor,
    memo: Memo<ExprId>,
}

impl<'pb> Simplifier<'pb> {
    pub fn new(problem: Option<&'pb Problem>) -> Self {
        Simplifier {
            problem,
            free_vars: FreeVarsExtractor::new(),
            memo: Default::default(),
        }
    }

    pub fn simplify(&mut self, env: &Environment, e: ExprId) -> Result<ExprId, EvalError> {
        self.walk(env, e)
    }

    fn static_value(&self, env: &Environment, fluent: FluentId, e: ExprId, args: &[ExprId]) -> Option<ExprId> {
        let pb = self.problem?;
        if PLANKIT_SIMPLIFY_STATIC.get() && pb.is_static(fluent) && args.iter().all(|&a| env.is_constant(a)) {
            pb.initial_value(e)
        } else {
            None
        }
    }
}

impl Walker for Simplifier<'_> {
    type Output = ExprId;

    fn memo(&mut self) -> &mut Memo<ExprId> {
        &mut self.memo
    }

    fn visit(&mut self, env: &Environment, id: ExprId, expr: &Expr, args: &[ExprId]) -> Result<ExprId, EvalError> {
        match expr {
            Expr::Bool(_)
            | Expr::Int(_)
            | Expr::Real(_)
            | Expr::Object(_)
            | Expr::Param(_)
            | Expr::Var(_)
            | Expr::Timing(_)
            | Expr::Present(_) => Ok(id),
            Expr::Fluent(f, _) => {
                let e = rebuild(env, id, expr, args)?;
                Ok(self.static_value(env, *f, e, args).unwrap_or(e))
            }
            Expr::And(_) => simplify_and_or(env, args, true),
            Expr::Or(_) => simplify_and_or(env, args, false),
            Expr::Not(_) => simplify_not(env, args[0]),
            Expr::Implies(_, _) => {
                let (a, b) = (args[0], args[1]);
                match (env.bool_value(a), env.bool_value(b)) {
                    (Some(true), _) => Ok(b),
                    (Some(false), _) | (_, Some(true)) => Ok(env.bool(true)),
                    (_, Some(false)) => simplify_not(env, a),
                    _ if a == b => Ok(env.bool(true)),
                    _ => rebuild(env, id, expr, args),
                }
            }
            Expr::Iff(_, _) => {
                let (a, b) = (args[0], args[1]);
                match (env.bool_value(a), env.bool_value(b)) {
                    (Some(x), Some(y)) => Ok(env.bool(x == y)),
                    (Some(true), _) => Ok(b),
                    (_, Some(true)) => Ok(a),
                    (Some(false), _) => simplify_not(env, b),
                    (_, Some(false)) => simplify_not(env, a),
                    _ if a == b => Ok(env.bool(true)),
                    _ => rebuild(env, id, expr, args),
                }
            }
            Expr::Exists(vars, _) | Expr::Forall(vars, _) => {
                let body = args[0];
                if env.is_constant(body) {
                    return Ok(body);
                }
                let free = self.free_vars.free_vars(env, body)?;
                let used: Vec<Param> = vars.iter().filter(|v| free.contains(v)).cloned().collect();
                if used.is_empty() {
                    Ok(body)
                } else if matches!(expr, Expr::Exists(_, _)) {
                    Ok(env.exists(used, body)?)
                } else {
                    Ok(env.forall(used, body)?)
                }
            }
            Expr::Plus(_) => simplify_plus(env, args),
            Expr::Times(_) => simplify_times(env, args),
            Expr::Minus(_, _) => {
                let (a, b) = (args[0], args[1]);
                match (env.numeric_value(a), env.numeric_value(b)) {
                    (Some(x), Some(y)) => Ok(env.number(x - y)),
                    (_, Some(y)) if y == Rational::from(0) => Ok(a),
                    (_, Some(y)) if y < Rational::from(0) => simplify_plus(env, &[a, env.number(-y)]),
                    _ if a == b => Ok(env.int(0)),
                    _ => rebuild(env, id, expr, args),
                }
            }
            Expr::Div(_, _) => {
                let (a, b) = (args[0], args[1]);
                match (env.numeric_value(a), env.numeric_value(b)) {
                    (_, Some(y)) if y == Rational::from(0) => Err(EvalError::DivisionByZero((env / id).to_string())),
                    (Some(x), Some(y)) => Ok(env.number(x / y)),
                    _ => rebuild(env, id, expr, args),
                }
            }
            Expr::Le(_, _) | Expr::Lt(_, _) => {
                let (a, b) = (args[0], args[1]);
                let strict = matches!(expr, Expr::Lt(_, _));
                match (env.numeric_value(a), env.numeric_value(b)) {
                    (Some(x), Some(y)) => Ok(env.bool(if strict { x < y } else { x <= y })),
                    _ if a == b => Ok(env.bool(!strict)),
                    _ => rebuild(env, id, expr, args),
                }
            }
            Expr::Eq(_, _) => {
                let (a, b) = (args[0], args[1]);
                if a == b {
                    return Ok(env.bool(true));
                }
                if env.is_constant(a) && env.is_constant(b) {
                    // hash-consing makes equal constants identical, except for ints and reals
                    let equal = match (env.numeric_value(a), env.numeric_value(b)) {
                        (Some(x), Some(y)) => x == y,
                        _ => false,
                    };
                    return Ok(env.bool(equal));
                }
                if let (Type::User(ta), Type::User(tb)) = (env.tpe(a), env.tpe(b))
                    && !env.types.overlaps(ta, tb)
                {
                    return Ok(env.bool(false));
                }
                rebuild(env, id, expr, args)
            }
            Expr::Always(_)
            | Expr::Sometime(_)
            | Expr::AtMostOnce(_)
            | Expr::SometimeBefore(_, _)
            | Expr::SometimeAfter(_, _)
            | Expr::Dot(_, _) => rebuild(env, id, expr, args),
        }
    }
}

fn simplify_not(env: &Environment, arg: ExprId) -> Result<ExprId, EvalError> {
    Ok(env.negate(arg)?)
}

/// Conjunction (`is_and`) or disjunction of already simplified arguments.
fn simplify_and_or(env: &Environment, args: &[ExprId], is_and: bool) -> Result<ExprId, EvalError> {
    // value that is neutral for the operator, its negation is absorbing
    let neutral = is_and;
    let mut flat: Vec<ExprId> = Vec::with_capacity(args.len());
    let mut seen: hashbrown::HashSet<ExprId> = hashbrown::HashSet::new();
    let mut push = |e: ExprId, flat: &mut Vec<ExprId>| -> bool {
        match env.bool_value(e) {
            Some(b) if b == neutral => true,
            Some(_) => false,
            None => {
                if seen.insert(e) {
                    flat.push(e);
                }
                true
            }
        }
    };
    for &a in args {
        let node = env.node(a);
        let nested = match (node.expr(), is_and) {
            (Expr::And(sub), true) | (Expr::Or(sub), false) => Some(sub),
            _ => None,
        };
        let keep_going = match nested {
            Some(sub) => sub.iter().all(|&s| push(s, &mut flat)),
            None => push(a, &mut flat),
        };
        if !keep_going {
            return Ok(env.bool(!neutral));
        }
    }
    let contains_complement = flat.iter().any(|&e| match env.node(e).expr() {
        Expr::Not(inner) => flat.contains(inner),
        _ => false,
    });
    if contains_complement {
        return Ok(env.bool(!neutral));
    }
    match flat.len() {
        0 => Ok(env.bool(neutral)),
        1 => Ok(flat[0]),
        _ if is_and => Ok(env.and(flat)?),
        _ => Ok(env.or(flat)?),
    }
}

/// Splits the (flattened) operands of an associative operator into its non-constant operands and
/// the constants folded with `fold`.
fn accumulate(
    env: &Environment,
    args: &[ExprId],
    is_same_operator: impl Fn(&Expr) -> Option<SeqExprId>,
    init: Rational,
    fold: impl Fn(Rational, Rational) -> Rational,
) -> (Vec<ExprId>, Rational) {
    let mut operands = Vec::with_capacity(args.len());
    let mut acc = init;
    let mut add = |e: ExprId, operands: &mut Vec<ExprId>, acc: &mut Rational| match env.numeric_value(e) {
        Some(v) => *acc = fold(std::mem::replace(acc, Rational::from(0)), v),
        None => operands.push(e),
    };
    for &a in args {
        match is_same_operator(env.node(a).expr()) {
            Some(sub) => {
                for s in sub {
                    add(s, &mut operands, &mut acc)
                }
            }
            None => add(a, &mut operands, &mut acc),
        }
    }
    (operands, acc)
}

fn simplify_plus(env: &Environment, args: &[ExprId]) -> Result<ExprId, EvalError> {
    let same = |e: &Expr| match e {
        Expr::Plus(sub) => Some(sub.clone()),
        _ => None,
    };
    let (mut operands, constant) = accumulate(env, args, same, Rational::from(0), |a, b| a + b);
    if constant != Rational::from(0) || operands.is_empty() {
        operands.push(env.number(constant));
    }
    Ok(env.sum(operands)?)
}

fn simplify_times(env: &Environment, args: &[ExprId]) -> Result<ExprId, EvalError> {
    let same = |e: &Expr| match e {
        Expr::Times(sub) => Some(sub.clone()),
        _ => None,
    };
    let (mut operands, constant) = accumulate(env, args, same, Rational::from(1), |a, b| a * b);
    if constant == Rational::from(0) {
        return Ok(env.int(0));
    }
    if constant != Rational::from(1) || operands.is_empty() {
        operands.push(env.number(constant));
    }
    Ok(env.product(operands)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        env: Environment,
        p: ExprId,
        q: ExprId,
        x: ExprId,
        y: ExprId,
    }

    fn fixture() -> anyhow::Result<Fixture> {
        let mut env = Environment::new();
        let p = env.fluents.add_fluent("p", vec![], Type::Bool, None)?;
        let q = env.fluents.add_fluent("q", vec![], Type::Bool, None)?;
        let x = env.fluents.add_fluent("x", vec![], Type::INT, None)?;
        let y = env.fluents.add_fluent("y", vec![], Type::REAL, None)?;
        let (p, q) = (env.fluent(p, [])?, env.fluent(q, [])?);
        let (x, y) = (env.fluent(x, [])?, env.fluent(y, [])?);
        Ok(Fixture { env, p, q, x, y })
    }

    fn simplify(env: &Environment, e: ExprId) -> anyhow::Result<ExprId> {
        let res = Simplifier::new(None).simplify(env, e)?;
        // simplification is idempotent
        assert_eq!(Simplifier::new(None).simplify(env, res)?, res);
        Ok(res)
    }

    #[test]
    fn boolean_rules() -> anyhow::Result<()> {
        let Fixture { env, p, q, .. } = fixture()?;
        let t = env.bool(true);
        let f = env.bool(false);
        let not_p = env.not(p)?;

        assert_eq!(simplify(&env, env.and([p, t, q])?)?, env.and([p, q])?);
        assert_eq!(simplify(&env, env.and([p, f, q])?)?, f);
        assert_eq!(simplify(&env, env.or([p, t])?)?, t);
        assert_eq!(simplify(&env, env.or([f, f])?)?, f);
        assert_eq!(simplify(&env, env.and([p, env.and([q, p])?])?)?, env.and([p, q])?);
        assert_eq!(simplify(&env, env.and([p, q, not_p])?)?, f);
        assert_eq!(simplify(&env, env.or([not_p, q, p])?)?, t);
        assert_eq!(simplify(&env, env.not(not_p)?)?, p);
        assert_eq!(simplify(&env, env.implies(t, q)?)?, q);
        assert_eq!(simplify(&env, env.implies(p, f)?)?, not_p);
        assert_eq!(simplify(&env, env.implies(f, q)?)?, t);
        assert_eq!(simplify(&env, env.iff(p, f)?)?, not_p);
        assert_eq!(simplify(&env, env.iff(t, q)?)?, q);
        assert_eq!(simplify(&env, env.and([])?)?, t);
        Ok(())
    }

    #[test]
    fn arithmetic_rules() -> anyhow::Result<()> {
        let Fixture { env, x, y, .. } = fixture()?;
        let sum = env.plus([env.int(1), x, env.int(2), y])?;
        assert_eq!(simplify(&env, sum)?, env.plus([x, y, env.int(3)])?);
        let nested = env.plus([x, env.plus([env.int(1), y])?, env.int(-1)])?;
        assert_eq!(simplify(&env, nested)?, env.plus([x, y])?);
        assert_eq!(simplify(&env, env.plus([env.int(2), env.int(3)])?)?, env.int(5));
        assert_eq!(simplify(&env, env.times([x, env.int(0)])?)?, env.int(0));
        assert_eq!(simplify(&env, env.times([env.int(1), x])?)?, x);
        assert_eq!(simplify(&env, env.times([env.int(2), x, env.int(3)])?)?, env.times([x, env.int(6)])?);

        // a negative constant is subtracted by adding its opposite
        assert_eq!(simplify(&env, env.minus(x, env.int(-3))?)?, env.plus([x, env.int(3)])?);
        assert_eq!(simplify(&env, env.minus(x, env.int(0))?)?, x);
        assert_eq!(simplify(&env, env.minus(env.int(3), env.int(5))?)?, env.int(-2));
        assert_eq!(simplify(&env, env.minus(x, env.int(2))?)?, env.minus(x, env.int(2))?);

        assert_eq!(simplify(&env, env.div(env.int(6), env.int(3))?)?, env.int(2));
        assert_eq!(
            simplify(&env, env.div(env.int(3), env.int(6))?)?,
            env.real(Rational::from_signeds(1, 2))
        );
        let by_zero = env.div(x, env.int(0))?;
        assert!(matches!(
            Simplifier::new(None).simplify(&env, by_zero),
            Err(EvalError::DivisionByZero(_))
        ));
        Ok(())
    }

    #[test]
    fn comparisons() -> anyhow::Result<()> {
        let Fixture { mut env, x, .. } = fixture()?;
        let (t, f) = (env.bool(true), env.bool(false));
        let half = env.real(Rational::from_signeds(1, 2));
        assert_eq!(simplify(&env, env.le(env.int(1), env.int(1))?)?, t);
        assert_eq!(simplify(&env, env.lt(env.int(1), env.int(1))?)?, f);
        assert_eq!(simplify(&env, env.lt(half, env.int(1))?)?, t);
        assert_eq!(simplify(&env, env.eq(env.int(2), env.real(Rational::from(2)))?)?, t);
        assert_eq!(simplify(&env, env.eq(x, x)?)?, t);
        assert_eq!(simplify(&env, env.le(x, env.int(3))?)?, env.le(x, env.int(3))?);

        let robot = env.types.add_type("robot", None)?;
        let loc = env.types.add_type("location", None)?;
        let r1 = env.objects.add_object("r1", robot)?;
        let r2 = env.objects.add_object("r2", robot)?;
        let pos = env.fluents.add_fluent("pos", vec![], Type::User(loc), None)?;
        let carried = env.fluents.add_fluent("carried", vec![], Type::User(robot), None)?;
        let pos = env.fluent(pos, [])?;
        let carried = env.fluent(carried, [])?;
        assert_eq!(simplify(&env, env.eq(env.object(r1), env.object(r2))?)?, f);
        assert_eq!(simplify(&env, env.eq(pos, carried)?)?, f);
        assert_eq!(simplify(&env, env.eq(carried, env.object(r1))?)?, env.eq(carried, env.object(r1))?);
        Ok(())
    }

    #[test]
    fn quantifiers_drop_unused_variables() -> anyhow::Result<()> {
        let Fixture { mut env, p, .. } = fixture()?;
        let loc = env.types.add_type("location", None)?;
        let at = env.fluents.add_fluent("at", vec![Param::new("l", Type::User(loc))], Type::Bool, None)?;
        let a = Param::new("a", Type::User(loc));
        let b = Param::new("b", Type::User(loc));
        let at_a = env.fluent(at, [env.var(&a)])?;

        let q = env.exists(vec![a.clone(), b], env.and([at_a, env.bool(true)])?)?;
        assert_eq!(simplify(&env, q)?, env.exists(vec![a], at_a)?);
        let q = env.forall(vec![Param::new("c", Type::User(loc))], p)?;
        assert_eq!(simplify(&env, q)?, p);
        Ok(())
    }

    #[test]
    fn trajectory_constraints_are_kept() -> anyhow::Result<()> {
        let Fixture { env, p, .. } = fixture()?;
        let always = env.always(env.and([p, env.bool(true)])?)?;
        assert_eq!(simplify(&env, always)?, env.always(p)?);
        Ok(())
    }
}
