use derive_more::derive::Display;
use idmap::IntegerId;
use itertools::Itertools;
use malachite::{Integer, Rational};
use smallvec::{SmallVec, smallvec};

use crate::{
    env::{Env, Environment},
    *,
};

pub type IntValue = i64;

/// Identifier of an expression node, only meaningful in the [Environment] that created it.
#[derive(Debug, PartialEq, PartialOrd, Ord, Eq, Hash, Clone, Copy)]
pub struct ExprId(pub(crate) u32);

pub type SeqExprId = SmallVec<[ExprId; 3]>;

impl IntegerId for ExprId {
    fn from_id(id: u64) -> Self {
        assert!(id <= (u32::MAX as u64));
        ExprId(id as u32)
    }

    fn id(&self) -> u64 {
        self.0 as u64
    }

    fn id32(&self) -> u32 {
        self.0
    }
}

/// Discriminant of an [Expr], used for dispatching and for computing the features of a problem.
#[derive(Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum OperatorKind {
    #[display("and")]
    And,
    #[display("or")]
    Or,
    #[display("not")]
    Not,
    #[display("implies")]
    Implies,
    #[display("iff")]
    Iff,
    #[display("exists")]
    Exists,
    #[display("forall")]
    Forall,
    #[display("fluent")]
    FluentRef,
    #[display("parameter")]
    ParameterRef,
    #[display("variable")]
    VariableRef,
    #[display("object")]
    ObjectRef,
    #[display("timing")]
    TimingRef,
    #[display("presence")]
    PresenceRef,
    #[display("bool-constant")]
    BoolConst,
    #[display("int-constant")]
    IntConst,
    #[display("real-constant")]
    RealConst,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Times,
    #[display("/")]
    Div,
    #[display("<=")]
    Le,
    #[display("<")]
    Lt,
    #[display("==")]
    Equals,
    #[display("always")]
    Always,
    #[display("sometime")]
    Sometime,
    #[display("at-most-once")]
    AtMostOnce,
    #[display("sometime-before")]
    SometimeBefore,
    #[display("sometime-after")]
    SometimeAfter,
    #[display("dot")]
    Dot,
}

impl OperatorKind {
    pub fn is_constant(self) -> bool {
        use OperatorKind::*;
        matches!(self, BoolConst | IntConst | RealConst | ObjectRef)
    }

    pub fn is_quantifier(self) -> bool {
        matches!(self, OperatorKind::Exists | OperatorKind::Forall)
    }

    pub fn is_trajectory_constraint(self) -> bool {
        use OperatorKind::*;
        matches!(self, Always | Sometime | AtMostOnce | SometimeBefore | SometimeAfter)
    }
}

/// A node of the expression DAG. Children are referenced through their [ExprId] in the
/// environment's arena, which allows sharing identical sub-expressions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Bool(bool),
    Int(Integer),
    Real(Rational),
    Object(ObjectId),
    /// Reference to a parameter of the enclosing action
    Param(Param),
    /// Reference to a variable bound by an enclosing quantifier
    Var(Param),
    Fluent(FluentId, SeqExprId),
    Timing(Timestamp),
    Present(Sym),
    And(SeqExprId),
    Or(SeqExprId),
    Not(ExprId),
    Implies(ExprId, ExprId),
    Iff(ExprId, ExprId),
    Exists(Vec<Param>, ExprId),
    Forall(Vec<Param>, ExprId),
    Plus(SeqExprId),
    Minus(ExprId, ExprId),
    Times(SeqExprId),
    Div(ExprId, ExprId),
    Le(ExprId, ExprId),
    Lt(ExprId, ExprId),
    Eq(ExprId, ExprId),
    Always(ExprId),
    Sometime(ExprId),
    AtMostOnce(ExprId),
    SometimeBefore(ExprId, ExprId),
    SometimeAfter(ExprId, ExprId),
    /// Expression qualified by the agent that evaluates it
    Dot(Sym, ExprId),
}

impl Expr {
    pub fn kind(&self) -> OperatorKind {
        use OperatorKind as K;
        match self {
            Expr::Bool(_) => K::BoolConst,
            Expr::Int(_) => K::IntConst,
            Expr::Real(_) => K::RealConst,
            Expr::Object(_) => K::ObjectRef,
            Expr::Param(_) => K::ParameterRef,
            Expr::Var(_) => K::VariableRef,
            Expr::Fluent(_, _) => K::FluentRef,
            Expr::Timing(_) => K::TimingRef,
            Expr::Present(_) => K::PresenceRef,
            Expr::And(_) => K::And,
            Expr::Or(_) => K::Or,
            Expr::Not(_) => K::Not,
            Expr::Implies(_, _) => K::Implies,
            Expr::Iff(_, _) => K::Iff,
            Expr::Exists(_, _) => K::Exists,
            Expr::Forall(_, _) => K::Forall,
            Expr::Plus(_) => K::Plus,
            Expr::Minus(_, _) => K::Minus,
            Expr::Times(_) => K::Times,
            Expr::Div(_, _) => K::Div,
            Expr::Le(_, _) => K::Le,
            Expr::Lt(_, _) => K::Lt,
            Expr::Eq(_, _) => K::Equals,
            Expr::Always(_) => K::Always,
            Expr::Sometime(_) => K::Sometime,
            Expr::AtMostOnce(_) => K::AtMostOnce,
            Expr::SometimeBefore(_, _) => K::SometimeBefore,
            Expr::SometimeAfter(_, _) => K::SometimeAfter,
            Expr::Dot(_, _) => K::Dot,
        }
    }

    /// Direct sub-expressions, in order.
    pub fn children(&self) -> SeqExprId {
        match self {
            Expr::Bool(_)
            | Expr::Int(_)
            | Expr::Real(_)
            | Expr::Object(_)
            | Expr::Param(_)
            | Expr::Var(_)
            | Expr::Timing(_)
            | Expr::Present(_) => SmallVec::new(),
            Expr::Fluent(_, args) | Expr::And(args) | Expr::Or(args) | Expr::Plus(args) | Expr::Times(args) => {
                args.clone()
            }
            Expr::Not(a)
            | Expr::Exists(_, a)
            | Expr::Forall(_, a)
            | Expr::Always(a)
            | Expr::Sometime(a)
            | Expr::AtMostOnce(a)
            | Expr::Dot(_, a) => smallvec![*a],
            Expr::Implies(a, b)
            | Expr::Iff(a, b)
            | Expr::Minus(a, b)
            | Expr::Div(a, b)
            | Expr::Le(a, b)
            | Expr::Lt(a, b)
            | Expr::Eq(a, b)
            | Expr::SometimeBefore(a, b)
            | Expr::SometimeAfter(a, b) => smallvec![*a, *b],
        }
    }

    /// Builds an expression with the same operator and payload but with the given children.
    pub fn with_children(&self, children: &[ExprId]) -> Expr {
        debug_assert_eq!(children.len(), self.children().len());
        let seq = || SeqExprId::from_slice(children);
        match self {
            Expr::Bool(_)
            | Expr::Int(_)
            | Expr::Real(_)
            | Expr::Object(_)
            | Expr::Param(_)
            | Expr::Var(_)
            | Expr::Timing(_)
            | Expr::Present(_) => self.clone(),
            Expr::Fluent(f, _) => Expr::Fluent(*f, seq()),
            Expr::And(_) => Expr::And(seq()),
            Expr::Or(_) => Expr::Or(seq()),
            Expr::Plus(_) => Expr::Plus(seq()),
            Expr::Times(_) => Expr::Times(seq()),
            Expr::Not(_) => Expr::Not(children[0]),
            Expr::Exists(vars, _) => Expr::Exists(vars.clone(), children[0]),
            Expr::Forall(vars, _) => Expr::Forall(vars.clone(), children[0]),
            Expr::Always(_) => Expr::Always(children[0]),
            Expr::Sometime(_) => Expr::Sometime(children[0]),
            Expr::AtMostOnce(_) => Expr::AtMostOnce(children[0]),
            Expr::Dot(agent, _) => Expr::Dot(agent.clone(), children[0]),
            Expr::Implies(_, _) => Expr::Implies(children[0], children[1]),
            Expr::Iff(_, _) => Expr::Iff(children[0], children[1]),
            Expr::Minus(_, _) => Expr::Minus(children[0], children[1]),
            Expr::Div(_, _) => Expr::Div(children[0], children[1]),
            Expr::Le(_, _) => Expr::Le(children[0], children[1]),
            Expr::Lt(_, _) => Expr::Lt(children[0], children[1]),
            Expr::Eq(_, _) => Expr::Eq(children[0], children[1]),
            Expr::SometimeBefore(_, _) => Expr::SometimeBefore(children[0], children[1]),
            Expr::SometimeAfter(_, _) => Expr::SometimeAfter(children[0], children[1]),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.kind().is_constant()
    }

    pub fn bool_value(&self) -> Option<bool> {
        match self {
            Expr::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Value of a numeric constant, as an exact rational.
    pub fn numeric_value(&self) -> Option<Rational> {
        match self {
            Expr::Int(i) => Some(Rational::from(i)),
            Expr::Real(r) => Some(r.clone()),
            _ => None,
        }
    }

    /// Infers the type of the expression, checking that all children have an appropriate type.
    pub fn tpe(&self, env: &Environment) -> Result<Type, TypeError> {
        match self {
            Expr::Bool(_) => Ok(Type::Bool),
            Expr::Int(i) => Ok(match IntValue::try_from(i) {
                Ok(v) => Type::Int(IntInterval::singleton(v)),
                Err(_) => Type::INT,
            }),
            Expr::Real(r) => Ok(Type::Real(RealInterval::new(Some(r.clone()), Some(r.clone())))),
            Expr::Object(o) => Ok(Type::User(env.objects.object(*o).tpe())),
            Expr::Param(p) | Expr::Var(p) => Ok(p.tpe().clone()),
            Expr::Fluent(f, args) => env.fluents.fluent(*f).return_type(args, env),
            Expr::Timing(_) => Ok(Type::REAL),
            Expr::Present(_) => Ok(Type::Bool),
            Expr::And(args) | Expr::Or(args) => {
                all_bool(args, env)?;
                Ok(Type::Bool)
            }
            Expr::Not(a) | Expr::Always(a) | Expr::Sometime(a) | Expr::AtMostOnce(a) => {
                all_bool(&[*a], env)?;
                Ok(Type::Bool)
            }
            Expr::Implies(a, b) | Expr::Iff(a, b) | Expr::SometimeBefore(a, b) | Expr::SometimeAfter(a, b) => {
                all_bool(&[*a, *b], env)?;
                Ok(Type::Bool)
            }
            Expr::Exists(_, body) | Expr::Forall(_, body) => {
                all_bool(&[*body], env)?;
                Ok(Type::Bool)
            }
            Expr::Plus(args) | Expr::Times(args) => {
                if all_numeric(args, env)? {
                    Ok(Type::INT)
                } else {
                    Ok(Type::REAL)
                }
            }
            Expr::Minus(a, b) => {
                if all_numeric(&[*a, *b], env)? {
                    Ok(Type::INT)
                } else {
                    Ok(Type::REAL)
                }
            }
            Expr::Div(a, b) => {
                all_numeric(&[*a, *b], env)?;
                Ok(Type::REAL)
            }
            Expr::Le(a, b) | Expr::Lt(a, b) => {
                all_numeric(&[*a, *b], env)?;
                Ok(Type::Bool)
            }
            Expr::Eq(a, b) => {
                let (ta, tb) = (env.tpe(*a), env.tpe(*b));
                let comparable = (ta.is_numeric() && tb.is_numeric())
                    || (ta.is_bool() && tb.is_bool())
                    || (ta.is_user() && tb.is_user());
                if comparable {
                    Ok(Type::Bool)
                } else {
                    Err(TypeError::incompatible(env, *b, &ta))
                }
            }
            Expr::Dot(_, e) => Ok(env.tpe(*e)),
        }
    }
}

fn all_bool(args: &[ExprId], env: &Environment) -> Result<(), TypeError> {
    for a in args {
        Type::Bool.accepts(*a, env)?;
    }
    Ok(())
}

/// Checks that all arguments are numeric and returns true if they are all integers.
fn all_numeric(args: &[ExprId], env: &Environment) -> Result<bool, TypeError> {
    let mut all_int = true;
    for &a in args {
        match env.tpe(a) {
            Type::Int(_) => {}
            Type::Real(_) => all_int = false,
            _ => return Err(TypeError::incompatible(env, a, &Type::REAL)),
        }
    }
    Ok(all_int)
}

/// Node stored in the arena: the expression and its (already checked) type.
#[derive(Debug)]
pub struct ExprNode {
    expr: Expr,
    tpe: Type,
}

impl ExprNode {
    pub(crate) fn new(expr: Expr, tpe: Type) -> Self {
        Self { expr, tpe }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn tpe(&self) -> &Type {
        &self.tpe
    }
}

pub type TExpr<'env> = Env<'env, ExprId>;

impl<'a> Debug for TExpr<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl<'a> Display for TExpr<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env = self.env;
        let node = env.node(self.elem);
        let disp = |e: &ExprId| env / *e;
        let infix = |f: &mut std::fmt::Formatter<'_>, op: &str, args: &[ExprId]| {
            write!(f, "({})", args.iter().map(disp).format(&format!(" {op} ")))
        };
        match node.expr() {
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Int(i) => write!(f, "{i}"),
            Expr::Real(r) => write!(f, "{r}"),
            Expr::Object(o) => write!(f, "{}", env.objects.object(*o).name()),
            Expr::Param(p) | Expr::Var(p) => write!(f, "{}", p.name()),
            Expr::Fluent(fluent, args) => {
                write!(f, "{}", env.fluents.fluent(*fluent).name())?;
                if !args.is_empty() {
                    write!(f, "({})", args.iter().map(disp).format(", "))?;
                }
                Ok(())
            }
            Expr::Timing(t) => write!(f, "{t}"),
            Expr::Present(s) => write!(f, "present({s})"),
            Expr::And(args) if args.is_empty() => write!(f, "true"),
            Expr::Or(args) if args.is_empty() => write!(f, "false"),
            Expr::And(args) => infix(f, "and", args),
            Expr::Or(args) => infix(f, "or", args),
            Expr::Not(a) => write!(f, "(not {})", disp(a)),
            Expr::Implies(a, b) => infix(f, "implies", &[*a, *b]),
            Expr::Iff(a, b) => infix(f, "iff", &[*a, *b]),
            Expr::Exists(vars, body) | Expr::Forall(vars, body) => write!(
                f,
                "{} ({}) {}",
                node.expr().kind(),
                vars.iter().map(|v| env / v).format(", "),
                disp(body)
            ),
            Expr::Plus(args) => infix(f, "+", args),
            Expr::Times(args) => infix(f, "*", args),
            Expr::Minus(a, b) => infix(f, "-", &[*a, *b]),
            Expr::Div(a, b) => infix(f, "/", &[*a, *b]),
            Expr::Le(a, b) => infix(f, "<=", &[*a, *b]),
            Expr::Lt(a, b) => infix(f, "<", &[*a, *b]),
            Expr::Eq(a, b) => infix(f, "==", &[*a, *b]),
            Expr::Always(a) | Expr::Sometime(a) | Expr::AtMostOnce(a) => {
                write!(f, "{}({})", node.expr().kind(), disp(a))
            }
            Expr::SometimeBefore(a, b) | Expr::SometimeAfter(a, b) => {
                write!(f, "{}({}, {})", node.expr().kind(), disp(a), disp(b))
            }
            Expr::Dot(agent, e) => write!(f, "{agent}.{}", disp(e)),
        }
    }
}
