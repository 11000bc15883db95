use std::{
    cell::RefCell,
    rc::Rc,
    sync::atomic::{AtomicU32, Ordering},
};

use idmap::DirectIdMap;
use malachite::{Integer, Rational};

use crate::*;

/// Identifies an [Environment], to detect values that were created in another one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnvId(u32);

static NEXT_ENV_ID: AtomicU32 = AtomicU32::new(0);

#[derive(Default)]
struct Arena {
    nodes: DirectIdMap<ExprId, Rc<ExprNode>>,
    /// Hash-consing table: each structurally distinct expression is stored once.
    interned: hashbrown::HashMap<Expr, ExprId>,
    next_expr_id: u32,
}

/// Owner of all entities of a problem: types, objects, fluents and expressions.
///
/// Expressions are hash-consed: building an expression that is structurally equal to an existing
/// one returns the existing [ExprId]. Hence two expressions are equal iff their ids are equal.
/// The arena only grows, which allows interning new expressions through a shared reference.
pub struct Environment {
    id: EnvId,
    pub types: Types,
    pub objects: Objects,
    pub fluents: Fluents,
    exprs: RefCell<Arena>,
}

#[derive(Copy, Clone)]
pub struct Env<'a, T> {
    pub elem: T,
    pub env: &'a Environment,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::with_types(Types::new())
    }

    pub fn with_types(types: Types) -> Self {
        Self {
            id: EnvId(NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed)),
            types,
            objects: Default::default(),
            fluents: Default::default(),
            exprs: Default::default(),
        }
    }

    pub fn id(&self) -> EnvId {
        self.id
    }

    /// Returns the node associated with the expression.
    ///
    /// # Panics
    ///
    /// If the id was not created by this environment.
    pub fn node(&self, id: ExprId) -> Rc<ExprNode> {
        self.exprs
            .borrow()
            .nodes
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("expression {id:?} does not belong to this environment"))
    }

    pub fn contains(&self, id: ExprId) -> bool {
        self.exprs.borrow().nodes.contains_key(id)
    }

    pub fn tpe(&self, id: ExprId) -> Type {
        self.node(id).tpe().clone()
    }

    pub fn kind(&self, id: ExprId) -> OperatorKind {
        self.node(id).expr().kind()
    }

    pub fn is_constant(&self, id: ExprId) -> bool {
        self.kind(id).is_constant()
    }

    pub fn bool_value(&self, id: ExprId) -> Option<bool> {
        self.node(id).expr().bool_value()
    }

    pub fn numeric_value(&self, id: ExprId) -> Option<Rational> {
        self.node(id).expr().numeric_value()
    }

    /// Number of distinct expressions in the arena.
    pub fn num_exprs(&self) -> usize {
        self.exprs.borrow().nodes.len()
    }

    /// Returns the unique id of the expression, creating it if it does not exist yet.
    pub fn intern(&self, expr: Expr) -> Result<ExprId, TypeError> {
        if let Some(&id) = self.exprs.borrow().interned.get(&expr) {
            return Ok(id);
        }
        // type checking reads the children, the arena must not be borrowed mutably yet
        let tpe = expr.tpe(self)?;
        let mut arena = self.exprs.borrow_mut();
        let id = ExprId(arena.next_expr_id);
        arena.next_expr_id += 1;
        arena.interned.insert(expr.clone(), id);
        let res = arena.nodes.insert(id, Rc::new(ExprNode::new(expr, tpe)));
        debug_assert!(res.is_none());
        Ok(id)
    }

    fn constant(&self, expr: Expr) -> ExprId {
        match self.intern(expr) {
            Ok(id) => id,
            Err(e) => unreachable!("leaf expressions are always well typed: {e}"),
        }
    }

    pub fn bool(&self, value: bool) -> ExprId {
        self.constant(Expr::Bool(value))
    }

    pub fn int(&self, value: impl Into<Integer>) -> ExprId {
        self.constant(Expr::Int(value.into()))
    }

    pub fn real(&self, value: Rational) -> ExprId {
        self.constant(Expr::Real(value))
    }

    /// Numeric constant, represented as an integer when the value is integral.
    pub fn number(&self, value: Rational) -> ExprId {
        match Integer::try_from(&value) {
            Ok(i) => self.int(i),
            Err(_) => self.real(value),
        }
    }

    pub fn object(&self, object: ObjectId) -> ExprId {
        self.constant(Expr::Object(object))
    }

    pub fn param(&self, param: &Param) -> ExprId {
        self.constant(Expr::Param(param.clone()))
    }

    pub fn var(&self, var: &Param) -> ExprId {
        self.constant(Expr::Var(var.clone()))
    }

    pub fn timing(&self, t: Timestamp) -> ExprId {
        self.constant(Expr::Timing(t))
    }

    pub fn present(&self, action: impl Into<Sym>) -> ExprId {
        self.constant(Expr::Present(action.into()))
    }

    pub fn fluent(&self, fluent: FluentId, args: impl IntoIterator<Item = ExprId>) -> Result<ExprId, TypeError> {
        self.intern(Expr::Fluent(fluent, args.into_iter().collect()))
    }

    pub fn and(&self, args: impl IntoIterator<Item = ExprId>) -> Result<ExprId, TypeError> {
        self.intern(Expr::And(args.into_iter().collect()))
    }

    pub fn or(&self, args: impl IntoIterator<Item = ExprId>) -> Result<ExprId, TypeError> {
        self.intern(Expr::Or(args.into_iter().collect()))
    }

    pub fn not(&self, e: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Not(e))
    }

    pub fn implies(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Implies(a, b))
    }

    pub fn iff(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Iff(a, b))
    }

    pub fn exists(&self, vars: Vec<Param>, body: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Exists(vars, body))
    }

    pub fn forall(&self, vars: Vec<Param>, body: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Forall(vars, body))
    }

    pub fn plus(&self, args: impl IntoIterator<Item = ExprId>) -> Result<ExprId, TypeError> {
        self.intern(Expr::Plus(args.into_iter().collect()))
    }

    pub fn minus(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Minus(a, b))
    }

    pub fn times(&self, args: impl IntoIterator<Item = ExprId>) -> Result<ExprId, TypeError> {
        self.intern(Expr::Times(args.into_iter().collect()))
    }

    pub fn div(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Div(a, b))
    }

    pub fn le(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Le(a, b))
    }

    pub fn lt(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Lt(a, b))
    }

    pub fn ge(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.le(b, a)
    }

    pub fn gt(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.lt(b, a)
    }

    pub fn eq(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Eq(a, b))
    }

    pub fn always(&self, e: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Always(e))
    }

    pub fn sometime(&self, e: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Sometime(e))
    }

    pub fn at_most_once(&self, e: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::AtMostOnce(e))
    }

    pub fn sometime_before(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::SometimeBefore(a, b))
    }

    pub fn sometime_after(&self, a: ExprId, b: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::SometimeAfter(a, b))
    }

    pub fn dot(&self, agent: impl Into<Sym>, e: ExprId) -> Result<ExprId, TypeError> {
        self.intern(Expr::Dot(agent.into(), e))
    }

    /// Negation of a boolean constant or expression, without creating a double negation.
    pub fn negate(&self, e: ExprId) -> Result<ExprId, TypeError> {
        match self.node(e).expr() {
            Expr::Bool(b) => Ok(self.bool(!b)),
            Expr::Not(inner) => Ok(*inner),
            _ => self.intern(Expr::Not(e)),
        }
    }

    /// Conjunction that avoids building a node for the trivial cases.
    pub fn conjunction(&self, args: Vec<ExprId>) -> Result<ExprId, TypeError> {
        match args.len() {
            0 => Ok(self.bool(true)),
            1 => {
                Type::Bool.accepts(args[0], self)?;
                Ok(args[0])
            }
            _ => self.intern(Expr::And(args.into())),
        }
    }

    /// Disjunction that avoids building a node for the trivial cases.
    pub fn disjunction(&self, args: Vec<ExprId>) -> Result<ExprId, TypeError> {
        match args.len() {
            0 => Ok(self.bool(false)),
            1 => {
                Type::Bool.accepts(args[0], self)?;
                Ok(args[0])
            }
            _ => self.intern(Expr::Or(args.into())),
        }
    }

    /// Sum of the arguments, without creating a node for zero or one argument.
    pub(crate) fn sum(&self, args: Vec<ExprId>) -> Result<ExprId, TypeError> {
        match args.len() {
            0 => Ok(self.int(0)),
            1 => Ok(args[0]),
            _ => self.intern(Expr::Plus(smallvec::SmallVec::from_vec(args))),
        }
    }

    pub(crate) fn product(&self, args: Vec<ExprId>) -> Result<ExprId, TypeError> {
        match args.len() {
            0 => Ok(self.int(1)),
            1 => Ok(args[0]),
            _ => self.intern(Expr::Times(smallvec::SmallVec::from_vec(args))),
        }
    }
}

impl<'a, T> std::ops::Div<T> for &'a Environment {
    type Output = Env<'a, T>;

    fn div(self, rhs: T) -> Self::Output {
        Env { elem: rhs, env: self }
    }
}

impl<'a, T> std::ops::Div<T> for &'a mut Environment {
    type Output = Env<'a, T>;

    fn div(self, rhs: T) -> Self::Output {
        Env { elem: rhs, env: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_consing() -> anyhow::Result<()> {
        let env = Environment::new();
        let a = env.int(3);
        let b = env.int(3);
        assert_eq!(a, b);
        let x = env.plus([a, env.int(2)])?;
        let y = env.plus([b, env.int(2)])?;
        assert_eq!(x, y);
        let size = env.num_exprs();
        env.plus([a, env.int(2)])?;
        assert_eq!(env.num_exprs(), size);
        // children order matters
        assert_ne!(env.plus([env.int(2), a])?, x);
        // int and real constants are distinct nodes
        assert_ne!(env.int(1), env.real(Rational::from(1)));
        Ok(())
    }

    #[test]
    fn ill_typed_expressions_are_rejected() -> anyhow::Result<()> {
        let env = Environment::new();
        let before = env.num_exprs();
        let one = env.int(1);
        assert!(env.not(one).is_err());
        assert!(env.le(env.bool(true), one).is_err());
        // only the valid constants were added
        assert_eq!(env.num_exprs(), before + 2);
        Ok(())
    }

    #[test]
    fn numbers_are_normalized() {
        let env = Environment::new();
        assert_eq!(env.number(Rational::from(4)), env.int(4));
        assert_eq!(env.number(Rational::from(-4)), env.int(-4));
        let half = Rational::from_signeds(1, 2);
        assert_eq!(env.number(half.clone()), env.real(half));
    }

    #[test]
    fn environments_are_distinct() {
        let e1 = Environment::new();
        let e2 = Environment::new();
        assert_ne!(e1.id(), e2.id());
    }
}
