use crate::*;
use malachite::{Integer, Rational};
use std::fmt::Debug;
use thiserror::Error;
use Type::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown type `{0}`")]
    UnknownType(Sym),
    #[error("duplicate type declaration `{0}`")]
    DuplicateType(Sym),
    #[error("`{expr}` has type `{found}` but type `{expected}` was expected")]
    IncompatibleType {
        expr: String,
        found: String,
        expected: String,
    },
    #[error("missing argument for parameter `{0}`")]
    MissingParameter(Sym),
    #[error("unexpected argument `{0}`")]
    UnexpectedArgument(String),
    #[error("empty interval [{0}, {1}]")]
    EmptyInterval(String, String),
}

impl TypeError {
    pub(crate) fn incompatible(env: &Environment, expr: ExprId, expected: &Type) -> Self {
        TypeError::IncompatibleType {
            expr: (env / expr).to_string(),
            found: (env / env.tpe(expr)).to_string(),
            expected: (env / expected).to_string(),
        }
    }
}

/// Identifier of a user type, as declared in [Types].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserTypeId(u32);

impl UserTypeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Single inheritance hierarchy of user types.
#[derive(Clone, Debug, Default)]
pub struct Types {
    names: Vec<Sym>,
    parents: Vec<Option<UserTypeId>>,
    by_name: hashbrown::HashMap<Sym, UserTypeId>,
}

impl Types {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new type with the given parent, which must have been declared before.
    pub fn add_type(&mut self, name: impl Into<Sym>, parent: Option<UserTypeId>) -> Result<UserTypeId, TypeError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(TypeError::DuplicateType(name));
        }
        let id = UserTypeId(self.names.len() as u32);
        self.names.push(name.clone());
        self.parents.push(parent);
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn get(&self, name: impl Into<Sym>) -> Result<UserTypeId, TypeError> {
        let name = name.into();
        self.by_name.get(&name).copied().ok_or(TypeError::UnknownType(name))
    }

    pub fn name(&self, tpe: UserTypeId) -> &Sym {
        &self.names[tpe.index()]
    }

    pub fn parent(&self, tpe: UserTypeId) -> Option<UserTypeId> {
        self.parents[tpe.index()]
    }

    pub fn is_subtype_of(&self, a: UserTypeId, b: UserTypeId) -> bool {
        let mut cur = Some(a);
        while let Some(t) = cur {
            if t == b {
                return true;
            }
            cur = self.parent(t);
        }
        false
    }

    /// True if the types have at least one common subtype.
    pub fn overlaps(&self, a: UserTypeId, b: UserTypeId) -> bool {
        self.is_subtype_of(a, b) || self.is_subtype_of(b, a)
    }

    pub fn iter(&self) -> impl Iterator<Item = UserTypeId> + '_ {
        (0..self.names.len()).map(|i| UserTypeId(i as u32))
    }

    pub fn is_hierarchical(&self) -> bool {
        self.parents.iter().any(|p| p.is_some())
    }
}

/// Possibly unbounded interval of integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IntInterval(Option<IntValue>, Option<IntValue>);

impl IntInterval {
    pub const FULL: IntInterval = IntInterval(None, None);

    pub fn new(lb: Option<IntValue>, ub: Option<IntValue>) -> Self {
        IntInterval(lb, ub)
    }

    pub fn singleton(value: IntValue) -> Self {
        Self(Some(value), Some(value))
    }

    /// Creates the interval [min, oo[
    pub fn at_least(min: IntValue) -> Self {
        Self(Some(min), None)
    }

    /// Creates the interval ]-oo, max]
    pub fn at_most(max: IntValue) -> Self {
        Self(None, Some(max))
    }

    pub fn lb(&self) -> Option<IntValue> {
        self.0
    }

    pub fn ub(&self) -> Option<IntValue> {
        self.1
    }

    pub fn is_bounded(&self) -> bool {
        self.0.is_some() || self.1.is_some()
    }

    pub fn is_finite(&self) -> bool {
        self.0.is_some() && self.1.is_some()
    }

    pub fn contains(&self, value: &Integer) -> bool {
        self.0.is_none_or(|lb| Integer::from(lb) <= *value) && self.1.is_none_or(|ub| *value <= Integer::from(ub))
    }

    pub fn is_subset_of(&self, other: &IntInterval) -> bool {
        other.is_superset_of(self)
    }

    pub fn is_superset_of(&self, other: &IntInterval) -> bool {
        let left_ok = match (self.0, other.0) {
            (None, _) => true,
            (Some(l), Some(r)) => l <= r,
            _ => false,
        };
        let right_ok = match (self.1, other.1) {
            (None, _) => true,
            (Some(l), Some(r)) => l >= r,
            _ => false,
        };
        left_ok && right_ok
    }
}

impl From<std::ops::RangeInclusive<IntValue>> for IntInterval {
    fn from(value: std::ops::RangeInclusive<IntValue>) -> Self {
        IntInterval(Some(*value.start()), Some(*value.end()))
    }
}

/// Possibly unbounded interval of rationals.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RealInterval(Option<Rational>, Option<Rational>);

impl RealInterval {
    pub const FULL: RealInterval = RealInterval(None, None);

    pub fn new(lb: Option<Rational>, ub: Option<Rational>) -> Self {
        RealInterval(lb, ub)
    }

    pub fn lb(&self) -> Option<&Rational> {
        self.0.as_ref()
    }

    pub fn ub(&self) -> Option<&Rational> {
        self.1.as_ref()
    }

    pub fn is_bounded(&self) -> bool {
        self.0.is_some() || self.1.is_some()
    }

    pub fn contains(&self, value: &Rational) -> bool {
        self.0.as_ref().is_none_or(|lb| lb <= value) && self.1.as_ref().is_none_or(|ub| value <= ub)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Int(IntInterval),
    Real(RealInterval),
    User(UserTypeId),
}

impl Type {
    /// Unbounded int type
    pub const INT: Type = Type::Int(IntInterval::FULL);

    /// Unbounded real type
    pub const REAL: Type = Type::Real(RealInterval::FULL);

    /// Integer type with the bounds `[lb, ub]`
    pub fn int(lb: IntValue, ub: IntValue) -> Result<Type, TypeError> {
        if lb > ub {
            return Err(TypeError::EmptyInterval(lb.to_string(), ub.to_string()));
        }
        Ok(Type::Int((lb..=ub).into()))
    }

    /// Real type with the bounds `[lb, ub]`
    pub fn real(lb: Rational, ub: Rational) -> Result<Type, TypeError> {
        if lb > ub {
            return Err(TypeError::EmptyInterval(lb.to_string(), ub.to_string()));
        }
        Ok(Type::Real(RealInterval(Some(lb), Some(ub))))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Bool)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Int(_) | Real(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Int(_))
    }

    pub fn is_user(&self) -> bool {
        matches!(self, User(_))
    }

    /// True if the type is numeric with at least one bound.
    pub fn is_bounded(&self) -> bool {
        match self {
            Int(itv) => itv.is_bounded(),
            Real(itv) => itv.is_bounded(),
            _ => false,
        }
    }

    /// Subtyping, including numeric bounds.
    pub fn is_subtype_of(&self, other: &Type, types: &Types) -> bool {
        match (self, other) {
            (Bool, Bool) => true,
            (Int(bounds1), Int(bounds2)) => bounds1.is_subset_of(bounds2),
            (Int(_), Real(RealInterval(None, None))) => true,
            (Real(a), Real(b)) => {
                let lb_ok = match (&a.0, &b.0) {
                    (_, None) => true,
                    (Some(l), Some(r)) => l >= r,
                    _ => false,
                };
                let ub_ok = match (&a.1, &b.1) {
                    (_, None) => true,
                    (Some(l), Some(r)) => l <= r,
                    _ => false,
                };
                lb_ok && ub_ok
            }
            (User(left), User(right)) => types.is_subtype_of(*left, *right),
            _ => false,
        }
    }

    /// True if a value of type `value` may be stored where this type is expected.
    ///
    /// Numeric bounds are ignored: they are checked on states, not on expressions.
    pub fn accepts_type(&self, value: &Type, types: &Types) -> bool {
        match (self, value) {
            (Bool, Bool) => true,
            (Int(_), Int(_)) => true,
            (Real(_), Int(_) | Real(_)) => true,
            (User(expected), User(actual)) => types.is_subtype_of(*actual, *expected),
            _ => false,
        }
    }

    pub fn accepts(&self, expr: ExprId, env: &Environment) -> Result<(), TypeError> {
        if self.accepts_type(&env.tpe(expr), &env.types) {
            Ok(())
        } else {
            Err(TypeError::incompatible(env, expr, self))
        }
    }
}

impl<'a> Display for Env<'a, &Type> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.elem {
            Bool => write!(f, "bool"),
            Int(IntInterval(None, None)) => write!(f, "int"),
            Int(IntInterval(lb, ub)) => write!(
                f,
                "int[{}, {}]",
                lb.map_or("-inf".to_string(), |l| l.to_string()),
                ub.map_or("+inf".to_string(), |u| u.to_string())
            ),
            Real(RealInterval(None, None)) => write!(f, "real"),
            Real(RealInterval(lb, ub)) => write!(
                f,
                "real[{}, {}]",
                lb.as_ref().map_or("-inf".to_string(), |l| l.to_string()),
                ub.as_ref().map_or("+inf".to_string(), |u| u.to_string())
            ),
            User(id) => write!(f, "{}", self.env.types.name(*id)),
        }
    }
}

impl<'a> Display for Env<'a, Type> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.env / &self.elem)
    }
}
