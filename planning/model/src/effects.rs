use std::rc::Rc;

use derive_more::derive::Display;
use itertools::Itertools;

use crate::{env::Env, *};

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
pub enum EffectKind {
    #[display(":=")]
    Assign,
    #[display("+=")]
    Increase,
    #[display("-=")]
    Decrease,
}

/// Change of a fluent by an action.
///
/// `fluent` is a fluent expression whose arguments may refer to the action parameters and to the
/// `forall` variables. An effect without condition is unconditional.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Effect {
    pub fluent: ExprId,
    pub value: ExprId,
    pub kind: EffectKind,
    pub condition: Option<ExprId>,
    pub forall: Vec<Param>,
}

impl Effect {
    pub fn new(fluent: ExprId, value: ExprId, kind: EffectKind) -> Self {
        Effect {
            fluent,
            value,
            kind,
            condition: None,
            forall: Vec::new(),
        }
    }

    pub fn assign(fluent: ExprId, value: ExprId) -> Self {
        Self::new(fluent, value, EffectKind::Assign)
    }

    pub fn increase(fluent: ExprId, delta: ExprId) -> Self {
        Self::new(fluent, delta, EffectKind::Increase)
    }

    pub fn decrease(fluent: ExprId, delta: ExprId) -> Self {
        Self::new(fluent, delta, EffectKind::Decrease)
    }

    pub fn with_condition(mut self, condition: ExprId) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_forall(mut self, vars: Vec<Param>) -> Self {
        self.forall = vars;
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }

    pub fn is_forall(&self) -> bool {
        !self.forall.is_empty()
    }

    pub fn is_numeric_update(&self) -> bool {
        self.kind != EffectKind::Assign
    }

    /// Checks that the effect is well formed: the target is a fluent, the value matches its type
    /// and the condition is boolean.
    pub fn check(&self, env: &Environment) -> Result<(), ProblemError> {
        if env.kind(self.fluent) != OperatorKind::FluentRef {
            return Err(ProblemError::NotAFluent((env / self.fluent).to_string()));
        }
        let tpe = env.tpe(self.fluent);
        if self.is_numeric_update() && !tpe.is_numeric() {
            return Err(TypeError::incompatible(env, self.fluent, &Type::REAL).into());
        }
        tpe.accepts(self.value, env)?;
        if let Some(c) = self.condition {
            Type::Bool.accepts(c, env)?;
        }
        Ok(())
    }
}

impl<'env> Display for Env<'env, &Effect> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let eff = self.elem;
        if eff.is_forall() {
            write!(f, "forall ({}) ", eff.forall.iter().map(|v| self.env / v).format(", "))?;
        }
        if let Some(c) = eff.condition {
            write!(f, "if {} then ", self.env / c)?;
        }
        write!(f, "{} {} {}", self.env / eff.fluent, eff.kind, self.env / eff.value)
    }
}

/// Signature of the host function computing the values of a [SimulatedEffect].
///
/// It receives the state in which the action is applied and the values of the action parameters,
/// and returns one constant per target fluent.
pub type SimulatedEffectFn = dyn Fn(&Problem, &dyn State, &[ExprId]) -> Result<Vec<ExprId>, EvalError>;

/// Effect whose values are computed by an opaque function instead of expressions.
#[derive(Clone)]
pub struct SimulatedEffect {
    pub fluents: Vec<ExprId>,
    pub function: Rc<SimulatedEffectFn>,
}

impl SimulatedEffect {
    pub fn new(
        fluents: Vec<ExprId>,
        function: impl Fn(&Problem, &dyn State, &[ExprId]) -> Result<Vec<ExprId>, EvalError> + 'static,
    ) -> Self {
        SimulatedEffect {
            fluents,
            function: Rc::new(function),
        }
    }

    pub fn check(&self, env: &Environment) -> Result<(), ProblemError> {
        for &f in &self.fluents {
            if env.kind(f) != OperatorKind::FluentRef {
                return Err(ProblemError::NotAFluent((env / f).to_string()));
            }
        }
        Ok(())
    }
}

impl Debug for SimulatedEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimulatedEffect({:?})", self.fluents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_checks() -> anyhow::Result<()> {
        let mut env = Environment::new();
        let flag = env.fluents.add_fluent("flag", vec![], Type::Bool, None)?;
        let level = env.fluents.add_fluent("level", vec![], Type::int(0, 10)?, None)?;
        let flag = env.fluent(flag, [])?;
        let level = env.fluent(level, [])?;

        assert!(Effect::assign(flag, env.bool(true)).check(&env).is_ok());
        assert!(Effect::increase(level, env.int(20)).check(&env).is_ok());
        assert!(Effect::increase(flag, env.int(1)).check(&env).is_err());
        assert!(Effect::assign(level, env.bool(true)).check(&env).is_err());
        assert!(Effect::assign(env.int(1), env.int(1)).check(&env).is_err());
        let conditional = Effect::assign(flag, env.bool(false)).with_condition(env.int(3));
        assert!(conditional.check(&env).is_err());

        let eff = Effect::decrease(level, env.int(2)).with_condition(flag);
        assert_eq!((&env / &eff).to_string(), "if flag then level -= 2");
        Ok(())
    }
}
