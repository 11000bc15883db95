use derive_more::Display;
use malachite::Rational;

/// Anchor of a [Timestamp].
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeRef {
    /// Start of the action in which the timestamp appears.
    #[display("start")]
    Start,
    /// End of the action in which the timestamp appears.
    #[display("end")]
    End,
    /// Beginning of the plan.
    #[display("global_start")]
    GlobalStart,
    /// End of the plan.
    #[display("global_end")]
    GlobalEnd,
}

/// A time point, as an exact delay from an anchor.
///
/// Timestamps only appear in temporal problems. They can be represented in expressions but a
/// sequential simulation has no time to evaluate them against.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    reference: TimeRef,
    delay: Rational,
}

impl Timestamp {
    pub fn new(reference: TimeRef, delay: Rational) -> Self {
        Timestamp { reference, delay }
    }

    pub fn start() -> Self {
        TimeRef::Start.into()
    }

    pub fn end() -> Self {
        TimeRef::End.into()
    }

    pub fn reference(&self) -> TimeRef {
        self.reference
    }

    pub fn delay(&self) -> &Rational {
        &self.delay
    }

    /// True if the anchor does not depend on an action.
    pub fn is_global(&self) -> bool {
        matches!(self.reference, TimeRef::GlobalStart | TimeRef::GlobalEnd)
    }

    /// The same timestamp, moved by `delta`.
    pub fn shifted(&self, delta: &Rational) -> Self {
        Timestamp::new(self.reference, &self.delay + delta)
    }
}

impl From<TimeRef> for Timestamp {
    fn from(reference: TimeRef) -> Self {
        Timestamp::new(reference, Rational::from(0))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let zero = Rational::from(0);
        if self.delay == zero {
            write!(f, "{}", self.reference)
        } else if self.delay < zero {
            write!(f, "{} - {}", self.reference, -&self.delay)
        } else {
            write!(f, "{} + {}", self.reference, self.delay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    #[test]
    fn timestamps() -> anyhow::Result<()> {
        let end = Timestamp::end().shifted(&Rational::from_signeds(-1, 2));
        assert_eq!(end.to_string(), "end - 1/2");
        assert_eq!(end.shifted(&Rational::from_signeds(1, 2)), Timestamp::end());
        assert!(Timestamp::from(TimeRef::GlobalEnd).is_global());
        assert!(!Timestamp::start().is_global());

        // timings are valid expressions that cannot be evaluated in a state
        let env = Environment::new();
        let t = env.timing(Timestamp::start());
        assert_eq!(env.tpe(t), Type::REAL);
        let state = SequentialState::new(&env, []);
        assert_eq!(
            walkers::evaluate(&env, t, &state),
            Err(EvalError::UnsupportedOperator(OperatorKind::TimingRef))
        );
        Ok(())
    }
}
