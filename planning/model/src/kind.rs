use derive_more::derive::Display;
use fixedbitset::FixedBitSet;
use itertools::Itertools;

/// A feature that a problem may use, and that a tool may or may not support.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Feature {
    #[display("ACTION_BASED")]
    ActionBased,
    #[display("FLAT_TYPING")]
    FlatTyping,
    #[display("HIERARCHICAL_TYPING")]
    HierarchicalTyping,
    #[display("NUMERIC_FLUENTS")]
    NumericFluents,
    #[display("OBJECT_FLUENTS")]
    ObjectFluents,
    #[display("BOUNDED_TYPES")]
    BoundedTypes,
    #[display("NEGATIVE_CONDITIONS")]
    NegativeConditions,
    #[display("DISJUNCTIVE_CONDITIONS")]
    DisjunctiveConditions,
    #[display("EQUALITIES")]
    Equalities,
    #[display("EXISTENTIAL_CONDITIONS")]
    ExistentialConditions,
    #[display("UNIVERSAL_CONDITIONS")]
    UniversalConditions,
    #[display("CONDITIONAL_EFFECTS")]
    ConditionalEffects,
    #[display("INCREASE_EFFECTS")]
    IncreaseEffects,
    #[display("DECREASE_EFFECTS")]
    DecreaseEffects,
    #[display("FORALL_EFFECTS")]
    ForallEffects,
    #[display("SIMULATED_EFFECTS")]
    SimulatedEffects,
    #[display("STATE_INVARIANTS")]
    StateInvariants,
    #[display("TRAJECTORY_CONSTRAINTS")]
    TrajectoryConstraints,
    #[display("TIMING_EXPRESSIONS")]
    TimingExpressions,
    #[display("PRESENCE_EXPRESSIONS")]
    PresenceExpressions,
    #[display("MULTI_AGENT")]
    MultiAgent,
    #[display("ACTIONS_COST")]
    ActionsCost,
    #[display("PLAN_LENGTH")]
    PlanLength,
    #[display("FINAL_VALUE")]
    FinalValue,
    #[display("OVERSUBSCRIPTION")]
    Oversubscription,
    #[display("MAKESPAN")]
    Makespan,
}

impl Feature {
    pub const ALL: [Feature; 26] = [
        Feature::ActionBased,
        Feature::FlatTyping,
        Feature::HierarchicalTyping,
        Feature::NumericFluents,
        Feature::ObjectFluents,
        Feature::BoundedTypes,
        Feature::NegativeConditions,
        Feature::DisjunctiveConditions,
        Feature::Equalities,
        Feature::ExistentialConditions,
        Feature::UniversalConditions,
        Feature::ConditionalEffects,
        Feature::IncreaseEffects,
        Feature::DecreaseEffects,
        Feature::ForallEffects,
        Feature::SimulatedEffects,
        Feature::StateInvariants,
        Feature::TrajectoryConstraints,
        Feature::TimingExpressions,
        Feature::PresenceExpressions,
        Feature::MultiAgent,
        Feature::ActionsCost,
        Feature::PlanLength,
        Feature::FinalValue,
        Feature::Oversubscription,
        Feature::Makespan,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Set of features used by a problem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProblemKind(FixedBitSet);

impl Default for ProblemKind {
    fn default() -> Self {
        Self::new()
    }
}

impl ProblemKind {
    pub fn new() -> Self {
        ProblemKind(FixedBitSet::with_capacity(Feature::ALL.len()))
    }

    pub fn set(&mut self, feature: Feature) {
        self.0.insert(feature.index());
    }

    pub fn has(&self, feature: Feature) -> bool {
        self.0.contains(feature.index())
    }

    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.0.ones().map(|i| Feature::ALL[i])
    }

    pub fn is_subset_of(&self, other: &ProblemKind) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn union(&self, other: &ProblemKind) -> ProblemKind {
        let mut res = self.clone();
        res.0.union_with(&other.0);
        res
    }

    /// Features of this kind that are not in `supported`.
    pub fn unsupported(&self, supported: &ProblemKind) -> Vec<Feature> {
        self.0.difference(&supported.0).map(|i| Feature::ALL[i]).collect()
    }
}

impl FromIterator<Feature> for ProblemKind {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        let mut kind = ProblemKind::new();
        for f in iter {
            kind.set(f);
        }
        kind
    }
}

impl std::fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.features().format(", "))
    }
}
