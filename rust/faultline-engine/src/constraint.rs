//! Statement constraints: per-step inference rules over case bits.
//!
//! A constraint is bound to one trace step. Its case bits assign a
//! correctness value to every variable the step reads and writes, to the
//! step's control dominator (when it has one) and, in the last position, to
//! the step itself (the conclusion bit):
//!
//! ```text
//! [ read_0 .. read_r | write_0 .. write_w | control? | conclusion ]
//!   0                  write_start          var_count
//! ```
//!
//! A set bit means "correct". [`Constraint::probability`] returns how
//! plausible one full assignment is under the rule; the propagation engine
//! multiplies the rules of a step together and marginalizes.
//!
//! Rules form an open set: each rule is its own type implementing
//! [`Constraint`], constructed only when its precondition holds. A
//! [`RuleSet`] collects the builders enabled for a session.

use crate::config::PropagationConfig;
use faultline_core::{StepOrder, TraceStep, VarId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Hard upper bound on case bits per step; enumeration is `2^bits`.
pub const MAX_CASE_BITS: usize = 24;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConstraintError {
    #[error("step {step}: cannot construct constraint {rule}: {reason}")]
    NotApplicable {
        rule: String,
        step: StepOrder,
        reason: &'static str,
    },
    #[error("step {step} needs {bits} case bits, above the limit of {limit}")]
    TooManyCaseBits {
        step: StepOrder,
        bits: usize,
        limit: usize,
    },
    #[error("propagation probability {0} must lie strictly between 0 and 1")]
    InvalidProbability(f64),
}

// ---------------------------------------------------------------------------
// Case bits
// ---------------------------------------------------------------------------

/// One assignment of correctness to every bit of a [`CaseLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaseBits(u32);

impl CaseBits {
    pub fn new(raw: u32) -> Self {
        CaseBits(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn get(self, index: usize) -> bool {
        (self.0 >> index) & 1 == 1
    }

    pub fn with(self, index: usize, value: bool) -> Self {
        if value {
            CaseBits(self.0 | (1 << index))
        } else {
            CaseBits(self.0 & !(1 << index))
        }
    }

    /// Every assignment over `bit_count` bits.
    pub fn all(bit_count: usize) -> impl Iterator<Item = CaseBits> {
        (0..(1u32 << bit_count)).map(CaseBits)
    }
}

/// Bit layout shared by every constraint bound to the same step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseLayout {
    step: StepOrder,
    reads: Vec<VarId>,
    writes: Vec<VarId>,
    control_dominator: Option<StepOrder>,
}

impl CaseLayout {
    /// Layout for `step`. Repeated reads or writes of one variable share a bit.
    pub fn for_step(step: &TraceStep) -> Self {
        fn unique(values: &[faultline_core::VariableValue]) -> Vec<VarId> {
            let mut out: Vec<VarId> = Vec::with_capacity(values.len());
            for v in values {
                if !out.contains(&v.id) {
                    out.push(v.id.clone());
                }
            }
            out
        }
        Self {
            step: step.order,
            reads: unique(&step.reads),
            writes: unique(&step.writes),
            control_dominator: step.control_dominator,
        }
    }

    pub fn step(&self) -> StepOrder {
        self.step
    }

    pub fn reads(&self) -> &[VarId] {
        &self.reads
    }

    pub fn writes(&self) -> &[VarId] {
        &self.writes
    }

    pub fn control_dominator(&self) -> Option<StepOrder> {
        self.control_dominator
    }

    /// First write-variable bit; reads occupy `[0, write_start)`.
    pub fn write_start(&self) -> usize {
        self.reads.len()
    }

    pub fn var_count(&self) -> usize {
        self.reads.len() + self.writes.len()
    }

    pub fn control_index(&self) -> Option<usize> {
        self.control_dominator.map(|_| self.var_count())
    }

    pub fn conclusion_index(&self) -> usize {
        self.var_count() + usize::from(self.control_dominator.is_some())
    }

    pub fn bit_count(&self) -> usize {
        self.conclusion_index() + 1
    }

    fn any_wrong(case: CaseBits, mut range: std::ops::Range<usize>) -> bool {
        range.any(|i| !case.get(i))
    }

    pub fn any_wrong_read(&self, case: CaseBits) -> bool {
        Self::any_wrong(case, 0..self.write_start())
    }

    pub fn any_wrong_write(&self, case: CaseBits) -> bool {
        Self::any_wrong(case, self.write_start()..self.var_count())
    }

    /// `true` only when the step has a control dominator marked wrong.
    pub fn control_wrong(&self, case: CaseBits) -> bool {
        self.control_index().is_some_and(|i| !case.get(i))
    }

    pub fn conclusion(&self, case: CaseBits) -> bool {
        case.get(self.conclusion_index())
    }
}

// ---------------------------------------------------------------------------
// Constraint trait
// ---------------------------------------------------------------------------

/// An inference rule bound to one step.
pub trait Constraint: fmt::Debug + Send + Sync {
    /// Stable identifier, unique per rule and step.
    fn id(&self) -> &str;

    fn layout(&self) -> &CaseLayout;

    /// The propagation probability `p` the rule was built with.
    fn propagation_probability(&self) -> f64;

    /// Plausibility of one full case under this rule, in `[0, 1]`.
    fn probability(&self, case: CaseBits) -> f64;
}

/// Built-in rule kinds, selectable from configuration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RuleKind {
    A1,
    A2,
    A3,
}

impl RuleKind {
    fn id_prefix(self) -> &'static str {
        match self {
            RuleKind::A1 => "SC1",
            RuleKind::A2 => "SC2",
            RuleKind::A3 => "SC3",
        }
    }

    pub fn builder(self) -> RuleBuilder {
        match self {
            RuleKind::A1 => build_a1,
            RuleKind::A2 => build_a2,
            RuleKind::A3 => build_a3,
        }
    }
}

fn build_a1(step: &TraceStep, p: f64) -> Result<Box<dyn Constraint>, ConstraintError> {
    Ok(Box::new(StatementConstraintA1::new(step, p)?))
}

fn build_a2(step: &TraceStep, p: f64) -> Result<Box<dyn Constraint>, ConstraintError> {
    Ok(Box::new(StatementConstraintA2::new(step, p)?))
}

fn build_a3(step: &TraceStep, p: f64) -> Result<Box<dyn Constraint>, ConstraintError> {
    Ok(Box::new(StatementConstraintA3::new(step, p)?))
}

/// Shared state of the statement rules.
#[derive(Debug, Clone)]
struct StatementBase {
    id: String,
    layout: CaseLayout,
    p: f64,
}

impl StatementBase {
    fn new(rule: RuleKind, step: &TraceStep, p: f64) -> Result<Self, ConstraintError> {
        if !(p > 0.0 && p < 1.0) {
            return Err(ConstraintError::InvalidProbability(p));
        }
        Ok(Self {
            id: format!("{}_{}", rule.id_prefix(), step.order),
            layout: CaseLayout::for_step(step),
            p,
        })
    }

    fn not_applicable(rule: RuleKind, step: &TraceStep, reason: &'static str) -> ConstraintError {
        ConstraintError::NotApplicable {
            rule: rule.to_string(),
            step: step.order,
            reason,
        }
    }

    /// `p` when the conclusion bit agrees with `step_correct`, `1 - p` otherwise.
    fn assert_step(&self, case: CaseBits, step_correct: bool) -> f64 {
        if self.layout.conclusion(case) == step_correct {
            self.p
        } else {
            1.0 - self.p
        }
    }
}

macro_rules! statement_constraint {
    ($name:ident) => {
        impl Constraint for $name {
            fn id(&self) -> &str {
                &self.base.id
            }

            fn layout(&self) -> &CaseLayout {
                &self.base.layout
            }

            fn propagation_probability(&self) -> f64 {
                self.base.p
            }

            fn probability(&self, case: CaseBits) -> f64 {
                self.evaluate(case)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// A1
// ---------------------------------------------------------------------------

/// Correct control and correct reads, yet a wrong write: the step itself is
/// likely wrong. Requires at least one written variable.
#[derive(Debug, Clone)]
pub struct StatementConstraintA1 {
    base: StatementBase,
}

impl StatementConstraintA1 {
    pub fn new(step: &TraceStep, p: f64) -> Result<Self, ConstraintError> {
        if step.writes.is_empty() {
            return Err(StatementBase::not_applicable(
                RuleKind::A1,
                step,
                "step has no written variable",
            ));
        }
        Ok(Self {
            base: StatementBase::new(RuleKind::A1, step, p)?,
        })
    }

    fn evaluate(&self, case: CaseBits) -> f64 {
        let layout = &self.base.layout;
        if layout.control_wrong(case) {
            return self.base.p;
        }
        if !layout.any_wrong_read(case) && layout.any_wrong_write(case) {
            self.base.assert_step(case, false)
        } else {
            self.base.p
        }
    }
}

statement_constraint!(StatementConstraintA1);

// ---------------------------------------------------------------------------
// A2
// ---------------------------------------------------------------------------

/// Correct control with at least one wrong read and one wrong write at the
/// same time. Requires both read and written variables.
#[derive(Debug, Clone)]
pub struct StatementConstraintA2 {
    base: StatementBase,
}

impl StatementConstraintA2 {
    pub fn new(step: &TraceStep, p: f64) -> Result<Self, ConstraintError> {
        if step.reads.is_empty() || step.writes.is_empty() {
            return Err(StatementBase::not_applicable(
                RuleKind::A2,
                step,
                "step does not have both read and written variables",
            ));
        }
        Ok(Self {
            base: StatementBase::new(RuleKind::A2, step, p)?,
        })
    }

    fn evaluate(&self, case: CaseBits) -> f64 {
        let layout = &self.base.layout;
        if layout.control_wrong(case) {
            return self.base.p;
        }
        if layout.any_wrong_read(case) && layout.any_wrong_write(case) {
            self.base.assert_step(case, true)
        } else {
            self.base.p
        }
    }
}

statement_constraint!(StatementConstraintA2);

// ---------------------------------------------------------------------------
// A3
// ---------------------------------------------------------------------------

/// Correct control, reads and writes: the step is likely correct. Requires
/// at least one read variable.
#[derive(Debug, Clone)]
pub struct StatementConstraintA3 {
    base: StatementBase,
}

impl StatementConstraintA3 {
    pub fn new(step: &TraceStep, p: f64) -> Result<Self, ConstraintError> {
        if step.reads.is_empty() {
            return Err(StatementBase::not_applicable(
                RuleKind::A3,
                step,
                "step has no read variable",
            ));
        }
        Ok(Self {
            base: StatementBase::new(RuleKind::A3, step, p)?,
        })
    }

    fn evaluate(&self, case: CaseBits) -> f64 {
        let layout = &self.base.layout;
        if layout.control_wrong(case) {
            return self.base.p;
        }
        if !layout.any_wrong_read(case) && !layout.any_wrong_write(case) {
            self.base.assert_step(case, true)
        } else {
            self.base.p
        }
    }
}

statement_constraint!(StatementConstraintA3);

// ---------------------------------------------------------------------------
// Rule set
// ---------------------------------------------------------------------------

/// Constructs one rule for a step, or explains why it does not apply.
pub type RuleBuilder = fn(&TraceStep, f64) -> Result<Box<dyn Constraint>, ConstraintError>;

/// The rules enabled for a propagation run.
#[derive(Clone)]
pub struct RuleSet {
    rules: Vec<(String, RuleBuilder)>,
    probability: f64,
    max_case_bits: usize,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.names())
            .field("probability", &self.probability)
            .field("max_case_bits", &self.max_case_bits)
            .finish()
    }
}

impl RuleSet {
    /// An empty rule set.
    pub fn new(probability: f64, max_case_bits: usize) -> Self {
        Self {
            rules: Vec::new(),
            probability,
            max_case_bits: max_case_bits.min(MAX_CASE_BITS),
        }
    }

    pub fn from_config(config: &PropagationConfig) -> Self {
        config
            .rules
            .iter()
            .fold(Self::new(config.probability, config.max_case_bits), |set, kind| {
                set.with_rule(kind.to_string(), kind.builder())
            })
    }

    /// Register an additional rule under `name`.
    pub fn with_rule(mut self, name: impl Into<String>, builder: RuleBuilder) -> Self {
        self.rules.push((name.into(), builder));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every enabled rule whose precondition holds for `step`.
    pub fn constraints_for(
        &self,
        step: &TraceStep,
    ) -> Result<Vec<Box<dyn Constraint>>, ConstraintError> {
        let bits = CaseLayout::for_step(step).bit_count();
        if bits > self.max_case_bits {
            return Err(ConstraintError::TooManyCaseBits {
                step: step.order,
                bits,
                limit: self.max_case_bits,
            });
        }
        let mut out = Vec::new();
        for (name, build) in &self.rules {
            match build(step, self.probability) {
                Ok(constraint) => out.push(constraint),
                Err(err @ ConstraintError::NotApplicable { .. }) => {
                    trace!(rule = %name, "{}", err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::VariableValue;
    use strum::IntoEnumIterator;

    const P: f64 = 0.95;

    fn step(reads: &[&str], writes: &[&str], dom: Option<u32>) -> TraceStep {
        let mut s = TraceStep::new(10);
        for r in reads {
            s = s.reading(VariableValue::new(*r));
        }
        for w in writes {
            s = s.writing(VariableValue::new(*w));
        }
        if let Some(d) = dom {
            s = s.dominated_by(d);
        }
        s
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn layout_indices() {
        let layout = CaseLayout::for_step(&step(&["a", "b"], &["c"], Some(3)));
        assert_eq!(layout.write_start(), 2);
        assert_eq!(layout.var_count(), 3);
        assert_eq!(layout.control_index(), Some(3));
        assert_eq!(layout.conclusion_index(), 4);
        assert_eq!(layout.bit_count(), 5);
    }

    #[test]
    fn layout_without_dominator() {
        let layout = CaseLayout::for_step(&step(&["a"], &["b"], None));
        assert_eq!(layout.control_index(), None);
        assert_eq!(layout.conclusion_index(), 2);
    }

    #[test]
    fn layout_dedupes_repeated_reads() {
        let layout = CaseLayout::for_step(&step(&["a", "a"], &["b"], None));
        assert_eq!(layout.reads().len(), 1);
    }

    #[test]
    fn case_bits_get_and_with() {
        let c = CaseBits::new(0b101);
        assert!(c.get(0));
        assert!(!c.get(1));
        assert!(c.get(2));
        assert_eq!(c.with(1, true).raw(), 0b111);
        assert_eq!(c.with(0, false).raw(), 0b100);
        assert_eq!(CaseBits::all(3).count(), 8);
    }

    #[test]
    fn a2_requires_reads_and_writes() {
        for s in [
            step(&[], &["x"], None),
            step(&["x"], &[], None),
            step(&[], &[], Some(1)),
        ] {
            let err = StatementConstraintA2::new(&s, P).unwrap_err();
            assert!(matches!(err, ConstraintError::NotApplicable { .. }));
            assert!(err.to_string().contains("step 10"));
        }
    }

    #[test]
    fn a2_wrong_control_dominator_always_returns_p() {
        let s = step(&["a", "b"], &["c"], Some(1));
        let c = StatementConstraintA2::new(&s, P).unwrap();
        let ctrl = c.layout().control_index().unwrap();
        for case in CaseBits::all(c.layout().bit_count()) {
            if !case.get(ctrl) {
                assert!(approx(c.probability(case), P), "case {:b}", case.raw());
            }
        }
    }

    #[test]
    fn a2_joint_failure_follows_conclusion_bit() {
        let s = step(&["a", "b"], &["c"], Some(1));
        let c = StatementConstraintA2::new(&s, P).unwrap();
        let layout = c.layout().clone();
        let ctrl = layout.control_index().unwrap();
        let concl = layout.conclusion_index();
        for case in CaseBits::all(layout.bit_count()) {
            if !case.get(ctrl) {
                continue;
            }
            let joint = layout.any_wrong_read(case) && layout.any_wrong_write(case);
            let expected = if joint && !case.get(concl) { 1.0 - P } else { P };
            assert!(approx(c.probability(case), expected), "case {:b}", case.raw());
        }
    }

    #[test]
    fn a2_without_dominator_uses_variable_bits_only() {
        let s = step(&["a"], &["b"], None);
        let c = StatementConstraintA2::new(&s, P).unwrap();
        // a wrong, b wrong, conclusion wrong
        assert!(approx(c.probability(CaseBits::new(0b000)), 1.0 - P));
        // a wrong, b wrong, conclusion correct
        assert!(approx(c.probability(CaseBits::new(0b100)), P));
        // a correct, b wrong, conclusion wrong
        assert!(approx(c.probability(CaseBits::new(0b001)), P));
    }

    #[test]
    fn a1_flags_step_when_only_writes_are_wrong() {
        let s = step(&["a"], &["b"], None);
        let c = StatementConstraintA1::new(&s, P).unwrap();
        // a correct, b wrong, step correct: unlikely
        assert!(approx(c.probability(CaseBits::new(0b101)), 1.0 - P));
        // a correct, b wrong, step wrong: likely
        assert!(approx(c.probability(CaseBits::new(0b001)), P));
        // a wrong, b wrong: rule silent
        assert!(approx(c.probability(CaseBits::new(0b100)), P));
    }

    #[test]
    fn a1_requires_writes() {
        assert!(StatementConstraintA1::new(&step(&["a"], &[], None), P).is_err());
    }

    #[test]
    fn a3_supports_step_when_everything_is_correct() {
        let s = step(&["a"], &[], Some(2));
        let c = StatementConstraintA3::new(&s, P).unwrap();
        // a correct, control correct, step correct
        assert!(approx(c.probability(CaseBits::new(0b111)), P));
        // a correct, control correct, step wrong
        assert!(approx(c.probability(CaseBits::new(0b011)), 1.0 - P));
        // control wrong
        assert!(approx(c.probability(CaseBits::new(0b001)), P));
    }

    #[test]
    fn ids_are_stable_per_rule_and_step() {
        let s = step(&["a"], &["b"], None);
        assert_eq!(StatementConstraintA2::new(&s, P).unwrap().id(), "SC2_10");
        assert_eq!(StatementConstraintA1::new(&s, P).unwrap().id(), "SC1_10");
    }

    #[test]
    fn invalid_probability_is_rejected() {
        let s = step(&["a"], &["b"], None);
        assert_eq!(
            StatementConstraintA2::new(&s, 1.0).unwrap_err(),
            ConstraintError::InvalidProbability(1.0)
        );
    }

    #[test]
    fn rule_set_skips_inapplicable_rules() {
        let set = RuleKind::iter().fold(RuleSet::new(P, 16), |s, k| {
            s.with_rule(k.to_string(), k.builder())
        });
        assert_eq!(set.names(), vec!["a1", "a2", "a3"]);
        let read_only = step(&["a"], &[], None);
        let built = set.constraints_for(&read_only).unwrap();
        let ids: Vec<&str> = built.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["SC3_10"]);
    }

    #[test]
    fn rule_set_rejects_wide_steps() {
        let set = RuleSet::new(P, 3).with_rule("a2", RuleKind::A2.builder());
        let wide = step(&["a", "b"], &["c"], None);
        assert!(matches!(
            set.constraints_for(&wide),
            Err(ConstraintError::TooManyCaseBits { bits: 4, limit: 3, .. })
        ));
    }

    #[derive(Debug)]
    struct AlwaysHalf(CaseLayout);

    impl Constraint for AlwaysHalf {
        fn id(&self) -> &str {
            "half"
        }
        fn layout(&self) -> &CaseLayout {
            &self.0
        }
        fn propagation_probability(&self) -> f64 {
            0.5
        }
        fn probability(&self, _case: CaseBits) -> f64 {
            0.5
        }
    }

    fn build_half(step: &TraceStep, _p: f64) -> Result<Box<dyn Constraint>, ConstraintError> {
        Ok(Box::new(AlwaysHalf(CaseLayout::for_step(step))))
    }

    #[test]
    fn custom_rules_plug_in_without_touching_builtins() {
        let set = RuleSet::new(P, 16).with_rule("half", build_half);
        let built = set.constraints_for(&step(&[], &[], None)).unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].id(), "half");
    }

    #[test]
    fn rule_kind_parses() {
        assert_eq!("a2".parse::<RuleKind>().unwrap(), RuleKind::A2);
        assert_eq!(RuleKind::A3.to_string(), "a3");
    }
}
