// strategy.rs — Operator strategies and implementation selection
//
// An `OpStrategy` is the list of (compute, schedule, target, priority)
// implementations an operator's strategy builder produced for one call.
// Selection keeps the implementations eligible for the active target and
// picks the highest priority; equal priorities resolve to the earliest
// registered. The order is total, so selection is deterministic.
//
// Preconditions: none.
// Postconditions: `select` returns an eligible implementation or an error.
// Failure modes: no eligible implementation; empty strategy.
// Side effects: none.

use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

use crate::diag::{codes, DiagCode, ErrorClass};
use crate::ir::TensorRef;
use crate::schedule::{ScheduleError, ScheduleFn, StageMap};
use crate::target::{Arch, Target};
use crate::te::{TeBuilder, TeError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("operator '{op}' has no implementation for target {target}")]
    NoImplementation { op: String, target: String },
    #[error("strategy for operator '{op}' has no implementations")]
    EmptyStrategy { op: String },
    #[error("strategy for operator '{op}' expects {expected} output shapes and dtypes, got {found}")]
    OutputMetadata {
        op: String,
        expected: usize,
        found: usize,
    },
    #[error("compute for operator '{op}' received no input {index}")]
    MissingInput { op: String, index: usize },
    #[error(transparent)]
    Te(#[from] TeError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl StrategyError {
    pub fn code(&self) -> DiagCode {
        match self {
            StrategyError::NoImplementation { .. } => codes::E0200,
            StrategyError::EmptyStrategy { .. } => codes::E0004,
            StrategyError::OutputMetadata { .. } => codes::I0001,
            StrategyError::MissingInput { .. } => codes::E0104,
            StrategyError::Te(e) => e.code(),
            StrategyError::Schedule(e) => e.code(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            StrategyError::NoImplementation { .. } => ErrorClass::Construction,
            StrategyError::EmptyStrategy { .. } => ErrorClass::Configuration,
            StrategyError::OutputMetadata { .. } => ErrorClass::Internal,
            StrategyError::MissingInput { .. } => ErrorClass::Construction,
            StrategyError::Te(e) => e.class(),
            StrategyError::Schedule(e) => e.class(),
        }
    }
}

/// What a compute function hands back: its output tensors and the stages
/// the schedule function will act on.
#[derive(Debug, Clone)]
pub struct ComputeOutput {
    pub outputs: Vec<TensorRef>,
    pub stages: StageMap,
}

/// Builds the tensor-expression graph from the node's input placeholders.
pub type ComputeFn =
    Arc<dyn Fn(&mut TeBuilder, &[TensorRef]) -> Result<ComputeOutput, StrategyError> + Send + Sync>;

/// Which targets an implementation serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFilter {
    Any,
    Arch(Arch),
}

impl TargetFilter {
    pub fn matches(self, target: &Target) -> bool {
        match self {
            TargetFilter::Any => true,
            TargetFilter::Arch(arch) => target.arch == arch,
        }
    }
}

impl fmt::Display for TargetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetFilter::Any => f.write_str("any"),
            TargetFilter::Arch(arch) => write!(f, "{arch}"),
        }
    }
}

#[derive(Clone)]
pub struct OpImpl {
    pub name: String,
    pub target: TargetFilter,
    pub priority: i32,
    pub compute: ComputeFn,
    pub schedule: ScheduleFn,
    order: usize,
}

impl OpImpl {
    /// Registration order within its strategy.
    pub fn order(&self) -> usize {
        self.order
    }
}

impl fmt::Debug for OpImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpImpl")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("priority", &self.priority)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct OpStrategy {
    op: String,
    impls: Vec<OpImpl>,
}

impl OpStrategy {
    pub fn new(op: impl Into<String>) -> Self {
        OpStrategy {
            op: op.into(),
            impls: Vec::new(),
        }
    }

    pub fn add_impl(
        &mut self,
        compute: ComputeFn,
        schedule: ScheduleFn,
        target: TargetFilter,
        name: impl Into<String>,
        priority: i32,
    ) {
        let order = self.impls.len();
        self.impls.push(OpImpl {
            name: name.into(),
            target,
            priority,
            compute,
            schedule,
            order,
        });
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn impls(&self) -> &[OpImpl] {
        &self.impls
    }

    pub fn is_empty(&self) -> bool {
        self.impls.is_empty()
    }

    pub fn select(&self, target: &Target) -> Result<&OpImpl, StrategyError> {
        if self.impls.is_empty() {
            return Err(StrategyError::EmptyStrategy {
                op: self.op.clone(),
            });
        }
        self.impls
            .iter()
            .filter(|imp| imp.target.matches(target))
            .min_by_key(|imp| (Reverse(imp.priority), imp.order))
            .ok_or_else(|| StrategyError::NoImplementation {
                op: self.op.clone(),
                target: target.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{create_stages, injective_schedule};

    fn noop_compute() -> ComputeFn {
        Arc::new(
            |b: &mut TeBuilder, _inputs: &[TensorRef]| -> Result<ComputeOutput, StrategyError> {
                Ok(ComputeOutput {
                    outputs: Vec::new(),
                    stages: create_stages(b, &[])?,
                })
            }
        )
    }

    fn strategy(entries: &[(&str, TargetFilter, i32)]) -> OpStrategy {
        let mut s = OpStrategy::new("op");
        for (name, target, priority) in entries {
            s.add_impl(
                noop_compute(),
                injective_schedule(&Target::x86()),
                *target,
                *name,
                *priority,
            );
        }
        s
    }

    #[test]
    fn highest_priority_wins() {
        let s = strategy(&[
            ("generic", TargetFilter::Any, 1),
            ("tuned", TargetFilter::Any, 10),
        ]);
        assert_eq!(s.select(&Target::x86()).unwrap().name, "tuned");
    }

    #[test]
    fn ties_resolve_to_registration_order() {
        let s = strategy(&[
            ("first", TargetFilter::Any, 5),
            ("second", TargetFilter::Any, 5),
        ]);
        assert_eq!(s.select(&Target::arm()).unwrap().name, "first");
    }

    #[test]
    fn target_filters_eligibility() {
        let s = strategy(&[
            ("generic", TargetFilter::Any, 1),
            ("gpu", TargetFilter::Arch(Arch::NvGpu), 10),
        ]);
        assert_eq!(s.select(&Target::x86()).unwrap().name, "generic");
        assert_eq!(s.select(&Target::nvgpu()).unwrap().name, "gpu");
    }

    #[test]
    fn no_eligible_impl() {
        let s = strategy(&[("gpu", TargetFilter::Arch(Arch::NvGpu), 1)]);
        let err = s.select(&Target::x86()).unwrap_err();
        assert_eq!(
            err,
            StrategyError::NoImplementation {
                op: "op".into(),
                target: "x86".into()
            }
        );
        assert_eq!(err.code(), codes::E0200);
    }

    #[test]
    fn empty_strategy_is_configuration_error() {
        let err = OpStrategy::new("op").select(&Target::x86()).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
    }
}
