// registry.rs — Operator registry
//
// Operators enter the compiler only through a `RegistryBuilder` during
// startup. `finish()` freezes the set into an `OpRegistry` that is never
// mutated again and may be shared across compilation threads.
//
// Preconditions: every `OpDef` is complete (all fields set).
// Postconditions: names are unique; lookup order follows registration.
// Failure modes: duplicate names and incomplete definitions are
//   configuration errors; unknown names are construction errors.
// Side effects: none.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::attr::AttrMap;
use crate::diag::{codes, DiagCode, ErrorClass};
use crate::infer::{check_arity, InferError};
use crate::ir::TensorRef;
use crate::strategy::{OpStrategy, StrategyError};
use crate::target::Target;
use crate::types::{ElementType, Shape};

// ── Function signatures ─────────────────────────────────────────────────────

pub type InferShapeFn = fn(&[Shape], &AttrMap) -> Result<Vec<Shape>, InferError>;
pub type InferDtypeFn = fn(&[ElementType], &AttrMap) -> Result<Vec<ElementType>, InferError>;
pub type StrategyFn = fn(&StrategyRequest<'_>) -> Result<OpStrategy, StrategyError>;

/// Everything a strategy builder sees.
#[derive(Debug, Clone, Copy)]
pub struct StrategyRequest<'a> {
    pub attrs: &'a AttrMap,
    /// Declared inputs; not yet bound to buffers.
    pub inputs: &'a [TensorRef],
    pub out_types: &'a [ElementType],
    pub out_shapes: &'a [Shape],
    pub target: &'a Target,
}

// ── Pattern kind ────────────────────────────────────────────────────────────

/// Fusibility class consumed by graph fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpPatternKind {
    #[serde(rename = "elementwise")]
    ElementWise,
    Broadcast,
    Injective,
    CommReduce,
    OutFusible,
    NonFusible,
}

impl OpPatternKind {
    pub fn name(self) -> &'static str {
        match self {
            OpPatternKind::ElementWise => "elementwise",
            OpPatternKind::Broadcast => "broadcast",
            OpPatternKind::Injective => "injective",
            OpPatternKind::CommReduce => "comm_reduce",
            OpPatternKind::OutFusible => "out_fusible",
            OpPatternKind::NonFusible => "non_fusible",
        }
    }
}

impl fmt::Display for OpPatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("operator '{name}' is registered twice")]
    DuplicateOp { name: String },
    #[error("operator '{name}' is missing its {field}")]
    IncompleteOp { name: String, field: &'static str },
    #[error("unknown operator '{name}'")]
    UnknownOp { name: String },
}

impl RegistryError {
    pub fn code(&self) -> DiagCode {
        match self {
            RegistryError::DuplicateOp { .. } => codes::E0001,
            RegistryError::IncompleteOp { .. } => codes::E0002,
            RegistryError::UnknownOp { .. } => codes::E0003,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            RegistryError::UnknownOp { .. } => ErrorClass::Construction,
            _ => ErrorClass::Configuration,
        }
    }
}

// ── Operator definitions ────────────────────────────────────────────────────

/// One registered operator.
#[derive(Clone)]
pub struct OpDef {
    name: String,
    description: String,
    num_inputs: usize,
    num_outputs: usize,
    infer_shape: InferShapeFn,
    infer_dtype: InferDtypeFn,
    strategy: StrategyFn,
    pattern: OpPatternKind,
    support_level: u32,
}

impl OpDef {
    pub fn builder(name: impl Into<String>) -> OpDefBuilder {
        OpDefBuilder {
            name: name.into(),
            ..OpDefBuilder::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn pattern(&self) -> OpPatternKind {
        self.pattern
    }

    pub fn support_level(&self) -> u32 {
        self.support_level
    }

    /// Run shape inference, checking input arity and output count.
    pub fn infer_shape(&self, inputs: &[Shape], attrs: &AttrMap) -> Result<Vec<Shape>, InferError> {
        check_arity(&self.name, self.num_inputs, inputs.len())?;
        let shapes = (self.infer_shape)(inputs, attrs)?;
        self.check_outputs(shapes.len())?;
        Ok(shapes)
    }

    /// Run dtype inference, checking input arity and output count.
    pub fn infer_dtype(
        &self,
        inputs: &[ElementType],
        attrs: &AttrMap,
    ) -> Result<Vec<ElementType>, InferError> {
        check_arity(&self.name, self.num_inputs, inputs.len())?;
        let dtypes = (self.infer_dtype)(inputs, attrs)?;
        self.check_outputs(dtypes.len())?;
        Ok(dtypes)
    }

    /// Invoke the strategy builder. A strategy without implementations is
    /// rejected here rather than at selection time.
    pub fn build_strategy(&self, req: &StrategyRequest<'_>) -> Result<OpStrategy, StrategyError> {
        let strategy = (self.strategy)(req)?;
        if strategy.is_empty() {
            return Err(StrategyError::EmptyStrategy {
                op: self.name.clone(),
            });
        }
        Ok(strategy)
    }

    fn check_outputs(&self, found: usize) -> Result<(), InferError> {
        if found != self.num_outputs {
            return Err(InferError::OutputCountMismatch {
                op: self.name.clone(),
                expected: self.num_outputs,
                found,
            });
        }
        Ok(())
    }

    fn summary(&self) -> OpSummary<'_> {
        OpSummary {
            name: &self.name,
            description: &self.description,
            num_inputs: self.num_inputs,
            num_outputs: self.num_outputs,
            pattern: self.pattern,
            support_level: self.support_level,
        }
    }
}

impl fmt::Debug for OpDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpDef")
            .field("name", &self.name)
            .field("num_inputs", &self.num_inputs)
            .field("num_outputs", &self.num_outputs)
            .field("pattern", &self.pattern)
            .field("support_level", &self.support_level)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct OpSummary<'a> {
    name: &'a str,
    description: &'a str,
    num_inputs: usize,
    num_outputs: usize,
    pattern: OpPatternKind,
    support_level: u32,
}

/// Collects the fields of an `OpDef`; `build` fails on the first missing one.
#[derive(Default)]
pub struct OpDefBuilder {
    name: String,
    description: String,
    num_inputs: Option<usize>,
    num_outputs: Option<usize>,
    infer_shape: Option<InferShapeFn>,
    infer_dtype: Option<InferDtypeFn>,
    strategy: Option<StrategyFn>,
    pattern: Option<OpPatternKind>,
    support_level: Option<u32>,
}

impl OpDefBuilder {
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn set_num_inputs(mut self, n: usize) -> Self {
        self.num_inputs = Some(n);
        self
    }

    pub fn set_num_outputs(mut self, n: usize) -> Self {
        self.num_outputs = Some(n);
        self
    }

    pub fn set_infer_shape(mut self, f: InferShapeFn) -> Self {
        self.infer_shape = Some(f);
        self
    }

    pub fn set_infer_dtype(mut self, f: InferDtypeFn) -> Self {
        self.infer_dtype = Some(f);
        self
    }

    pub fn set_strategy(mut self, f: StrategyFn) -> Self {
        self.strategy = Some(f);
        self
    }

    pub fn set_pattern(mut self, kind: OpPatternKind) -> Self {
        self.pattern = Some(kind);
        self
    }

    pub fn set_support_level(mut self, level: u32) -> Self {
        self.support_level = Some(level);
        self
    }

    pub fn build(self) -> Result<OpDef, RegistryError> {
        let missing = |field| RegistryError::IncompleteOp {
            name: self.name.clone(),
            field,
        };
        Ok(OpDef {
            num_inputs: self.num_inputs.ok_or_else(|| missing("input count"))?,
            num_outputs: self.num_outputs.ok_or_else(|| missing("output count"))?,
            infer_shape: self.infer_shape.ok_or_else(|| missing("shape inference"))?,
            infer_dtype: self.infer_dtype.ok_or_else(|| missing("dtype inference"))?,
            strategy: self.strategy.ok_or_else(|| missing("strategy"))?,
            pattern: self.pattern.ok_or_else(|| missing("pattern kind"))?,
            support_level: self.support_level.ok_or_else(|| missing("support level"))?,
            description: self.description.clone(),
            name: self.name.clone(),
        })
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Startup-phase registration. Consumed by `finish`.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    ops: IndexMap<String, OpDef>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: OpDef) -> Result<&mut Self, RegistryError> {
        if self.ops.contains_key(&def.name) {
            return Err(RegistryError::DuplicateOp { name: def.name });
        }
        tracing::trace!(op = %def.name, pattern = %def.pattern, "registered operator");
        self.ops.insert(def.name.clone(), def);
        Ok(self)
    }

    pub fn finish(self) -> OpRegistry {
        tracing::debug!(ops = self.ops.len(), "operator registry frozen");
        OpRegistry { ops: self.ops }
    }
}

/// Frozen operator set.
#[derive(Debug, Clone)]
pub struct OpRegistry {
    ops: IndexMap<String, OpDef>,
}

impl OpRegistry {
    /// Registry holding the built-in operators.
    pub fn builtin() -> Result<OpRegistry, RegistryError> {
        let mut builder = RegistryBuilder::new();
        crate::ops::register_builtin_ops(&mut builder)?;
        Ok(builder.finish())
    }

    pub fn lookup(&self, name: &str) -> Option<&OpDef> {
        self.ops.get(name)
    }

    pub fn get(&self, name: &str) -> Result<&OpDef, RegistryError> {
        self.lookup(name).ok_or_else(|| RegistryError::UnknownOp {
            name: name.to_string(),
        })
    }

    pub fn ops(&self) -> impl Iterator<Item = &OpDef> {
        self.ops.values()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Compact JSON of every operator's metadata, sorted by name. Stable
    /// across registration order; used for the build fingerprint.
    pub fn canonical_json(&self) -> String {
        let mut summaries: Vec<OpSummary<'_>> = self.ops.values().map(OpDef::summary).collect();
        summaries.sort_by(|a, b| a.name.cmp(b.name));
        // Serializing plain strings and integers cannot fail.
        serde_json::to_string(&summaries).unwrap_or_default()
    }
}
