// lowered_func.rs — Lowered functions
//
// A `LoweredFunc` is a named, callable unit: classified arguments, one body
// expression, the buffers that body touches, and the runtime expressions a
// backend emits around the body: output allocation, optional scratch
// allocation, a runtime guard per input argument, and typed data aliases
// for every referenced buffer.
//
// Preconditions: the body is final (scheduled) when `make` is called.
// Postconditions: a returned `LoweredFunc` has at least one output argument,
//   one allocation expression per output in argument order, and every buffer
//   id it mentions resolves in its arena.
// Failure modes: see `LowerError`. Construction is all-or-nothing.
// Side effects: none.

use std::collections::HashSet;
use std::fmt;

use crate::diag::{codes, DiagCode, ErrorClass};
use crate::id::BufferId;
use crate::ir::{Buffer, BufferArena, Expr, Type, Var};
use crate::runtime;
use crate::types::ElementType;

// ── Arguments ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Input,
    Output,
}

/// One slot of a function signature. Buffer-backed arguments are named after
/// their buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub kind: ArgKind,
    /// `None` when inference never resolved the type.
    pub dtype: Option<ElementType>,
    pub buffer: Option<BufferId>,
}

impl Argument {
    pub fn input(name: impl Into<String>, dtype: ElementType) -> Self {
        Argument {
            name: name.into(),
            kind: ArgKind::Input,
            dtype: Some(dtype),
            buffer: None,
        }
    }

    pub fn output(name: impl Into<String>, dtype: ElementType) -> Self {
        Argument {
            name: name.into(),
            kind: ArgKind::Output,
            dtype: Some(dtype),
            buffer: None,
        }
    }

    pub fn with_buffer(mut self, buffer: BufferId) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn is_input(&self) -> bool {
        self.kind == ArgKind::Input
    }

    pub fn is_output(&self) -> bool {
        self.kind == ArgKind::Output
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.kind {
            ArgKind::Input => "in",
            ArgKind::Output => "out",
        };
        match self.dtype {
            Some(t) => write!(f, "{dir} {}: {t}", self.name),
            None => write!(f, "{dir} {}: ?", self.name),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    #[error("function '{func}' has no output arguments ({inputs} inputs)")]
    InvalidSignature { func: String, inputs: usize },
    #[error("function '{func}' needs exactly one body expression, got {count}")]
    InvalidBody { func: String, count: usize },
    #[error("function '{func}': output argument '{arg}' has no resolved type")]
    InvalidType { func: String, arg: String },
    #[error("function '{func}': {what} already prepared")]
    DuplicatePreparation { func: String, what: &'static str },
    #[error("function '{func}': '{tensor}' refers to {buffer}, which is not in the function's buffers")]
    DanglingBuffer {
        func: String,
        tensor: String,
        buffer: BufferId,
    },
}

impl LowerError {
    pub fn code(&self) -> DiagCode {
        match self {
            LowerError::InvalidSignature { .. } => codes::E0300,
            LowerError::InvalidBody { .. } => codes::E0301,
            LowerError::InvalidType { .. } => codes::I0002,
            LowerError::DuplicatePreparation { .. } => codes::E0302,
            LowerError::DanglingBuffer { .. } => codes::I0003,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            LowerError::InvalidType { .. } | LowerError::DanglingBuffer { .. } => {
                ErrorClass::Internal
            }
            _ => ErrorClass::Construction,
        }
    }
}

// ── Temporary buffers ───────────────────────────────────────────────────────

/// Decides which scratch allocations a function needs beyond its outputs.
pub trait TempBufferPolicy {
    fn alloc_temp_buffers(&self, func: &LoweredFunc) -> Vec<Expr>;
}

/// Temporaries are left to the scheduler and backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTempBuffers;

impl TempBufferPolicy for NoTempBuffers {
    fn alloc_temp_buffers(&self, _func: &LoweredFunc) -> Vec<Expr> {
        Vec::new()
    }
}

/// Allocates every referenced buffer that is not bound to an argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScratchTempBuffers;

impl TempBufferPolicy for ScratchTempBuffers {
    fn alloc_temp_buffers(&self, func: &LoweredFunc) -> Vec<Expr> {
        let bound: HashSet<&str> = func.args.iter().map(|a| a.name.as_str()).collect();
        func.collect_all_buffer_reference()
            .into_iter()
            .filter(|b| !bound.contains(b.name.as_str()))
            .map(|b| runtime::buffer_malloc(Var::new(&b.name, Type::Ptr(b.dtype))))
            .collect()
    }
}

// ── LoweredFunc ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoweredFunc {
    name: String,
    args: Vec<Argument>,
    body: Expr,
    buffers: BufferArena,
    alloc_output_buffer_exprs: Option<Vec<Expr>>,
    alloc_temp_buffer_exprs: Option<Vec<Expr>>,
    arg_guard_exprs: Option<Vec<Expr>>,
    buffer_data_cast_exprs: Option<Vec<Expr>>,
}

impl LoweredFunc {
    /// Validate the signature and allocate outputs. No scratch buffers.
    pub fn make(
        name: impl Into<String>,
        args: Vec<Argument>,
        body: Expr,
        buffers: BufferArena,
    ) -> Result<Self, LowerError> {
        Self::make_with_policy(name, args, body, buffers, &NoTempBuffers)
    }

    /// Like `make`, for callers holding the body as a list. The list must
    /// have exactly one element.
    pub fn make_from_exprs(
        name: impl Into<String>,
        args: Vec<Argument>,
        body: Vec<Expr>,
        buffers: BufferArena,
    ) -> Result<Self, LowerError> {
        let name = name.into();
        let count = body.len();
        let [body]: [Expr; 1] = body
            .try_into()
            .map_err(|_| LowerError::InvalidBody {
                func: name.clone(),
                count,
            })?;
        Self::make(name, args, body, buffers)
    }

    pub fn make_with_policy(
        name: impl Into<String>,
        args: Vec<Argument>,
        body: Expr,
        buffers: BufferArena,
        policy: &dyn TempBufferPolicy,
    ) -> Result<Self, LowerError> {
        let mut func = LoweredFunc {
            name: name.into(),
            args,
            body,
            buffers,
            alloc_output_buffer_exprs: None,
            alloc_temp_buffer_exprs: None,
            arg_guard_exprs: None,
            buffer_data_cast_exprs: None,
        };
        func.check_valid()?;
        func.alloc_buffer_for_outputs()?;
        func.alloc_temp_buffer(policy)?;
        tracing::debug!(
            func = %func.name,
            args = func.args.len(),
            outputs = func.alloc_output_exprs().len(),
            "lowered function constructed"
        );
        Ok(func)
    }

    fn check_valid(&self) -> Result<(), LowerError> {
        let inputs = self.args.iter().filter(|a| a.is_input()).count();
        let outputs = self.args.iter().filter(|a| a.is_output()).count();
        if outputs == 0 {
            return Err(LowerError::InvalidSignature {
                func: self.name.clone(),
                inputs,
            });
        }

        let dangling = |tensor: &str, buffer: BufferId| LowerError::DanglingBuffer {
            func: self.name.clone(),
            tensor: tensor.to_string(),
            buffer,
        };
        for arg in &self.args {
            if let Some(id) = arg.buffer {
                if self.buffers.get(id).is_none() {
                    return Err(dangling(&arg.name, id));
                }
            }
        }
        let mut result = Ok(());
        self.body.walk(&mut |e| {
            if let Some(t) = e.tensor_ref() {
                if let Some(id) = t.buffer {
                    if result.is_ok() && self.buffers.get(id).is_none() {
                        result = Err(dangling(&t.name, id));
                    }
                }
            }
        });
        result
    }

    /// One `buffer_malloc` per output argument, in argument order. Runs once;
    /// `make` has already called it.
    pub fn alloc_buffer_for_outputs(&mut self) -> Result<(), LowerError> {
        if self.alloc_output_buffer_exprs.is_some() {
            return Err(self.duplicate("output allocation"));
        }
        let mut exprs = Vec::new();
        for arg in self.args.iter().filter(|a| a.is_output()) {
            let dtype = arg.dtype.ok_or_else(|| LowerError::InvalidType {
                func: self.name.clone(),
                arg: arg.name.clone(),
            })?;
            exprs.push(runtime::buffer_malloc(Var::new(&arg.name, Type::Ptr(dtype))));
        }
        self.alloc_output_buffer_exprs = Some(exprs);
        Ok(())
    }

    /// Scratch allocation through `policy`. Runs once; `make` has already
    /// called it.
    pub fn alloc_temp_buffer(&mut self, policy: &dyn TempBufferPolicy) -> Result<(), LowerError> {
        if self.alloc_temp_buffer_exprs.is_some() {
            return Err(self.duplicate("temporary allocation"));
        }
        let exprs = policy.alloc_temp_buffers(self);
        self.alloc_temp_buffer_exprs = Some(exprs);
        Ok(())
    }

    /// Distinct buffers referenced from the body, in first-reference
    /// (pre-order) order.
    pub fn collect_all_buffer_reference(&self) -> Vec<&Buffer> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.body.walk(&mut |e| {
            let Some(id) = e.tensor_ref().and_then(|t| t.buffer) else {
                return;
            };
            if let Some(buffer) = self.buffers.get(id) {
                if seen.insert(buffer.name.as_str()) {
                    out.push(buffer);
                }
            }
        });
        out
    }

    /// Bind a typed data alias, named after the buffer's tensor, for every
    /// referenced buffer, and guard every input argument. Call once, after
    /// scheduling.
    pub fn prepare_buffer_cast_exprs(&mut self) -> Result<&[Expr], LowerError> {
        if self.buffer_data_cast_exprs.is_some() {
            return Err(self.duplicate("buffer casts"));
        }
        self.arg_guard_exprs = Some(self.input_guards());
        let exprs: Vec<Expr> = self
            .collect_all_buffer_reference()
            .into_iter()
            .map(|b| Expr::Let {
                var: Var::new(&b.tensor, Type::Ptr(b.dtype)),
                value: Box::new(runtime::buffer_get_data_handle(
                    Var::new(&b.name, Type::Handle),
                    b.dtype,
                )),
            })
            .collect();
        tracing::debug!(func = %self.name, buffers = exprs.len(), "prepared buffer casts");
        let exprs = self.buffer_data_cast_exprs.insert(exprs);
        Ok(exprs.as_slice())
    }

    /// `assert_true` over each input handle; the message id is the
    /// argument's position in the signature.
    fn input_guards(&self) -> Vec<Expr> {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_input())
            .map(|(pos, a)| {
                let handle = Expr::Var(Var::new(&a.name, Type::Handle));
                runtime::assert_true(runtime::pack_args(vec![handle]), pos as i32, false, None)
            })
            .collect()
    }

    fn duplicate(&self, what: &'static str) -> LowerError {
        LowerError::DuplicatePreparation {
            func: self.name.clone(),
            what,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter().filter(|a| a.is_input())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter().filter(|a| a.is_output())
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn buffers(&self) -> &BufferArena {
        &self.buffers
    }

    pub fn alloc_output_exprs(&self) -> &[Expr] {
        self.alloc_output_buffer_exprs.as_deref().unwrap_or(&[])
    }

    pub fn alloc_temp_exprs(&self) -> &[Expr] {
        self.alloc_temp_buffer_exprs.as_deref().unwrap_or(&[])
    }

    /// Empty until `prepare_buffer_cast_exprs` has run.
    pub fn arg_guard_exprs(&self) -> &[Expr] {
        self.arg_guard_exprs.as_deref().unwrap_or(&[])
    }

    /// `None` until `prepare_buffer_cast_exprs` has run.
    pub fn buffer_cast_exprs(&self) -> Option<&[Expr]> {
        self.buffer_data_cast_exprs.as_deref()
    }

    /// Ready for backend emission.
    pub fn is_prepared(&self) -> bool {
        self.buffer_data_cast_exprs.is_some()
    }
}

fn write_section(f: &mut fmt::Formatter<'_>, title: &str, exprs: &[Expr]) -> fmt::Result {
    writeln!(f, "{title}:")?;
    for e in exprs {
        e.write_stmt(f, 1)?;
        writeln!(f)?;
    }
    Ok(())
}

impl fmt::Display for LoweredFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        writeln!(f, ")")?;
        write_section(f, "alloc", self.alloc_output_exprs())?;
        if !self.alloc_temp_exprs().is_empty() {
            write_section(f, "temp", self.alloc_temp_exprs())?;
        }
        if !self.arg_guard_exprs().is_empty() {
            write_section(f, "guards", self.arg_guard_exprs())?;
        }
        if let Some(casts) = self.buffer_cast_exprs() {
            write_section(f, "casts", casts)?;
        }
        writeln!(f, "body:")?;
        self.body.write_stmt(f, 1)?;
        writeln!(f)
    }
}
