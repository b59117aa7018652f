// te.rs — Tensor-expression builder
//
// Creates placeholder and compute tensors for strategy compute functions.
// Every tensor created here is materialized: its buffer (`_<name>`) is
// interned into the builder's arena and the returned `TensorRef` points at it.
//
// Preconditions: tensor names are unique within one builder.
// Postconditions: `tensors()` lists definitions in creation order.
// Failure modes: duplicate names, empty names, rank-0 shapes.
// Side effects: none.

use indexmap::IndexMap;

use crate::diag::{codes, DiagCode, ErrorClass};
use crate::ir::{Buffer, BufferArena, Expr, TensorRef, Var};
use crate::types::{ElementType, Shape};

#[derive(Debug, Clone, PartialEq)]
pub enum TensorOp {
    /// Storage provided from outside the computation.
    Placeholder,
    /// `tensor[axes...] = body`, where `body` is written in terms of `axes`.
    Compute { axes: Vec<Var>, body: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TensorDef {
    pub tensor: TensorRef,
    pub op: TensorOp,
}

impl TensorDef {
    pub fn is_compute(&self) -> bool {
        matches!(self.op, TensorOp::Compute { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TeError {
    #[error("tensor '{name}' is already defined")]
    DuplicateTensor { name: String },
    #[error("tensor name must not be empty")]
    EmptyName,
    #[error("tensor '{name}' has a rank-0 shape and cannot be materialized")]
    EmptyShape { name: String },
    #[error("'{op}' expects matching shapes, got {lhs} and {rhs}")]
    ShapeMismatch { op: String, lhs: Shape, rhs: Shape },
    #[error("'{op}' expects matching dtypes, got {lhs} and {rhs}")]
    DtypeMismatch {
        op: String,
        lhs: ElementType,
        rhs: ElementType,
    },
}

impl TeError {
    pub fn code(&self) -> DiagCode {
        codes::E0201
    }

    pub fn class(&self) -> ErrorClass {
        ErrorClass::Construction
    }
}

/// Name of the buffer bound for tensor `name`.
pub fn buffer_name(tensor: &str) -> String {
    format!("_{tensor}")
}

#[derive(Debug, Default)]
pub struct TeBuilder {
    arena: BufferArena,
    tensors: IndexMap<String, TensorDef>,
}

impl TeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placeholder(
        &mut self,
        name: &str,
        shape: Shape,
        dtype: ElementType,
    ) -> Result<TensorRef, TeError> {
        self.define(name, shape, dtype, TensorOp::Placeholder)
    }

    /// Define `name[i0, i1, ...] = f([i0, i1, ...])` over `shape`.
    pub fn compute(
        &mut self,
        name: &str,
        shape: Shape,
        dtype: ElementType,
        f: impl FnOnce(&[Expr]) -> Expr,
    ) -> Result<TensorRef, TeError> {
        let axes: Vec<Var> = (0..shape.rank()).map(|k| Var::index(format!("i{k}"))).collect();
        let indices: Vec<Expr> = axes.iter().map(Expr::var).collect();
        let body = f(&indices);
        self.define(name, shape, dtype, TensorOp::Compute { axes, body })
    }

    fn define(
        &mut self,
        name: &str,
        shape: Shape,
        dtype: ElementType,
        op: TensorOp,
    ) -> Result<TensorRef, TeError> {
        if name.is_empty() {
            return Err(TeError::EmptyName);
        }
        if shape.rank() == 0 {
            return Err(TeError::EmptyShape {
                name: name.to_string(),
            });
        }
        if self.tensors.contains_key(name) {
            return Err(TeError::DuplicateTensor {
                name: name.to_string(),
            });
        }

        let buffer = self.arena.intern(Buffer {
            name: buffer_name(name),
            tensor: name.to_string(),
            dtype,
            shape: shape.clone(),
        });
        let tensor = TensorRef {
            name: name.to_string(),
            shape,
            dtype,
            buffer: Some(buffer),
        };
        self.tensors.insert(
            name.to_string(),
            TensorDef {
                tensor: tensor.clone(),
                op,
            },
        );
        Ok(tensor)
    }

    pub fn tensor(&self, name: &str) -> Option<&TensorDef> {
        self.tensors.get(name)
    }

    pub fn tensors(&self) -> impl Iterator<Item = &TensorDef> {
        self.tensors.values()
    }

    pub fn arena(&self) -> &BufferArena {
        &self.arena
    }

    pub fn into_arena(self) -> BufferArena {
        self.arena
    }
}
