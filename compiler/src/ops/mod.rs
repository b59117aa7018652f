// ops/mod.rs — Built-in operators
//
// Each submodule provides the inference functions and strategy builder for
// one operator family and a `register` hook. `register_builtin_ops` is the
// single startup entry point.

pub mod elementwise;
pub mod identity;
pub mod randint;

use crate::ir::TensorRef;
use crate::registry::{RegistryBuilder, RegistryError, StrategyRequest};
use crate::strategy::StrategyError;
use crate::types::{ElementType, Shape};

pub fn register_builtin_ops(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    randint::register(builder)?;
    identity::register(builder)?;
    elementwise::register(builder)?;
    Ok(())
}

/// Shape and dtype of a single-output operator's only output.
fn single_output(op: &str, req: &StrategyRequest<'_>) -> Result<(Shape, ElementType), StrategyError> {
    match (req.out_shapes, req.out_types) {
        ([shape], [dtype]) => Ok((shape.clone(), *dtype)),
        (shapes, types) => Err(StrategyError::OutputMetadata {
            op: op.to_string(),
            expected: 1,
            found: shapes.len().max(types.len()),
        }),
    }
}

fn input<'a>(op: &str, inputs: &'a [TensorRef], index: usize) -> Result<&'a TensorRef, StrategyError> {
    inputs.get(index).ok_or_else(|| StrategyError::MissingInput {
        op: op.to_string(),
        index,
    })
}

/// Output tensor name for `op`.
fn out_name(op: &str) -> String {
    format!("{op}_out")
}
