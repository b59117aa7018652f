// pe.rs — Primitive elements
//
// Reusable compute definitions that operator strategies assemble.

use crate::ir::{BinOp, Expr, TensorRef};
use crate::te::{TeBuilder, TeError};

/// `out[idx] = input[idx]`.
pub fn identity(b: &mut TeBuilder, input: &TensorRef, name: &str) -> Result<TensorRef, TeError> {
    b.compute(name, input.shape.clone(), input.dtype, |idx| {
        Expr::load(input, idx.to_vec())
    })
}

/// `out[idx] = lhs[idx] <op> rhs[idx]`. Shapes and dtypes must match exactly.
pub fn elementwise_binary(
    b: &mut TeBuilder,
    op: BinOp,
    lhs: &TensorRef,
    rhs: &TensorRef,
    name: &str,
) -> Result<TensorRef, TeError> {
    if lhs.shape != rhs.shape {
        return Err(TeError::ShapeMismatch {
            op: name.to_string(),
            lhs: lhs.shape.clone(),
            rhs: rhs.shape.clone(),
        });
    }
    if lhs.dtype != rhs.dtype {
        return Err(TeError::DtypeMismatch {
            op: name.to_string(),
            lhs: lhs.dtype,
            rhs: rhs.dtype,
        });
    }
    b.compute(name, lhs.shape.clone(), lhs.dtype, |idx| {
        Expr::binary(
            op,
            Expr::load(lhs, idx.to_vec()),
            Expr::load(rhs, idx.to_vec()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::te::TensorOp;
    use crate::types::{ElementType, Shape};

    #[test]
    fn identity_reads_input() {
        let mut b = TeBuilder::new();
        let x = b
            .placeholder("x", Shape::from([4]), ElementType::Int64)
            .unwrap();
        let y = identity(&mut b, &x, "y").unwrap();
        assert_eq!(y.shape, x.shape);
        let TensorOp::Compute { body, .. } = &b.tensor("y").unwrap().op else {
            panic!("expected compute");
        };
        assert_eq!(body.to_string(), "x[i0]");
    }

    #[test]
    fn binary_rejects_shape_mismatch() {
        let mut b = TeBuilder::new();
        let x = b
            .placeholder("x", Shape::from([4]), ElementType::Float32)
            .unwrap();
        let y = b
            .placeholder("y", Shape::from([5]), ElementType::Float32)
            .unwrap();
        let err = elementwise_binary(&mut b, BinOp::Add, &x, &y, "z").unwrap_err();
        assert!(matches!(err, TeError::ShapeMismatch { .. }));
    }

    #[test]
    fn binary_body() {
        let mut b = TeBuilder::new();
        let x = b
            .placeholder("x", Shape::from([2, 2]), ElementType::Float32)
            .unwrap();
        let y = b
            .placeholder("y", Shape::from([2, 2]), ElementType::Float32)
            .unwrap();
        elementwise_binary(&mut b, BinOp::Mul, &x, &y, "z").unwrap();
        let TensorOp::Compute { body, .. } = &b.tensor("z").unwrap().op else {
            panic!("expected compute");
        };
        assert_eq!(body.to_string(), "(x[i0, i1] * y[i0, i1])");
    }
}
