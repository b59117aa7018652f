// infer.rs — Shape and dtype inference helpers
//
// Inference functions are pure: input shapes or dtypes plus attributes in,
// one shape or dtype per output out. This module holds the error type they
// share and the attribute readers most operators need.
//
// Preconditions: none.
// Postconditions: helpers never default silently except where documented.
// Failure modes: see `InferError`.
// Side effects: none.

use crate::attr::{AttrError, AttrMap};
use crate::diag::{codes, DiagCode, ErrorClass};
use crate::types::{ElementType, Shape};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferError {
    #[error("operator '{op}' requires attribute '{key}'")]
    MissingAttribute { op: String, key: String },
    #[error("operator '{op}': attribute '{key}' is invalid: {reason}")]
    InvalidAttribute {
        op: String,
        key: String,
        reason: String,
    },
    #[error("operator '{op}' does not support dtype '{value}' (allowed: {allowed})")]
    UnsupportedDtype {
        op: String,
        value: String,
        allowed: String,
    },
    #[error("operator '{op}': {source}")]
    Attr {
        op: String,
        #[source]
        source: AttrError,
    },
    #[error("operator '{op}' takes {expected} inputs, got {found}")]
    ArityMismatch {
        op: String,
        expected: usize,
        found: usize,
    },
    #[error("operator '{op}' expects matching input shapes, got {lhs} and {rhs}")]
    ShapeMismatch { op: String, lhs: Shape, rhs: Shape },
    #[error("operator '{op}' expects matching input dtypes, got {lhs} and {rhs}")]
    DtypeMismatch {
        op: String,
        lhs: ElementType,
        rhs: ElementType,
    },
    #[error("operator '{op}' declares {expected} outputs but inference produced {found}")]
    OutputCountMismatch {
        op: String,
        expected: usize,
        found: usize,
    },
}

impl InferError {
    pub fn code(&self) -> DiagCode {
        match self {
            InferError::MissingAttribute { .. } => codes::E0100,
            InferError::InvalidAttribute { .. } => codes::E0101,
            InferError::UnsupportedDtype { .. } => codes::E0102,
            InferError::Attr { .. } => codes::E0103,
            InferError::ArityMismatch { .. } => codes::E0104,
            InferError::ShapeMismatch { .. } => codes::E0105,
            InferError::DtypeMismatch { .. } => codes::E0106,
            InferError::OutputCountMismatch { .. } => codes::I0001,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            InferError::OutputCountMismatch { .. } => ErrorClass::Internal,
            _ => ErrorClass::Construction,
        }
    }

    pub fn op(&self) -> &str {
        match self {
            InferError::MissingAttribute { op, .. }
            | InferError::InvalidAttribute { op, .. }
            | InferError::UnsupportedDtype { op, .. }
            | InferError::Attr { op, .. }
            | InferError::ArityMismatch { op, .. }
            | InferError::ShapeMismatch { op, .. }
            | InferError::DtypeMismatch { op, .. }
            | InferError::OutputCountMismatch { op, .. } => op,
        }
    }
}

/// Read a required, non-empty integer-list shape attribute.
pub fn shape_attr(op: &str, attrs: &AttrMap, key: &str) -> Result<Shape, InferError> {
    let dims = attrs
        .get_int_list(key)
        .map_err(|source| InferError::Attr {
            op: op.to_string(),
            source,
        })?
        .ok_or_else(|| InferError::MissingAttribute {
            op: op.to_string(),
            key: key.to_string(),
        })?;

    let invalid = |reason: String| InferError::InvalidAttribute {
        op: op.to_string(),
        key: key.to_string(),
        reason,
    };
    if dims.is_empty() {
        return Err(invalid("shape must have at least one dimension".to_string()));
    }
    let dims = dims
        .iter()
        .map(|&d| u32::try_from(d).map_err(|_| invalid(format!("dimension {d} is out of range"))))
        .collect::<Result<Vec<u32>, _>>()?;
    Ok(Shape::new(dims))
}

/// Read an optional dtype attribute, restricted to `allowed`. Absent means
/// `default`.
pub fn dtype_attr(
    op: &str,
    attrs: &AttrMap,
    key: &str,
    default: ElementType,
    allowed: &[ElementType],
) -> Result<ElementType, InferError> {
    let Some(name) = attrs.get_str(key).map_err(|source| InferError::Attr {
        op: op.to_string(),
        source,
    })?
    else {
        return Ok(default);
    };

    match ElementType::from_name(name) {
        Some(dtype) if allowed.contains(&dtype) => Ok(dtype),
        _ => Err(InferError::UnsupportedDtype {
            op: op.to_string(),
            value: name.to_string(),
            allowed: allowed
                .iter()
                .map(|t| t.name())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

pub fn check_arity(op: &str, expected: usize, found: usize) -> Result<(), InferError> {
    if expected != found {
        return Err(InferError::ArityMismatch {
            op: op.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// All `shapes` equal; returns the common shape.
pub fn same_shape(op: &str, shapes: &[Shape]) -> Result<Shape, InferError> {
    let (first, rest) = shapes.split_first().ok_or_else(|| InferError::ArityMismatch {
        op: op.to_string(),
        expected: 1,
        found: 0,
    })?;
    if let Some(other) = rest.iter().find(|s| *s != first) {
        return Err(InferError::ShapeMismatch {
            op: op.to_string(),
            lhs: first.clone(),
            rhs: other.clone(),
        });
    }
    Ok(first.clone())
}

/// All `dtypes` equal; returns the common dtype.
pub fn same_dtype(op: &str, dtypes: &[ElementType]) -> Result<ElementType, InferError> {
    let (&first, rest) = dtypes.split_first().ok_or_else(|| InferError::ArityMismatch {
        op: op.to_string(),
        expected: 1,
        found: 0,
    })?;
    if let Some(&other) = rest.iter().find(|&&t| t != first) {
        return Err(InferError::DtypeMismatch {
            op: op.to_string(),
            lhs: first,
            rhs: other,
        });
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrValue;

    const INTS: &[ElementType] = &[ElementType::Int32, ElementType::Int64];

    #[test]
    fn shape_required() {
        let err = shape_attr("gen", &AttrMap::new(), "shape").unwrap_err();
        assert_eq!(err.code(), codes::E0100);
    }

    #[test]
    fn shape_nonempty() {
        let attrs = AttrMap::new().with("shape", AttrValue::IntList(vec![]));
        let err = shape_attr("gen", &attrs, "shape").unwrap_err();
        assert!(matches!(err, InferError::InvalidAttribute { .. }));
    }

    #[test]
    fn shape_rejects_negative_dim() {
        let attrs = AttrMap::new().with("shape", vec![4i64, -1]);
        let err = shape_attr("gen", &attrs, "shape").unwrap_err();
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn shape_wrong_kind() {
        let attrs = AttrMap::new().with("shape", "4x8");
        let err = shape_attr("gen", &attrs, "shape").unwrap_err();
        assert_eq!(err.code(), codes::E0103);
    }

    #[test]
    fn dtype_default_and_whitelist() {
        let none = AttrMap::new();
        assert_eq!(
            dtype_attr("gen", &none, "dtype", ElementType::Int64, INTS).unwrap(),
            ElementType::Int64
        );
        let i32s = AttrMap::new().with("dtype", "int32");
        assert_eq!(
            dtype_attr("gen", &i32s, "dtype", ElementType::Int64, INTS).unwrap(),
            ElementType::Int32
        );
        let f32s = AttrMap::new().with("dtype", "float32");
        let err = dtype_attr("gen", &f32s, "dtype", ElementType::Int64, INTS).unwrap_err();
        assert_eq!(
            err.to_string(),
            "operator 'gen' does not support dtype 'float32' (allowed: int32, int64)"
        );
    }

    #[test]
    fn mismatched_shapes() {
        let err = same_shape("add", &[Shape::from([2]), Shape::from([3])]).unwrap_err();
        assert_eq!(err.code(), codes::E0105);
        assert_eq!(err.op(), "add");
    }
}
