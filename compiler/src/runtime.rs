// runtime.rs — Runtime call surface
//
// Names and signatures of the native entry points lowered bodies call into.
// The native implementations are opaque; this module only guarantees that
// every call site it builds has the right arity and argument types.
// Argument bundles are packed generically: a count followed by the values.
//
// Preconditions: none.
// Postconditions: typed builders always produce well-formed calls;
//   `call_intrinsic` validates calls assembled by name.
// Failure modes: unknown intrinsic, arity or type mismatch.
// Side effects: none.

use crate::diag::{codes, DiagCode, ErrorClass};
use crate::ir::{Expr, Type, Var};
use crate::types::ElementType;

pub const BUFFER_MALLOC: &str = "tlc_buffer_malloc";
pub const BUFFER_GET_DATA_HANDLE: &str = "tlc_buffer_get_data_handle";
pub const PACK_ARGS: &str = "tlc_pack_args";
pub const ASSERT_TRUE: &str = "tlc_assert_true";
pub const CALL_CHOLESKY_HOST: &str = "tlc_call_cholesky_host";

/// Null stream/handle operand.
pub const NULL_HANDLE: &str = "nullptr";

/// What a parameter slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Any opaque handle or typed pointer.
    Handle,
    Int32,
    Bool,
}

impl ParamKind {
    fn accepts(self, ty: Type) -> bool {
        match self {
            ParamKind::Handle => matches!(ty, Type::Handle | Type::Ptr(_)),
            ParamKind::Int32 => ty == Type::Scalar(ElementType::Int32),
            ParamKind::Bool => ty == Type::Scalar(ElementType::Bool),
        }
    }
}

/// Fixed signature of one native entry point.
#[derive(Debug, Clone, Copy)]
pub struct IntrinsicSig {
    pub name: &'static str,
    pub params: &'static [ParamKind],
    /// Accepts any number of trailing operands after `params` (packing).
    pub variadic: bool,
    pub ret: Type,
}

pub const INTRINSICS: &[IntrinsicSig] = &[
    IntrinsicSig {
        name: BUFFER_MALLOC,
        params: &[ParamKind::Handle],
        variadic: false,
        ret: Type::Void,
    },
    IntrinsicSig {
        name: BUFFER_GET_DATA_HANDLE,
        params: &[ParamKind::Handle],
        variadic: false,
        ret: Type::Handle,
    },
    IntrinsicSig {
        name: PACK_ARGS,
        params: &[ParamKind::Int32],
        variadic: true,
        ret: Type::Handle,
    },
    // (args, msg, only_warning, stream)
    IntrinsicSig {
        name: ASSERT_TRUE,
        params: &[
            ParamKind::Handle,
            ParamKind::Int32,
            ParamKind::Bool,
            ParamKind::Handle,
        ],
        variadic: false,
        ret: Type::Void,
    },
    // (args, num_args, batch_size, m, upper)
    IntrinsicSig {
        name: CALL_CHOLESKY_HOST,
        params: &[
            ParamKind::Handle,
            ParamKind::Int32,
            ParamKind::Int32,
            ParamKind::Int32,
            ParamKind::Bool,
        ],
        variadic: false,
        ret: Type::Void,
    },
];

pub fn lookup(name: &str) -> Option<&'static IntrinsicSig> {
    INTRINSICS.iter().find(|sig| sig.name == name)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeCallError {
    #[error("unknown runtime entry point '{name}'")]
    UnknownIntrinsic { name: String },
    #[error("'{name}' takes {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("'{name}' argument {index} has type {found}, expected {expected:?}")]
    ArgType {
        name: String,
        index: usize,
        expected: ParamKind,
        found: Type,
    },
}

impl RuntimeCallError {
    pub fn code(&self) -> DiagCode {
        codes::E0303
    }

    pub fn class(&self) -> ErrorClass {
        ErrorClass::Construction
    }
}

/// Build a call to `name`, checking it against the signature table.
pub fn call_intrinsic(name: &str, args: Vec<Expr>) -> Result<Expr, RuntimeCallError> {
    let sig = lookup(name).ok_or_else(|| RuntimeCallError::UnknownIntrinsic {
        name: name.to_string(),
    })?;

    let arity_ok = if sig.variadic {
        args.len() >= sig.params.len()
    } else {
        args.len() == sig.params.len()
    };
    if !arity_ok {
        return Err(RuntimeCallError::Arity {
            name: name.to_string(),
            expected: sig.params.len(),
            found: args.len(),
        });
    }

    for (index, (param, arg)) in sig.params.iter().zip(&args).enumerate() {
        if !param.accepts(arg.ty()) {
            return Err(RuntimeCallError::ArgType {
                name: name.to_string(),
                index,
                expected: *param,
                found: arg.ty(),
            });
        }
    }

    Ok(Expr::Call {
        name: sig.name.to_string(),
        args,
        ret: sig.ret,
    })
}

fn null_handle() -> Expr {
    Expr::Var(Var::new(NULL_HANDLE, Type::Handle))
}

/// Allocate storage for the buffer named by `data`.
pub fn buffer_malloc(data: Var) -> Expr {
    Expr::Call {
        name: BUFFER_MALLOC.to_string(),
        args: vec![Expr::Var(data)],
        ret: Type::Void,
    }
}

/// Typed data pointer of `buffer`.
pub fn buffer_get_data_handle(buffer: Var, dtype: ElementType) -> Expr {
    Expr::Call {
        name: BUFFER_GET_DATA_HANDLE.to_string(),
        args: vec![Expr::Var(buffer)],
        ret: Type::Ptr(dtype),
    }
}

/// Pack `values` into one opaque argument bundle: count, then the values.
pub fn pack_args(values: Vec<Expr>) -> Expr {
    let mut args = Vec::with_capacity(values.len() + 1);
    args.push(Expr::int(values.len() as i64));
    args.extend(values);
    Expr::Call {
        name: PACK_ARGS.to_string(),
        args,
        ret: Type::Handle,
    }
}

/// Runtime assertion. `only_warning` downgrades a failure to a warning;
/// `stream` defaults to the null handle.
pub fn assert_true(args: Expr, msg: i32, only_warning: bool, stream: Option<Var>) -> Expr {
    Expr::Call {
        name: ASSERT_TRUE.to_string(),
        args: vec![
            args,
            Expr::int(msg as i64),
            Expr::bool(only_warning),
            stream.map(Expr::Var).unwrap_or_else(null_handle),
        ],
        ret: Type::Void,
    }
}

/// Host Cholesky decomposition over `batch_size` matrices of size `m`.
pub fn call_cholesky_host(args: Expr, num_args: i32, batch_size: i32, m: i32, upper: bool) -> Expr {
    Expr::Call {
        name: CALL_CHOLESKY_HOST.to_string(),
        args: vec![
            args,
            Expr::int(num_args as i64),
            Expr::int(batch_size as i64),
            Expr::int(m as i64),
            Expr::bool(upper),
        ],
        ret: Type::Void,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(name: &str) -> Expr {
        Expr::Var(Var::new(name, Type::Handle))
    }

    /// Typed builders must pass their own signature check.
    fn recheck(call: &Expr) {
        let Expr::Call { name, args, .. } = call else {
            panic!("not a call: {call}");
        };
        call_intrinsic(name, args.clone()).unwrap();
    }

    #[test]
    fn builders_match_signatures() {
        recheck(&buffer_malloc(Var::new("out", Type::Handle)));
        recheck(&buffer_get_data_handle(
            Var::new("_out", Type::Handle),
            ElementType::Float32,
        ));
        recheck(&pack_args(vec![handle("a"), handle("b")]));
        recheck(&assert_true(pack_args(vec![handle("x")]), 3, true, None));
        recheck(&call_cholesky_host(
            pack_args(vec![handle("x"), handle("y")]),
            2,
            4,
            16,
            false,
        ));
    }

    #[test]
    fn assert_true_default_stream() {
        let call = assert_true(handle("args"), 7, false, None);
        assert_eq!(call.to_string(), "tlc_assert_true(args, 7, false, nullptr)");
    }

    #[test]
    fn pack_args_leads_with_count() {
        let call = pack_args(vec![handle("a"), handle("b"), handle("c")]);
        assert_eq!(call.to_string(), "tlc_pack_args(3, a, b, c)");
    }

    #[test]
    fn arity_checked() {
        let err = call_intrinsic(CALL_CHOLESKY_HOST, vec![handle("x")]).unwrap_err();
        assert_eq!(
            err,
            RuntimeCallError::Arity {
                name: CALL_CHOLESKY_HOST.to_string(),
                expected: 5,
                found: 1,
            }
        );
    }

    #[test]
    fn arg_types_checked() {
        let err = call_intrinsic(
            ASSERT_TRUE,
            vec![handle("x"), Expr::bool(true), Expr::bool(true), handle("s")],
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeCallError::ArgType { index: 1, .. }));
    }

    #[test]
    fn unknown_name_rejected() {
        assert!(matches!(
            call_intrinsic("tlc_launch_rockets", vec![]),
            Err(RuntimeCallError::UnknownIntrinsic { .. })
        ));
    }
}
