// Property-based tests for lowering and inference invariants.
//
// Four categories:
// 1. Output allocation: one malloc per output argument, in argument order
// 2. Signature validation: zero outputs always rejected
// 3. Buffer collection: idempotent, deduplicated, first-reference order
// 4. Dtype whitelist for the generator operator
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;
use tlc::attr::AttrMap;
use tlc::infer::InferError;
use tlc::ir::{Buffer, BufferArena, Expr, TensorRef};
use tlc::lowered_func::{Argument, LowerError, LoweredFunc};
use tlc::ops::randint;
use tlc::types::{ElementType, Shape};

// ── Generators ──────────────────────────────────────────────────────────────

fn arb_dtype() -> impl Strategy<Value = ElementType> {
    prop_oneof![
        Just(ElementType::Int8),
        Just(ElementType::Int32),
        Just(ElementType::Int64),
        Just(ElementType::UInt8),
        Just(ElementType::Float16),
        Just(ElementType::Float32),
        Just(ElementType::Float64),
        Just(ElementType::Bool),
    ]
}

/// (is_output, dtype) per argument.
fn arb_signature() -> impl Strategy<Value = Vec<(bool, ElementType)>> {
    prop::collection::vec((any::<bool>(), arb_dtype()), 0..8)
}

fn build_args(sig: &[(bool, ElementType)]) -> Vec<Argument> {
    sig.iter()
        .enumerate()
        .map(|(i, &(out, dtype))| {
            if out {
                Argument::output(format!("o{i}"), dtype)
            } else {
                Argument::input(format!("a{i}"), dtype)
            }
        })
        .collect()
}

/// Arena of `n` buffers and a body loading them in the order `refs` gives.
fn body_with_refs(n: usize, refs: &[usize]) -> (BufferArena, Expr, Vec<TensorRef>) {
    let mut arena = BufferArena::new();
    let tensors: Vec<TensorRef> = (0..n)
        .map(|k| {
            let id = arena.intern(Buffer {
                name: format!("_t{k}"),
                tensor: format!("t{k}"),
                dtype: ElementType::Float32,
                shape: Shape::from([2]),
            });
            TensorRef {
                name: format!("t{k}"),
                shape: Shape::from([2]),
                dtype: ElementType::Float32,
                buffer: Some(id),
            }
        })
        .collect();
    let loads = refs
        .iter()
        .map(|&k| Expr::load(&tensors[k % n], vec![Expr::int(0)]))
        .collect();
    (arena, Expr::Block(loads), tensors)
}

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 128,
        max_shrink_iters: 256,
        ..ProptestConfig::default()
    }
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(config())]

    #[test]
    fn one_allocation_per_output_in_order(sig in arb_signature()) {
        let args = build_args(&sig);
        let outputs: Vec<String> = args
            .iter()
            .filter(|a| a.is_output())
            .map(|a| a.name.clone())
            .collect();
        let result = LoweredFunc::make("f", args, Expr::int(0), BufferArena::new());
        if outputs.is_empty() {
            let is_signature_error = matches!(result, Err(LowerError::InvalidSignature { .. }));
            prop_assert!(is_signature_error);
        } else {
            let func = result.unwrap();
            let allocs: Vec<String> = func.alloc_output_exprs().iter().map(|e| e.to_string()).collect();
            let expected: Vec<String> = outputs
                .iter()
                .map(|n| format!("tlc_buffer_malloc({n})"))
                .collect();
            prop_assert_eq!(allocs, expected);
        }
    }

    #[test]
    fn zero_outputs_always_rejected(inputs in prop::collection::vec(arb_dtype(), 0..6)) {
        let args: Vec<Argument> = inputs
            .iter()
            .enumerate()
            .map(|(i, &d)| Argument::input(format!("a{i}"), d))
            .collect();
        let err = LoweredFunc::make("f", args, Expr::int(0), BufferArena::new()).unwrap_err();
        prop_assert_eq!(
            err,
            LowerError::InvalidSignature { func: "f".into(), inputs: inputs.len() }
        );
    }

    #[test]
    fn collection_is_stable_and_deduplicated(
        n in 1usize..6,
        refs in prop::collection::vec(0usize..6, 1..24),
    ) {
        let (arena, body, _) = body_with_refs(n, &refs);
        let func = LoweredFunc::make(
            "f",
            vec![Argument::output("o", ElementType::Float32)],
            body,
            arena,
        )
        .unwrap();

        let first: Vec<String> = func
            .collect_all_buffer_reference()
            .iter()
            .map(|b| b.name.clone())
            .collect();
        let second: Vec<String> = func
            .collect_all_buffer_reference()
            .iter()
            .map(|b| b.name.clone())
            .collect();
        prop_assert_eq!(&first, &second);

        let mut expected: Vec<String> = Vec::new();
        for &k in &refs {
            let name = format!("_t{}", k % n);
            if !expected.contains(&name) {
                expected.push(name);
            }
        }
        prop_assert_eq!(first, expected);
    }

    #[test]
    fn casts_match_collection(n in 1usize..5, refs in prop::collection::vec(0usize..5, 1..12)) {
        let (arena, body, _) = body_with_refs(n, &refs);
        let mut func = LoweredFunc::make(
            "f",
            vec![Argument::output("o", ElementType::Float32)],
            body,
            arena,
        )
        .unwrap();
        let distinct = func.collect_all_buffer_reference().len();
        prop_assert_eq!(func.prepare_buffer_cast_exprs().unwrap().len(), distinct);
        let is_duplicate = matches!(
            func.prepare_buffer_cast_exprs(),
            Err(LowerError::DuplicatePreparation { .. })
        );
        prop_assert!(is_duplicate);
    }

    #[test]
    fn generator_dtype_whitelist(dtype in arb_dtype()) {
        let attrs = AttrMap::new()
            .with("shape", vec![2i64])
            .with("dtype", dtype.name());
        let result = randint::infer_dtype(&[], &attrs);
        if randint::ALLOWED_DTYPES.contains(&dtype) {
            prop_assert_eq!(result.unwrap(), vec![dtype]);
        } else {
            let names_value = matches!(
                &result,
                Err(InferError::UnsupportedDtype { value, .. }) if value == dtype.name()
            );
            prop_assert!(names_value);
        }
    }

    #[test]
    fn generator_shape_follows_attribute(dims in prop::collection::vec(1i64..64, 1..5)) {
        let attrs = AttrMap::new().with("shape", dims.clone());
        let shapes = randint::infer_shape(&[], &attrs).unwrap();
        let expected: Vec<u32> = dims.iter().map(|&d| d as u32).collect();
        prop_assert_eq!(shapes, vec![Shape::new(expected)]);
    }
}
