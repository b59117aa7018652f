// lower.rs — Stage lowering and function assembly
//
// Turns the scheduled stages of one compute call into a single body
// expression, classifies the node's inputs and the compute outputs into
// function arguments, and constructs the `LoweredFunc`.
//
// Preconditions: stages have been scheduled; `arena` holds every buffer the
//   stages reference.
// Postconditions: the returned function has one argument per input and per
//   output, in that order, each bound to its buffer.
// Failure modes: `LowerError` from `LoweredFunc` construction.
// Side effects: none.

use crate::ir::{BufferArena, Expr, TensorRef};
use crate::lowered_func::{Argument, LowerError, LoweredFunc, TempBufferPolicy};
use crate::schedule::StageMap;

/// Loop nests of every stage in order. A single stage is returned as is;
/// several are sequenced in a block.
pub fn lower_stages(stages: &StageMap) -> Expr {
    let mut bodies: Vec<Expr> = stages.iter().map(|s| s.lower()).collect();
    if bodies.len() == 1 {
        if let Some(body) = bodies.pop() {
            return body;
        }
    }
    Expr::Block(bodies)
}

fn argument(arena: &BufferArena, tensor: &TensorRef, output: bool) -> Argument {
    let bound = tensor
        .buffer
        .and_then(|id| arena.get(id).map(|b| (id, b.name.clone())));
    let name = bound
        .as_ref()
        .map_or_else(|| tensor.name.clone(), |(_, n)| n.clone());
    let arg = if output {
        Argument::output(name, tensor.dtype)
    } else {
        Argument::input(name, tensor.dtype)
    };
    match bound {
        Some((id, _)) => arg.with_buffer(id),
        None => arg,
    }
}

/// Inputs first, then outputs.
pub fn classify_args(arena: &BufferArena, inputs: &[TensorRef], outputs: &[TensorRef]) -> Vec<Argument> {
    inputs
        .iter()
        .map(|t| argument(arena, t, false))
        .chain(outputs.iter().map(|t| argument(arena, t, true)))
        .collect()
}

pub fn lower_function(
    name: &str,
    stages: &StageMap,
    inputs: &[TensorRef],
    outputs: &[TensorRef],
    arena: BufferArena,
    policy: &dyn TempBufferPolicy,
) -> Result<LoweredFunc, LowerError> {
    let args = classify_args(&arena, inputs, outputs);
    let body = lower_stages(stages);
    tracing::trace!(func = name, stages = stages.len(), "lowering stages");
    LoweredFunc::make_with_policy(name, args, body, arena, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lowered_func::{ArgKind, NoTempBuffers};
    use crate::pe;
    use crate::schedule::create_stages;
    use crate::te::TeBuilder;
    use crate::types::{ElementType, Shape};

    #[test]
    fn args_bound_to_buffers() {
        let mut b = TeBuilder::new();
        let x = b
            .placeholder("x", Shape::from([4]), ElementType::Float32)
            .unwrap();
        let y = pe::identity(&mut b, &x, "y").unwrap();
        let args = classify_args(b.arena(), &[x], &[y]);
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, "_x");
        assert_eq!(args[0].kind, ArgKind::Input);
        assert_eq!(args[1].name, "_y");
        assert!(args[1].buffer.is_some());
    }

    #[test]
    fn two_stages_become_a_block() {
        let mut b = TeBuilder::new();
        let x = b
            .placeholder("x", Shape::from([2]), ElementType::Int32)
            .unwrap();
        let y = pe::identity(&mut b, &x, "y").unwrap();
        let z = pe::identity(&mut b, &y, "z").unwrap();
        let stages = create_stages(&b, std::slice::from_ref(&z)).unwrap();
        let func = lower_function(
            "chain",
            &stages,
            &[x],
            &[z],
            b.into_arena(),
            &NoTempBuffers,
        )
        .unwrap();
        let Expr::Block(stmts) = func.body() else {
            panic!("expected a block");
        };
        assert_eq!(stmts.len(), 2);
        assert_eq!(func.collect_all_buffer_reference().len(), 3);
    }
}
