// ops/identity.rs — Pass-through copy of one input

use std::sync::Arc;

use crate::attr::AttrMap;
use crate::infer::{same_dtype, same_shape, InferError};
use crate::ir::TensorRef;
use crate::pe;
use crate::registry::{OpDef, OpPatternKind, RegistryBuilder, RegistryError, StrategyRequest};
use crate::schedule::{create_stages, injective_schedule};
use crate::strategy::{ComputeFn, ComputeOutput, OpStrategy, StrategyError, TargetFilter};
use crate::te::TeBuilder;
use crate::types::{ElementType, Shape};

pub const NAME: &str = "identity";

fn infer_shape(inputs: &[Shape], _attrs: &AttrMap) -> Result<Vec<Shape>, InferError> {
    Ok(vec![same_shape(NAME, inputs)?])
}

fn infer_dtype(inputs: &[ElementType], _attrs: &AttrMap) -> Result<Vec<ElementType>, InferError> {
    Ok(vec![same_dtype(NAME, inputs)?])
}

fn strategy(req: &StrategyRequest<'_>) -> Result<OpStrategy, StrategyError> {
    super::single_output(NAME, req)?;
    let out_name = super::out_name(NAME);

    let compute: ComputeFn = Arc::new(
        move |b: &mut TeBuilder, inputs: &[TensorRef]| -> Result<ComputeOutput, StrategyError> {
            let x = super::input(NAME, inputs, 0)?;
            let out = pe::identity(b, x, &out_name)?;
            let stages = create_stages(b, std::slice::from_ref(&out))?;
            Ok(ComputeOutput {
                outputs: vec![out],
                stages,
            })
        },
    );

    let mut strategy = OpStrategy::new(NAME);
    strategy.add_impl(
        compute,
        injective_schedule(req.target),
        TargetFilter::Any,
        "strategy.identity",
        1,
    );
    Ok(strategy)
}

pub fn register(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder.register(
        OpDef::builder(NAME)
            .describe("Copy the input tensor")
            .set_num_inputs(1)
            .set_num_outputs(1)
            .set_infer_shape(infer_shape)
            .set_infer_dtype(infer_dtype)
            .set_strategy(strategy)
            .set_pattern(OpPatternKind::ElementWise)
            .set_support_level(4)
            .build()?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Target;

    #[test]
    fn copies_declared_input() {
        let shapes = infer_shape(&[Shape::from([3, 5])], &AttrMap::new()).unwrap();
        let types = infer_dtype(&[ElementType::UInt8], &AttrMap::new()).unwrap();
        let attrs = AttrMap::new();
        let target = Target::x86();
        let strategy = strategy(&StrategyRequest {
            attrs: &attrs,
            inputs: &[],
            out_types: &types,
            out_shapes: &shapes,
            target: &target,
        })
        .unwrap();

        let mut b = TeBuilder::new();
        let x = b.placeholder("x", Shape::from([3, 5]), ElementType::UInt8).unwrap();
        let imp = strategy.select(&target).unwrap();
        let out = (imp.compute)(&mut b, &[x]).unwrap();
        assert_eq!(out.outputs[0].shape, shapes[0]);
        assert_eq!(out.outputs[0].dtype, ElementType::UInt8);
        assert!(out.stages.get("identity_out").is_some());
    }
}
