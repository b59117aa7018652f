// ops/elementwise.rs — Binary elementwise arithmetic
//
// `elementwise_add`, `elementwise_sub` and `elementwise_mul` take two inputs
// of identical shape and dtype. Each strategy carries a generic
// implementation and a GPU-ranked alias of it at higher priority.

use std::sync::Arc;

use crate::attr::AttrMap;
use crate::infer::{same_dtype, same_shape, InferError};
use crate::ir::{BinOp, TensorRef};
use crate::pe;
use crate::registry::{OpDef, OpPatternKind, RegistryBuilder, RegistryError, StrategyFn, StrategyRequest};
use crate::schedule::{create_stages, injective_schedule};
use crate::strategy::{ComputeFn, ComputeOutput, OpStrategy, StrategyError, TargetFilter};
use crate::target::Arch;
use crate::te::TeBuilder;
use crate::types::{ElementType, Shape};

pub const ADD: &str = "elementwise_add";
pub const SUB: &str = "elementwise_sub";
pub const MUL: &str = "elementwise_mul";

fn infer_shape(op: &str, inputs: &[Shape]) -> Result<Vec<Shape>, InferError> {
    Ok(vec![same_shape(op, inputs)?])
}

fn infer_dtype(op: &str, inputs: &[ElementType]) -> Result<Vec<ElementType>, InferError> {
    Ok(vec![same_dtype(op, inputs)?])
}

fn binary_compute(op: &'static str, bin: BinOp) -> ComputeFn {
    let out_name = super::out_name(op);
    Arc::new(
        move |b: &mut TeBuilder, inputs: &[TensorRef]| -> Result<ComputeOutput, StrategyError> {
            let lhs = super::input(op, inputs, 0)?;
            let rhs = super::input(op, inputs, 1)?;
            let out = pe::elementwise_binary(b, bin, lhs, rhs, &out_name)?;
            let stages = create_stages(b, std::slice::from_ref(&out))?;
            Ok(ComputeOutput {
                outputs: vec![out],
                stages,
            })
        },
    )
}

/// Generic implementation plus `strategy.<op>.nvgpu`, a priority-ranked
/// alias restricted to GPU targets. The alias shares the compute and the
/// target-driven injective schedule, so both lower to the same function; it
/// only fixes which name a GPU compile reports.
fn binary_strategy(
    op: &'static str,
    bin: BinOp,
    req: &StrategyRequest<'_>,
) -> Result<OpStrategy, StrategyError> {
    super::single_output(op, req)?;
    let mut strategy = OpStrategy::new(op);
    strategy.add_impl(
        binary_compute(op, bin),
        injective_schedule(req.target),
        TargetFilter::Any,
        format!("strategy.{op}"),
        1,
    );
    strategy.add_impl(
        binary_compute(op, bin),
        injective_schedule(req.target),
        TargetFilter::Arch(Arch::NvGpu),
        format!("strategy.{op}.nvgpu"),
        10,
    );
    Ok(strategy)
}

macro_rules! binary_op {
    ($module:ident, $name:expr, $bin:expr, $desc:expr) => {
        mod $module {
            use super::*;

            pub fn infer_shape(inputs: &[Shape], _attrs: &AttrMap) -> Result<Vec<Shape>, InferError> {
                super::infer_shape($name, inputs)
            }

            pub fn infer_dtype(
                inputs: &[ElementType],
                _attrs: &AttrMap,
            ) -> Result<Vec<ElementType>, InferError> {
                super::infer_dtype($name, inputs)
            }

            pub fn strategy(req: &StrategyRequest<'_>) -> Result<OpStrategy, StrategyError> {
                super::binary_strategy($name, $bin, req)
            }

            pub const DESCRIPTION: &str = $desc;
        }
    };
}

binary_op!(add, ADD, BinOp::Add, "Elementwise sum of two tensors");
binary_op!(sub, SUB, BinOp::Sub, "Elementwise difference of two tensors");
binary_op!(mul, MUL, BinOp::Mul, "Elementwise product of two tensors");

fn register_one(
    builder: &mut RegistryBuilder,
    name: &str,
    description: &str,
    infer_shape: crate::registry::InferShapeFn,
    infer_dtype: crate::registry::InferDtypeFn,
    strategy: StrategyFn,
) -> Result<(), RegistryError> {
    builder.register(
        OpDef::builder(name)
            .describe(description)
            .set_num_inputs(2)
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

pub fn register(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    register_one(builder, ADD, add::DESCRIPTION, add::infer_shape, add::infer_dtype, add::strategy)?;
    register_one(builder, SUB, sub::DESCRIPTION, sub::infer_shape, sub::infer_dtype, sub::strategy)?;
    register_one(builder, MUL, mul::DESCRIPTION, mul::infer_shape, mul::infer_dtype, mul::strategy)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Target;

    fn request<'a>(
        attrs: &'a AttrMap,
        shapes: &'a [Shape],
        types: &'a [ElementType],
        target: &'a Target,
    ) -> StrategyRequest<'a> {
        StrategyRequest {
            attrs,
            inputs: &[],
            out_types: types,
            out_shapes: shapes,
            target,
        }
    }

    #[test]
    fn gpu_impl_preferred_on_gpu_only() {
        let attrs = AttrMap::new();
        let shapes = [Shape::from([8])];
        let types = [ElementType::Float32];

        let gpu = Target::nvgpu();
        let s = add::strategy(&request(&attrs, &shapes, &types, &gpu)).unwrap();
        assert_eq!(s.select(&gpu).unwrap().name, "strategy.elementwise_add.nvgpu");

        let cpu = Target::x86();
        let s = add::strategy(&request(&attrs, &shapes, &types, &cpu)).unwrap();
        assert_eq!(s.select(&cpu).unwrap().name, "strategy.elementwise_add");
    }

    #[test]
    fn inference_requires_matching_inputs() {
        let attrs = AttrMap::new();
        assert!(matches!(
            mul::infer_shape(&[Shape::from([2]), Shape::from([4])], &attrs),
            Err(InferError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            sub::infer_dtype(&[ElementType::Int32, ElementType::Float32], &attrs),
            Err(InferError::DtypeMismatch { .. })
        ));
        assert_eq!(
            add::infer_dtype(&[ElementType::Float16, ElementType::Float16], &attrs).unwrap(),
            vec![ElementType::Float16]
        );
    }

    #[test]
    fn compute_reads_both_inputs() {
        let mut b = TeBuilder::new();
        let x = b.placeholder("x", Shape::from([4]), ElementType::Float32).unwrap();
        let y = b.placeholder("y", Shape::from([4]), ElementType::Float32).unwrap();
        let out = (binary_compute(ADD, BinOp::Add))(&mut b, &[x, y]).unwrap();
        assert_eq!(out.outputs[0].name, "elementwise_add_out");
        let missing = (binary_compute(MUL, BinOp::Mul))(&mut b, &[]).unwrap_err();
        assert!(matches!(missing, StrategyError::MissingInput { index: 0, .. }));
    }

    #[test]
    fn gpu_alias_schedules_like_generic() {
        let attrs = AttrMap::new();
        let shapes = [Shape::from([2048])];
        let types = [ElementType::Float32];
        let gpu = Target::nvgpu();
        let s = add::strategy(&request(&attrs, &shapes, &types, &gpu)).unwrap();

        let lowered: Vec<String> = s
            .impls()
            .iter()
            .map(|imp| {
                let mut b = TeBuilder::new();
                let x = b.placeholder("x", Shape::from([2048]), ElementType::Float32).unwrap();
                let y = b.placeholder("y", Shape::from([2048]), ElementType::Float32).unwrap();
                let out = (imp.compute)(&mut b, &[x, y]).unwrap();
                let mut stages = out.stages.clone();
                (imp.schedule)(&mut stages, &out.outputs).unwrap();
                crate::ir::to_text(&crate::lower::lower_stages(&stages))
            })
            .collect();
        assert_eq!(lowered.len(), 2);
        assert_eq!(lowered[0], lowered[1]);
        assert!(lowered[0].contains("@gpu.block"), "{}", lowered[0]);
    }
}
