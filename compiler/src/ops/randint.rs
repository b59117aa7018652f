// ops/randint.rs — Random integer generator
//
// No tensor inputs; the output shape comes from the required `shape`
// attribute and the dtype from `dtype` (int32 or int64, default int64).
//
// The compute graph copies a placeholder of the output shape into
// `randint_out`. It fixes the output's shape, dtype and buffer; the values
// written are not a sampling algorithm and callers must not rely on them.

use std::sync::Arc;

use crate::attr::AttrMap;
use crate::infer::{dtype_attr, shape_attr, InferError};
use crate::ir::TensorRef;
use crate::pe;
use crate::registry::{OpDef, OpPatternKind, RegistryBuilder, RegistryError, StrategyRequest};
use crate::schedule::{create_stages, injective_schedule};
use crate::strategy::{ComputeFn, ComputeOutput, OpStrategy, StrategyError, TargetFilter};
use crate::te::TeBuilder;
use crate::types::{ElementType, Shape};

pub const NAME: &str = "randint";
pub const DEFAULT_DTYPE: ElementType = ElementType::Int64;
pub const ALLOWED_DTYPES: &[ElementType] = &[ElementType::Int32, ElementType::Int64];

pub fn infer_shape(_inputs: &[Shape], attrs: &AttrMap) -> Result<Vec<Shape>, InferError> {
    Ok(vec![shape_attr(NAME, attrs, "shape")?])
}

pub fn infer_dtype(_inputs: &[ElementType], attrs: &AttrMap) -> Result<Vec<ElementType>, InferError> {
    Ok(vec![dtype_attr(NAME, attrs, "dtype", DEFAULT_DTYPE, ALLOWED_DTYPES)?])
}

pub fn strategy(req: &StrategyRequest<'_>) -> Result<OpStrategy, StrategyError> {
    let (shape, dtype) = super::single_output(NAME, req)?;
    let out_name = super::out_name(NAME);

    let compute: ComputeFn = Arc::new(
        move |b: &mut TeBuilder, _inputs: &[TensorRef]| -> Result<ComputeOutput, StrategyError> {
            let seed = b.placeholder("randint_shape", shape.clone(), dtype)?;
            let out = pe::identity(b, &seed, &out_name)?;
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
        "strategy.randint",
        1,
    );
    Ok(strategy)
}

pub fn register(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder.register(
        OpDef::builder(NAME)
            .describe("Random integers of a given shape")
            .set_num_inputs(0)
            .set_num_outputs(1)
            .set_infer_shape(infer_shape)
            .set_infer_dtype(infer_dtype)
            .set_strategy(strategy)
            .set_pattern(OpPatternKind::NonFusible)
            .set_support_level(4)
            .build()?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrValue;
    use crate::target::Target;

    #[test]
    fn shape_from_attr() {
        let attrs = AttrMap::new().with("shape", vec![4i64, 8]);
        assert_eq!(infer_shape(&[], &attrs).unwrap(), vec![Shape::from([4, 8])]);
    }

    #[test]
    fn empty_shape_invalid() {
        let attrs = AttrMap::new().with("shape", AttrValue::IntList(vec![]));
        assert!(matches!(
            infer_shape(&[], &attrs),
            Err(InferError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn dtype_defaults_to_int64() {
        assert_eq!(
            infer_dtype(&[], &AttrMap::new()).unwrap(),
            vec![ElementType::Int64]
        );
    }

    #[test]
    fn float_dtype_unsupported() {
        let attrs = AttrMap::new().with("dtype", "float32");
        let err = infer_dtype(&[], &attrs).unwrap_err();
        assert_eq!(
            err,
            InferError::UnsupportedDtype {
                op: NAME.into(),
                value: "float32".into(),
                allowed: "int32, int64".into(),
            }
        );
    }

    #[test]
    fn compute_materializes_output() {
        let attrs = AttrMap::new();
        let req = StrategyRequest {
            attrs: &attrs,
            inputs: &[],
            out_types: &[ElementType::Int32],
            out_shapes: &[Shape::from([3])],
            target: &Target::arm(),
        };
        let strategy = strategy(&req).unwrap();
        let imp = strategy.select(&Target::arm()).unwrap();
        assert_eq!(imp.name, "strategy.randint");

        let mut b = TeBuilder::new();
        let out = (imp.compute)(&mut b, &[]).unwrap();
        assert_eq!(out.outputs.len(), 1);
        assert_eq!(out.outputs[0].name, "randint_out");
        assert_eq!(out.outputs[0].dtype, ElementType::Int32);
        assert!(out.outputs[0].is_materialized());
        assert_eq!(out.stages.len(), 1);
    }

    #[test]
    fn missing_output_metadata_is_internal() {
        let attrs = AttrMap::new();
        let req = StrategyRequest {
            attrs: &attrs,
            inputs: &[],
            out_types: &[],
            out_shapes: &[],
            target: &Target::x86(),
        };
        assert!(matches!(
            strategy(&req),
            Err(StrategyError::OutputMetadata { found: 0, .. })
        ));
    }
}
