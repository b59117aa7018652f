// schedule.rs — Stages and loop-nest scheduling
//
// A `Stage` records how one compute tensor is iterated: an ordered list of
// loop levels (outermost first) plus, for every original tensor axis, the
// index expression that recovers it from the loop variables. Primitives
// rewrite the loop list and the axis expressions together, so lowering a
// stage always visits every element exactly once.
//
// Preconditions: stages are created from a `TeBuilder` after compute.
// Postconditions: `Stage::lower` yields a loop nest storing the compute body.
// Failure modes: out-of-range levels, indivisible splits, fused extents past
//   `u32::MAX`, re-scheduling a loop that already carries an annotation,
//   missing stages.
// Side effects: none.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::diag::{codes, DiagCode, ErrorClass};
use crate::ir::{Expr, ForKind, TensorRef, Var};
use crate::target::Target;
use crate::te::{TeBuilder, TensorOp};

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("stage '{tensor}' has {depth} loops, level {level} is out of range")]
    LevelOutOfRange {
        tensor: String,
        level: usize,
        depth: usize,
    },
    #[error("stage '{tensor}': loop '{var}' of extent {extent} cannot be split by {factor}")]
    IndivisibleSplit {
        tensor: String,
        var: String,
        extent: u32,
        factor: u32,
    },
    #[error("stage '{tensor}': loop '{var}' is already annotated")]
    AlreadyAnnotated { tensor: String, var: String },
    #[error("stage '{tensor}': fusing {elements} elements overflows a 32-bit loop extent")]
    ExtentOverflow { tensor: String, elements: u64 },
    #[error("no stage for tensor '{tensor}'")]
    MissingStage { tensor: String },
}

impl ScheduleError {
    pub fn code(&self) -> DiagCode {
        match self {
            ScheduleError::MissingStage { .. } => codes::I0004,
            _ => codes::E0202,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ScheduleError::MissingStage { .. } => ErrorClass::Internal,
            _ => ErrorClass::Construction,
        }
    }
}

// ── Stages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct LoopLevel {
    pub var: Var,
    pub extent: u32,
    pub kind: ForKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub tensor: TensorRef,
    /// Outermost first.
    pub loops: Vec<LoopLevel>,
    /// Original axis `k` as a function of the loop variables.
    pub axis_exprs: Vec<Expr>,
    axes: Vec<Var>,
    body: Expr,
}

impl Stage {
    fn new(tensor: TensorRef, axes: Vec<Var>, body: Expr) -> Self {
        let loops = axes
            .iter()
            .zip(tensor.shape.dims())
            .map(|(var, &extent)| LoopLevel {
                var: var.clone(),
                extent,
                kind: ForKind::Serial,
            })
            .collect();
        let axis_exprs = axes.iter().map(Expr::var).collect();
        Stage {
            tensor,
            loops,
            axis_exprs,
            axes,
            body,
        }
    }

    pub fn depth(&self) -> usize {
        self.loops.len()
    }

    fn level(&self, level: usize) -> Result<&LoopLevel, ScheduleError> {
        self.loops
            .get(level)
            .ok_or_else(|| ScheduleError::LevelOutOfRange {
                tensor: self.tensor.name.clone(),
                level,
                depth: self.loops.len(),
            })
    }

    fn ensure_serial(&self, lv: &LoopLevel) -> Result<(), ScheduleError> {
        if lv.kind != ForKind::Serial {
            return Err(ScheduleError::AlreadyAnnotated {
                tensor: self.tensor.name.clone(),
                var: lv.var.name.clone(),
            });
        }
        Ok(())
    }

    fn rewrite_axes(&mut self, map: &HashMap<String, Expr>) {
        self.axis_exprs = self.axis_exprs.iter().map(|e| e.substitute(map)).collect();
    }

    /// Collapse all loops into one loop `fused`. No-op for depth <= 1.
    /// The fused extent must fit in `u32`.
    pub fn fuse(&mut self) -> Result<(), ScheduleError> {
        if self.loops.len() <= 1 {
            return Ok(());
        }
        for lv in &self.loops {
            self.ensure_serial(lv)?;
        }
        let overflow = || ScheduleError::ExtentOverflow {
            tensor: self.tensor.name.clone(),
            elements: self.loops.iter().map(|lv| lv.extent as u64).product(),
        };

        let fused = Var::index("fused");
        let mut map = HashMap::new();
        let mut stride: u32 = 1;
        for (k, lv) in self.loops.iter().enumerate().rev() {
            let mut e = Expr::var(&fused);
            if stride != 1 {
                e = e / Expr::int(stride as i64);
            }
            if k != 0 {
                e = e % Expr::int(lv.extent as i64);
            }
            map.insert(lv.var.name.clone(), e);
            stride = stride.checked_mul(lv.extent).ok_or_else(overflow)?;
        }

        self.rewrite_axes(&map);
        self.loops = vec![LoopLevel {
            var: fused,
            extent: stride,
            kind: ForKind::Serial,
        }];
        Ok(())
    }

    /// Split loop `level` into `<v>_outer` x `<v>_inner` with inner extent
    /// `factor`. The extent must be divisible by `factor`.
    pub fn split(&mut self, level: usize, factor: u32) -> Result<(), ScheduleError> {
        let lv = self.level(level)?.clone();
        self.ensure_serial(&lv)?;
        if factor == 0 || lv.extent % factor != 0 {
            return Err(ScheduleError::IndivisibleSplit {
                tensor: self.tensor.name.clone(),
                var: lv.var.name,
                extent: lv.extent,
                factor,
            });
        }

        let outer = Var::index(format!("{}_outer", lv.var.name));
        let inner = Var::index(format!("{}_inner", lv.var.name));
        let mut map = HashMap::new();
        map.insert(
            lv.var.name.clone(),
            Expr::var(&outer) * Expr::int(factor as i64) + Expr::var(&inner),
        );
        self.rewrite_axes(&map);
        self.loops.splice(
            level..=level,
            [
                LoopLevel {
                    var: outer,
                    extent: lv.extent / factor,
                    kind: ForKind::Serial,
                },
                LoopLevel {
                    var: inner,
                    extent: factor,
                    kind: ForKind::Serial,
                },
            ],
        );
        Ok(())
    }

    /// Vectorize the innermost loop by `lanes`, splitting it first when it is
    /// a larger multiple of `lanes`. Leaves the stage unchanged when the
    /// extent does not divide evenly.
    pub fn vectorize(&mut self, lanes: u32) -> Result<(), ScheduleError> {
        let Some(last) = self.loops.len().checked_sub(1) else {
            return Ok(());
        };
        let extent = self.loops[last].extent;
        if lanes <= 1 || extent < lanes || extent % lanes != 0 {
            return Ok(());
        }
        let mut level = last;
        if extent > lanes {
            self.split(last, lanes)?;
            level = last + 1;
        }
        self.annotate(level, ForKind::Vectorized(lanes))
    }

    pub fn parallel(&mut self, level: usize) -> Result<(), ScheduleError> {
        self.annotate(level, ForKind::Parallel)
    }

    /// Bind loop `level` to a GPU block or thread index.
    pub fn bind(&mut self, level: usize, kind: ForKind) -> Result<(), ScheduleError> {
        self.annotate(level, kind)
    }

    fn annotate(&mut self, level: usize, kind: ForKind) -> Result<(), ScheduleError> {
        let lv = self.level(level)?.clone();
        self.ensure_serial(&lv)?;
        self.loops[level].kind = kind;
        Ok(())
    }

    /// The loop nest computing this stage's tensor.
    pub fn lower(&self) -> Expr {
        let map: HashMap<String, Expr> = self
            .axes
            .iter()
            .zip(&self.axis_exprs)
            .map(|(axis, e)| (axis.name.clone(), e.clone()))
            .collect();
        let mut stmt = Expr::Store {
            tensor: self.tensor.clone(),
            indices: self.axis_exprs.clone(),
            value: Box::new(self.body.substitute(&map)),
        };
        for lv in self.loops.iter().rev() {
            stmt = Expr::For {
                var: lv.var.clone(),
                extent: lv.extent,
                kind: lv.kind,
                body: Box::new(stmt),
            };
        }
        stmt
    }
}

/// Stages keyed by tensor name, producers before consumers.
#[derive(Debug, Clone, Default)]
pub struct StageMap {
    stages: IndexMap<String, Stage>,
}

impl StageMap {
    pub fn get(&self, tensor: &str) -> Option<&Stage> {
        self.stages.get(tensor)
    }

    pub fn get_mut(&mut self, tensor: &str) -> Result<&mut Stage, ScheduleError> {
        self.stages
            .get_mut(tensor)
            .ok_or_else(|| ScheduleError::MissingStage {
                tensor: tensor.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.stages.values()
    }
}

/// One stage per compute tensor in `builder`, in definition order. Every
/// entry of `outputs` must be a compute tensor.
pub fn create_stages(builder: &TeBuilder, outputs: &[TensorRef]) -> Result<StageMap, ScheduleError> {
    let mut stages = IndexMap::new();
    for def in builder.tensors() {
        if let TensorOp::Compute { axes, body } = &def.op {
            stages.insert(
                def.tensor.name.clone(),
                Stage::new(def.tensor.clone(), axes.clone(), body.clone()),
            );
        }
    }
    for out in outputs {
        if !stages.contains_key(&out.name) {
            return Err(ScheduleError::MissingStage {
                tensor: out.name.clone(),
            });
        }
    }
    Ok(StageMap { stages })
}

// ── Schedule functions ──────────────────────────────────────────────────────

/// Applies scheduling decisions to the stages of a strategy's outputs.
pub type ScheduleFn =
    Arc<dyn Fn(&mut StageMap, &[TensorRef]) -> Result<(), ScheduleError> + Send + Sync>;

/// Schedule for shape-preserving operators. CPU: fuse, then vectorize by the
/// target's lanes for the output dtype. GPU: fuse, split by the largest
/// factor of the extent that fits a block, bind block and thread.
pub fn injective_schedule(target: &Target) -> ScheduleFn {
    let target = target.clone();
    Arc::new(
        move |stages: &mut StageMap, outputs: &[TensorRef]| -> Result<(), ScheduleError> {
            for out in outputs {
                let stage = stages.get_mut(&out.name)?;
                stage.fuse()?;
                if stage.depth() == 0 {
                    continue;
                }
                if target.is_gpu() {
                    let extent = stage.loops[0].extent;
                    let factor = gcd(extent, target.max_threads_per_block).max(1);
                    stage.split(0, factor)?;
                    stage.bind(0, ForKind::GpuBlock)?;
                    stage.bind(1, ForKind::GpuThread)?;
                } else {
                    stage.vectorize(target.vector_lanes(out.dtype))?;
                }
            }
            Ok(())
        }
    )
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
