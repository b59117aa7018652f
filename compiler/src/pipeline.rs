// pipeline.rs — Compilation state and pass orchestration
//
// Holds the artifacts of one node's compilation and runs the minimal set of
// passes for a given terminal PassId. Nodes of a model graph compile
// independently; a failing node does not stop the others.
//
// Preconditions: the registry is frozen; the node names a registered operator.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass returning a `CompileError`, reported as a diagnostic.
// Side effects: calls on_pass_complete after each pass; logs timing via tracing.

use std::time::{Duration, Instant};

use crate::diag::{DiagLevel, Diagnostic};
use crate::error::CompileError;
use crate::graph::{GraphNode, ModelGraph};
use crate::ir::TensorRef;
use crate::lower::lower_function;
use crate::lowered_func::{LoweredFunc, NoTempBuffers, ScratchTempBuffers, TempBufferPolicy};
use crate::pass::{descriptor, required_passes, ArtifactId, PassId};
use crate::registry::{OpRegistry, StrategyRequest};
use crate::schedule::StageMap;
use crate::strategy::{ComputeOutput, OpImpl, OpStrategy};
use crate::target::Target;
use crate::te::TeBuilder;
use crate::types::{ElementType, Shape};

// ── Options ────────────────────────────────────────────────────────────────

/// Which temporary-buffer policy lowering applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TempAlloc {
    #[default]
    None,
    Scratch,
}

impl TempAlloc {
    pub fn policy(self) -> &'static dyn TempBufferPolicy {
        match self {
            TempAlloc::None => &NoTempBuffers,
            TempAlloc::Scratch => &ScratchTempBuffers,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub target: Target,
    pub temps: TempAlloc,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            target: Target::x86(),
            temps: TempAlloc::None,
        }
    }
}

// ── Artifact storage ───────────────────────────────────────────────────────

/// Per-node pass outputs. Each field maps to an `ArtifactId`.
#[derive(Debug, Default)]
pub struct NodeArtifacts {
    pub out_shapes: Option<Vec<Shape>>,
    pub out_types: Option<Vec<ElementType>>,
    pub strategy: Option<OpStrategy>,
    pub selected: Option<OpImpl>,
    /// Placeholders for the node's declared inputs, bound to buffers.
    pub inputs: Vec<TensorRef>,
    pub builder: Option<TeBuilder>,
    pub computed: Option<ComputeOutput>,
    pub scheduled: Option<StageMap>,
    pub func: Option<LoweredFunc>,
}

fn need<T>(artifact: Option<T>, id: ArtifactId) -> Result<T, CompileError> {
    artifact.ok_or(CompileError::MissingArtifact(id))
}

/// Provenance metadata for reproducible builds and cache keys.
///
/// `source_hash`: SHA-256 of the raw model text (or the single-op request).
/// `registry_fingerprint`: SHA-256 of `OpRegistry::canonical_json()`.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub registry_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    pub fn registry_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.registry_fingerprint)
    }

    /// JSON for `--emit build-info`.
    pub fn to_json(&self) -> String {
        let value = serde_json::json!({
            "source_hash": self.source_hash_hex(),
            "registry_fingerprint": self.registry_fingerprint_hex(),
            "compiler_version": self.compiler_version,
        });
        let mut text = serde_json::to_string_pretty(&value).unwrap_or_default();
        text.push('\n');
        text
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(64);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

pub fn compute_provenance(source: &str, registry: &OpRegistry) -> Provenance {
    Provenance {
        source_hash: sha256(source.as_bytes()),
        registry_fingerprint: sha256(registry.canonical_json().as_bytes()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

/// One node's artifacts and accumulated diagnostics.
pub struct CompilationState<'r> {
    pub registry: &'r OpRegistry,
    pub node: GraphNode,
    pub artifacts: NodeArtifacts,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl<'r> CompilationState<'r> {
    pub fn new(registry: &'r OpRegistry, node: GraphNode) -> Self {
        Self {
            registry,
            node,
            artifacts: NodeArtifacts::default(),
            diagnostics: Vec::new(),
            has_error: false,
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    pub failing_pass: PassId,
}

fn has_error_diags(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

/// Per-pass post-processing: callback, accumulate, timing, error check.
fn finish_pass(
    state: &mut CompilationState<'_>,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_error_diags(&diags);
    state.diagnostics.extend(diags);
    tracing::debug!(
        pass = descriptor(pass_id).name,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "pass complete"
    );
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

// ── Passes ─────────────────────────────────────────────────────────────────

fn run_pass(
    state: &mut CompilationState<'_>,
    pass_id: PassId,
    options: &CompileOptions,
) -> Result<(), CompileError> {
    let registry = state.registry;
    let def = registry.get(&state.node.op)?;
    let node = &state.node;
    let art = &mut state.artifacts;
    match pass_id {
        PassId::InferShape => {
            let shapes: Vec<Shape> = node.inputs.iter().map(|d| d.shape.clone()).collect();
            art.out_shapes = Some(def.infer_shape(&shapes, &node.attrs)?);
        }
        PassId::InferDtype => {
            let dtypes: Vec<ElementType> = node.inputs.iter().map(|d| d.dtype).collect();
            art.out_types = Some(def.infer_dtype(&dtypes, &node.attrs)?);
        }
        PassId::BuildStrategy => {
            let declared: Vec<TensorRef> = node.inputs.iter().map(|d| d.to_tensor_ref()).collect();
            let req = StrategyRequest {
                attrs: &node.attrs,
                inputs: &declared,
                out_types: need(art.out_types.as_deref(), ArtifactId::OutTypes)?,
                out_shapes: need(art.out_shapes.as_deref(), ArtifactId::OutShapes)?,
                target: &options.target,
            };
            let strategy = def.build_strategy(&req)?;
            tracing::debug!(op = %node.op, impls = strategy.impls().len(), "strategy built");
            art.strategy = Some(strategy);
        }
        PassId::Compute => {
            let strategy = need(art.strategy.as_ref(), ArtifactId::Strategy)?;
            let imp = strategy.select(&options.target)?.clone();
            tracing::debug!(op = %node.op, implementation = %imp.name, target = %options.target, "implementation selected");
            let mut builder = TeBuilder::new();
            let mut inputs = Vec::with_capacity(node.inputs.len());
            for decl in &node.inputs {
                inputs.push(builder.placeholder(&decl.name, decl.shape.clone(), decl.dtype)?);
            }
            let out = (imp.compute)(&mut builder, &inputs)?;
            check_outputs(
                &node.op,
                &out.outputs,
                need(art.out_shapes.as_deref(), ArtifactId::OutShapes)?,
                need(art.out_types.as_deref(), ArtifactId::OutTypes)?,
            )?;
            art.selected = Some(imp);
            art.inputs = inputs;
            art.builder = Some(builder);
            art.computed = Some(out);
        }
        PassId::Schedule => {
            let imp = need(art.selected.as_ref(), ArtifactId::Computed)?;
            let computed = need(art.computed.as_ref(), ArtifactId::Computed)?;
            let mut stages = computed.stages.clone();
            (imp.schedule)(&mut stages, &computed.outputs)?;
            art.scheduled = Some(stages);
        }
        PassId::Lower => {
            let builder = need(art.builder.take(), ArtifactId::Computed)?;
            let computed = need(art.computed.as_ref(), ArtifactId::Computed)?;
            let stages = need(art.scheduled.as_ref(), ArtifactId::Scheduled)?;
            let func = lower_function(
                &node.name,
                stages,
                &art.inputs,
                &computed.outputs,
                builder.into_arena(),
                options.temps.policy(),
            )?;
            art.func = Some(func);
        }
        PassId::BindBuffers => {
            let func = need(art.func.as_mut(), ArtifactId::Func)?;
            func.prepare_buffer_cast_exprs()?;
        }
    }
    Ok(())
}

/// Compute outputs must agree with what inference promised.
fn check_outputs(
    op: &str,
    outputs: &[TensorRef],
    shapes: &[Shape],
    dtypes: &[ElementType],
) -> Result<(), CompileError> {
    if outputs.len() != shapes.len() {
        return Err(CompileError::OutputMismatch {
            op: op.to_string(),
            index: outputs.len().min(shapes.len()),
            expected: format!("{} outputs", shapes.len()),
            found: format!("{} outputs", outputs.len()),
        });
    }
    for (index, ((out, shape), dtype)) in outputs.iter().zip(shapes).zip(dtypes).enumerate() {
        if &out.shape != shape || out.dtype != *dtype {
            return Err(CompileError::OutputMismatch {
                op: op.to_string(),
                index,
                expected: format!("{dtype}{shape}"),
                found: format!("{}{}", out.dtype, out.shape),
            });
        }
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal` for one node.
///
/// Per-pass sequence: execute, convert any error to a diagnostic,
/// on_pass_complete(callback), error check.
pub fn run_pipeline(
    state: &mut CompilationState<'_>,
    terminal: PassId,
    options: &CompileOptions,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    let span = tracing::debug_span!("node", name = %state.node.name, op = %state.node.op);
    let _guard = span.enter();
    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        let result = run_pass(state, pass_id, options);
        let elapsed = t.elapsed();
        let diags = match result {
            Ok(()) => Vec::new(),
            Err(e) => vec![e
                .to_diagnostic()
                .with_op(state.node.op.clone())
                .with_node(state.node.name.clone())],
        };
        finish_pass(state, pass_id, diags, elapsed, &mut on_pass_complete)?;
    }
    Ok(())
}

/// Compile one node through `terminal`. Failures are recorded in the
/// returned state.
pub fn compile_node<'r>(
    registry: &'r OpRegistry,
    node: GraphNode,
    terminal: PassId,
    options: &CompileOptions,
) -> CompilationState<'r> {
    let mut state = CompilationState::new(registry, node);
    let _ = run_pipeline(&mut state, terminal, options, |_, _| {});
    state
}

/// Compile every node of `graph` in document order.
pub fn compile_graph<'r>(
    registry: &'r OpRegistry,
    graph: &ModelGraph,
    terminal: PassId,
    options: &CompileOptions,
    mut on_pass_complete: impl FnMut(&GraphNode, PassId, &[Diagnostic]),
) -> Vec<CompilationState<'r>> {
    graph
        .nodes
        .iter()
        .map(|node| {
            let mut state = CompilationState::new(registry, node.clone());
            let result = run_pipeline(&mut state, terminal, options, |pass, diags| {
                on_pass_complete(node, pass, diags)
            });
            if let Err(e) = result {
                tracing::debug!(node = %node.name, pass = descriptor(e.failing_pass).name, "node failed");
            }
            state
        })
        .collect()
}
