use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use tlc::attr::AttrMap;
use tlc::graph::{GraphNode, ModelGraph, TensorDecl};
use tlc::pass::PassId;
use tlc::pipeline::{compile_graph, compute_provenance, CompilationState, CompileOptions, TempAlloc};
use tlc::registry::OpRegistry;
use tlc::target::{Arch, Target};
use tlc::types::{ElementType, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    Shapes,
    Strategy,
    Lowered,
    Registry,
    BuildInfo,
}

impl EmitStage {
    fn terminal(self) -> PassId {
        match self {
            EmitStage::Shapes => PassId::InferDtype,
            EmitStage::Strategy => PassId::BuildStrategy,
            EmitStage::Lowered | EmitStage::Registry | EmitStage::BuildInfo => PassId::BindBuffers,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "tlc",
    version,
    about = "Tensor lowering compiler: infers shapes, selects operator strategies and lowers to functions"
)]
struct Cli {
    /// Model graph (JSON)
    model: Option<PathBuf>,

    /// Compile a single operator instead of a model
    #[arg(long, conflicts_with = "model")]
    op: Option<String>,

    /// Attribute assignment, e.g. 'shape=[4, 8]' (repeatable)
    #[arg(long = "attr")]
    attrs: Vec<String>,

    /// Input tensor for --op as NAME:DTYPE:DIMS, e.g. a:float32:4x8 (repeatable)
    #[arg(long = "input", requires = "op")]
    inputs: Vec<String>,

    /// Compilation target
    #[arg(long, value_enum, default_value_t = Arch::X86)]
    target: Arch,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Lowered)]
    emit: EmitStage,

    /// Allocate scratch buffers for intermediates
    #[arg(long)]
    scratch_temps: bool,

    /// Print compiler passes and timing
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn parse_attrs(assignments: &[String]) -> Result<AttrMap, String> {
    let mut attrs = AttrMap::new();
    for text in assignments {
        let parsed = tlc::parser::parse(text).into_attrs().map_err(|errors| {
            let reasons: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            format!("invalid --attr '{}': {}", text, reasons.join("; "))
        })?;
        attrs.extend(parsed.iter().map(|(k, v)| (k.to_string(), v.clone())));
    }
    Ok(attrs)
}

fn parse_input(text: &str) -> Result<TensorDecl, String> {
    let mut parts = text.splitn(3, ':');
    let (Some(name), Some(dtype), Some(dims)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("invalid --input '{text}': expected NAME:DTYPE:DIMS"));
    };
    let dtype: ElementType = dtype
        .parse()
        .map_err(|e| format!("invalid --input '{text}': {e}"))?;
    let dims = dims
        .split('x')
        .map(|d| d.trim().parse::<u32>())
        .collect::<Result<Vec<u32>, _>>()
        .map_err(|e| format!("invalid --input '{text}': {e}"))?;
    Ok(TensorDecl {
        name: name.to_string(),
        shape: Shape::new(dims),
        dtype,
    })
}

/// The model to compile and the text it was read from.
fn load_model(cli: &Cli, overrides: &AttrMap) -> Result<(ModelGraph, String), String> {
    let (mut graph, source) = match (&cli.model, &cli.op) {
        (Some(path), _) => ModelGraph::load(path).map_err(|e| e.to_string())?,
        (None, Some(op)) => {
            let mut node = GraphNode::new(op.clone(), op.clone(), AttrMap::new());
            for text in &cli.inputs {
                node.inputs.push(parse_input(text)?);
            }
            let graph = ModelGraph::from_nodes(vec![node]).map_err(|e| e.to_string())?;
            let source = serde_json::to_string(&graph).map_err(|e| e.to_string())?;
            (graph, source)
        }
        (None, None) => return Err("no model given (pass a model path or --op)".to_string()),
    };
    for node in &mut graph.nodes {
        node.attrs
            .extend(overrides.iter().map(|(k, v)| (k.to_string(), v.clone())));
    }
    Ok((graph, source))
}

fn print_shapes(state: &CompilationState<'_>) {
    let (Some(shapes), Some(types)) = (&state.artifacts.out_shapes, &state.artifacts.out_types) else {
        return;
    };
    let outs: Vec<String> = shapes
        .iter()
        .zip(types)
        .map(|(shape, dtype)| format!("{dtype}{shape}"))
        .collect();
    println!("{}: {} -> {}", state.node.name, state.node.op, outs.join(", "));
}

fn print_strategy(state: &CompilationState<'_>, target: &Target) {
    let Some(strategy) = &state.artifacts.strategy else {
        return;
    };
    let selected = strategy.select(target).ok().map(|imp| imp.order());
    println!("{}: {}", state.node.name, state.node.op);
    for imp in strategy.impls() {
        let mark = if Some(imp.order()) == selected { '*' } else { ' ' };
        println!(
            "  {} {}  target={}  priority={}",
            mark, imp.name, imp.target, imp.priority
        );
    }
}

fn print_registry(registry: &OpRegistry) {
    let mut ops: Vec<_> = registry.ops().collect();
    ops.sort_by(|a, b| a.name().cmp(b.name()));
    for def in ops {
        println!(
            "{:<18} inputs={} outputs={} pattern={} level={}  {}",
            def.name(),
            def.num_inputs(),
            def.num_outputs(),
            def.pattern(),
            def.support_level(),
            def.description()
        );
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // ── Build operator registry ──
    let registry = match OpRegistry::builtin() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("tlc: error[{}]: {}", e.code(), e);
            return ExitCode::from(2);
        }
    };
    tracing::debug!(ops = registry.len(), "registry ready");

    if cli.emit == EmitStage::Registry {
        print_registry(&registry);
        return ExitCode::SUCCESS;
    }

    let overrides = match parse_attrs(&cli.attrs) {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("tlc: error: {msg}");
            return ExitCode::from(1);
        }
    };
    let (graph, source) = match load_model(&cli, &overrides) {
        Ok(m) => m,
        Err(msg) => {
            eprintln!("tlc: error: {msg}");
            return ExitCode::from(2);
        }
    };

    if cli.emit == EmitStage::BuildInfo {
        print!("{}", compute_provenance(&source, &registry).to_json());
        return ExitCode::SUCCESS;
    }

    let options = CompileOptions {
        target: Target::for_arch(cli.target),
        temps: if cli.scratch_temps {
            TempAlloc::Scratch
        } else {
            TempAlloc::None
        },
    };
    let states = compile_graph(&registry, &graph, cli.emit.terminal(), &options, |_, _, diags| {
        for d in diags {
            eprintln!("tlc: {d}");
        }
    });

    let mut first = true;
    for state in states.iter().filter(|s| !s.has_error) {
        match cli.emit {
            EmitStage::Shapes => print_shapes(state),
            EmitStage::Strategy => print_strategy(state, &options.target),
            EmitStage::Lowered => {
                if let Some(func) = &state.artifacts.func {
                    if !first {
                        println!();
                    }
                    print!("{func}");
                    first = false;
                }
            }
            EmitStage::Registry | EmitStage::BuildInfo => {}
        }
    }

    if states.iter().any(|s| s.has_error) {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
