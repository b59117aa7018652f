// Snapshot tests: lock the printed form of lowered functions.
//
// Uses the library API (registry → compile_node through bind_buffers) and
// snapshots the Display output. Snapshots are managed by `insta` and stored
// under `compiler/tests/snapshots/`.
//
// Run `cargo insta review` after intentional output changes to update baselines.

use tlc::attr::AttrMap;
use tlc::graph::GraphNode;
use tlc::pass::PassId;
use tlc::pipeline::{compile_node, CompileOptions};
use tlc::registry::OpRegistry;
use tlc::target::Target;
use tlc::types::{ElementType, Shape};

/// Compile `node` through buffer binding and return the function's text.
fn lowered_snapshot(node: GraphNode, target: Target) -> String {
    let registry = OpRegistry::builtin().expect("builtin registry");
    let options = CompileOptions {
        target,
        ..CompileOptions::default()
    };
    let state = compile_node(&registry, node, PassId::BindBuffers, &options);
    assert!(!state.has_error, "diagnostics: {:?}", state.diagnostics);
    state
        .artifacts
        .func
        .as_ref()
        .expect("lowered function")
        .to_string()
}

#[test]
fn snapshot_randint_x86() {
    let node = GraphNode::new(
        "randint",
        "randint",
        AttrMap::new().with("shape", vec![4i64, 8]),
    );
    let output = lowered_snapshot(node, Target::x86());
    insta::assert_snapshot!("randint_x86", output);
}

#[test]
fn snapshot_elementwise_add_x86() {
    let node = GraphNode::new("sum", "elementwise_add", AttrMap::new())
        .with_input("a", Shape::from([16]), ElementType::Float32)
        .with_input("b", Shape::from([16]), ElementType::Float32);
    let output = lowered_snapshot(node, Target::x86());
    insta::assert_snapshot!("elementwise_add_x86", output);
}
