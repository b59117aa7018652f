// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the per-node compilation passes, their dependency edges, and the
// artifacts they produce. Used by the pipeline runner to compute minimal
// pass subsets for each --emit target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    InferShape,
    InferDtype,
    BuildStrategy,
    Compute,
    Schedule,
    Lower,
    BindBuffers,
}

/// Machine-readable artifact identifiers. Each maps to a field of
/// `NodeArtifacts` in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    OutShapes, // Vec<Shape>
    OutTypes,  // Vec<ElementType>
    Strategy,  // OpStrategy
    Computed,  // ComputeOutput + TeBuilder
    Scheduled, // StageMap
    Func,      // LoweredFunc
    Casts,     // LoweredFunc buffer casts
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics and timing logs.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::InferShape => PassDescriptor {
            name: "infer_shape",
            inputs: &[],
            outputs: &[ArtifactId::OutShapes],
            invariants: "one shape per declared output",
        },
        PassId::InferDtype => PassDescriptor {
            name: "infer_dtype",
            inputs: &[PassId::InferShape],
            outputs: &[ArtifactId::OutTypes],
            invariants: "one dtype per declared output",
        },
        PassId::BuildStrategy => PassDescriptor {
            name: "build_strategy",
            inputs: &[PassId::InferDtype],
            outputs: &[ArtifactId::Strategy],
            invariants: "strategy has at least one implementation",
        },
        PassId::Compute => PassDescriptor {
            name: "compute",
            inputs: &[PassId::BuildStrategy],
            outputs: &[ArtifactId::Computed],
            invariants: "implementation selected for target, every output has a stage",
        },
        PassId::Schedule => PassDescriptor {
            name: "schedule",
            inputs: &[PassId::Compute],
            outputs: &[ArtifactId::Scheduled],
            invariants: "loop nests cover every output element once",
        },
        PassId::Lower => PassDescriptor {
            name: "lower",
            inputs: &[PassId::Schedule],
            outputs: &[ArtifactId::Func],
            invariants: "at least one output argument, outputs allocated",
        },
        PassId::BindBuffers => PassDescriptor {
            name: "bind_buffers",
            inputs: &[PassId::Lower],
            outputs: &[ArtifactId::Casts],
            invariants: "one cast per distinct referenced buffer",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order.
pub const ALL_PASSES: [PassId; 7] = [
    PassId::InferShape,
    PassId::InferDtype,
    PassId::BuildStrategy,
    PassId::Compute,
    PassId::Schedule,
    PassId::Lower,
    PassId::BindBuffers,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_need_only_inference() {
        assert_eq!(
            required_passes(PassId::InferDtype),
            vec![PassId::InferShape, PassId::InferDtype]
        );
    }

    #[test]
    fn bind_buffers_includes_all() {
        assert_eq!(required_passes(PassId::BindBuffers), ALL_PASSES.to_vec());
    }

    #[test]
    fn strategy_stops_before_compute() {
        let passes = required_passes(PassId::BuildStrategy);
        assert!(!passes.contains(&PassId::Compute));
        assert_eq!(passes.last(), Some(&PassId::BuildStrategy));
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let order = required_passes(*pass);
            for dep in descriptor(*pass).inputs {
                let dep_pos = order.iter().position(|p| p == dep);
                let self_pos = order.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
