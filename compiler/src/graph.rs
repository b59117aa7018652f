// graph.rs — Model-graph input
//
// A model is a JSON document listing operator nodes. Each node names its
// operator, carries an attribute map, and declares its input tensors with
// shape and dtype. Nodes are compiled independently; declared inputs are
// materialized as placeholders by the compute pass.
//
// Preconditions: none.
// Postconditions: node names are unique; ids follow document order.
// Failure modes: unreadable file, malformed JSON, duplicate node names.
// Side effects: `load` reads one file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::attr::AttrMap;
use crate::diag::{codes, DiagCode, ErrorClass};
use crate::id::{IdAllocator, NodeId};
use crate::ir::TensorRef;
use crate::types::{ElementType, Shape};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed model: {0}")]
    Json(#[from] serde_json::Error),
    #[error("node '{name}' is defined twice")]
    DuplicateNode { name: String },
}

impl GraphError {
    pub fn code(&self) -> DiagCode {
        codes::E0304
    }

    pub fn class(&self) -> ErrorClass {
        ErrorClass::Construction
    }
}

/// A declared input tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDecl {
    pub name: String,
    pub shape: Shape,
    pub dtype: ElementType,
}

impl TensorDecl {
    /// Unbound tensor reference for strategy requests.
    pub fn to_tensor_ref(&self) -> TensorRef {
        TensorRef {
            name: self.name.clone(),
            shape: self.shape.clone(),
            dtype: self.dtype,
            buffer: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(skip, default = "unassigned")]
    pub id: NodeId,
    pub name: String,
    pub op: String,
    #[serde(default)]
    pub attrs: AttrMap,
    #[serde(default)]
    pub inputs: Vec<TensorDecl>,
}

fn unassigned() -> NodeId {
    NodeId(u32::MAX)
}

impl GraphNode {
    pub fn new(name: impl Into<String>, op: impl Into<String>, attrs: AttrMap) -> Self {
        GraphNode {
            id: unassigned(),
            name: name.into(),
            op: op.into(),
            attrs,
            inputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, shape: Shape, dtype: ElementType) -> Self {
        self.inputs.push(TensorDecl {
            name: name.into(),
            shape,
            dtype,
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelGraph {
    pub nodes: Vec<GraphNode>,
}

impl ModelGraph {
    pub fn from_nodes(nodes: Vec<GraphNode>) -> Result<Self, GraphError> {
        let mut graph = ModelGraph { nodes };
        graph.assign_ids()?;
        Ok(graph)
    }

    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        let graph: ModelGraph = serde_json::from_str(text)?;
        Self::from_nodes(graph.nodes)
    }

    pub fn load(path: &Path) -> Result<(Self, String), GraphError> {
        let text = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let graph = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), nodes = graph.nodes.len(), "model loaded");
        Ok((graph, text))
    }

    fn assign_ids(&mut self) -> Result<(), GraphError> {
        let mut ids = IdAllocator::new();
        let mut seen = HashSet::new();
        for node in &mut self.nodes {
            if !seen.insert(node.name.clone()) {
                return Err(GraphError::DuplicateNode {
                    name: node.name.clone(),
                });
            }
            node.id = ids.alloc_node();
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
