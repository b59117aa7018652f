// tlc — Tensor lowering compiler
//
// Library root. Operator registry, shape/dtype inference, strategy
// selection, scheduling and function lowering.

pub mod attr;
pub mod diag;
pub mod error;
pub mod graph;
pub mod id;
pub mod infer;
pub mod ir;
pub mod lexer;
pub mod lower;
pub mod lowered_func;
pub mod ops;
pub mod parser;
pub mod pass;
pub mod pe;
pub mod pipeline;
pub mod registry;
pub mod runtime;
pub mod schedule;
pub mod strategy;
pub mod target;
pub mod te;
pub mod types;
