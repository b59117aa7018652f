//! Expression IR shared by the tensor-expression builder, the schedules and
//! function lowering.
//!
//! Buffers live in a [`BufferArena`] keyed by name; tensor references hold a
//! [`BufferId`] into that arena rather than an owning copy, so two
//! references to the same storage can never describe it differently.
//!
//! The printer (`Display`) is deterministic and is what snapshot tests lock.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::ops;

use indexmap::IndexMap;

use crate::id::BufferId;
use crate::types::{ElementType, Shape};

// ── Types and variables ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Scalar(ElementType),
    /// Typed pointer to buffer data.
    Ptr(ElementType),
    /// Opaque runtime handle (buffer descriptor, stream, packed args).
    Handle,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Scalar(t) => write!(f, "{t}"),
            Type::Ptr(t) => write!(f, "{t}*"),
            Type::Handle => write!(f, "handle"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub name: String,
    pub ty: Type,
}

impl Var {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Var {
            name: name.into(),
            ty,
        }
    }

    /// A loop/index variable.
    pub fn index(name: impl Into<String>) -> Self {
        Var::new(name, Type::Scalar(ElementType::Int32))
    }
}

// ── Buffers ────────────────────────────────────────────────────────────────

/// Named storage backing one tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub name: String,
    /// Tensor the buffer was bound for; the name its data alias takes.
    pub tensor: String,
    pub dtype: ElementType,
    pub shape: Shape,
}

impl Buffer {
    pub fn size_bytes(&self) -> u64 {
        self.shape.num_elements() * self.dtype.bytes() as u64
    }
}

/// Buffer records indexed by name. Interning the same name twice yields the
/// same id; the first record wins.
#[derive(Debug, Clone, Default)]
pub struct BufferArena {
    buffers: IndexMap<String, Buffer>,
}

impl BufferArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, buffer: Buffer) -> BufferId {
        if let Some(index) = self.buffers.get_index_of(&buffer.name) {
            return BufferId(index as u32);
        }
        let (index, _) = self.buffers.insert_full(buffer.name.clone(), buffer);
        BufferId(index as u32)
    }

    pub fn get(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get_index(id.0 as usize).map(|(_, b)| b)
    }

    pub fn lookup(&self, name: &str) -> Option<BufferId> {
        self.buffers.get_index_of(name).map(|i| BufferId(i as u32))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BufferId, &Buffer)> {
        self.buffers
            .values()
            .enumerate()
            .map(|(i, b)| (BufferId(i as u32), b))
    }
}

// ── Tensor references ──────────────────────────────────────────────────────

/// A symbolic tensor as seen from an expression. `buffer` is `None` for a
/// tensor that was never materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorRef {
    pub name: String,
    pub shape: Shape,
    pub dtype: ElementType,
    pub buffer: Option<BufferId>,
}

impl TensorRef {
    pub fn is_materialized(&self) -> bool {
        self.buffer.is_some()
    }
}

// ── Expressions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForKind {
    Serial,
    Parallel,
    Vectorized(u32),
    GpuBlock,
    GpuThread,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntImm {
        value: i64,
        ty: ElementType,
    },
    FloatImm {
        value: f64,
        ty: ElementType,
    },
    Var(Var),
    Tensor(TensorRef),
    Load {
        tensor: TensorRef,
        indices: Vec<Expr>,
    },
    Store {
        tensor: TensorRef,
        indices: Vec<Expr>,
        value: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        ret: Type,
    },
    /// Binds `var` to `value` for the remainder of the enclosing block.
    Let {
        var: Var,
        value: Box<Expr>,
    },
    For {
        var: Var,
        extent: u32,
        kind: ForKind,
        body: Box<Expr>,
    },
    Block(Vec<Expr>),
}

impl Expr {
    /// An `int32` immediate, the type used for indices and extents.
    pub fn int(value: i64) -> Expr {
        Expr::IntImm {
            value,
            ty: ElementType::Int32,
        }
    }

    pub fn bool(value: bool) -> Expr {
        Expr::IntImm {
            value: value as i64,
            ty: ElementType::Bool,
        }
    }

    pub fn var(var: &Var) -> Expr {
        Expr::Var(var.clone())
    }

    pub fn load(tensor: &TensorRef, indices: Vec<Expr>) -> Expr {
        Expr::Load {
            tensor: tensor.clone(),
            indices,
        }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Expr::IntImm { ty, .. } | Expr::FloatImm { ty, .. } => Type::Scalar(*ty),
            Expr::Var(v) => v.ty,
            Expr::Tensor(t) => Type::Ptr(t.dtype),
            Expr::Load { tensor, .. } => Type::Scalar(tensor.dtype),
            Expr::Binary { lhs, .. } => lhs.ty(),
            Expr::Call { ret, .. } => *ret,
            Expr::Store { .. } | Expr::Let { .. } | Expr::For { .. } | Expr::Block(_) => Type::Void,
        }
    }

    /// The tensor this node reads, writes or names, if any.
    pub fn tensor_ref(&self) -> Option<&TensorRef> {
        match self {
            Expr::Tensor(t) | Expr::Load { tensor: t, .. } | Expr::Store { tensor: t, .. } => {
                Some(t)
            }
            _ => None,
        }
    }

    /// Pre-order traversal.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::IntImm { .. } | Expr::FloatImm { .. } | Expr::Var(_) | Expr::Tensor(_) => {}
            Expr::Load { indices, .. } => {
                for e in indices {
                    e.walk(f);
                }
            }
            Expr::Store { indices, value, .. } => {
                for e in indices {
                    e.walk(f);
                }
                value.walk(f);
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Expr::Call { args, .. } => {
                for e in args {
                    e.walk(f);
                }
            }
            Expr::Let { value, .. } => value.walk(f),
            Expr::For { body, .. } => body.walk(f),
            Expr::Block(stmts) => {
                for e in stmts {
                    e.walk(f);
                }
            }
        }
    }

    /// All nodes satisfying `pred`, in pre-order.
    pub fn collect_nodes(&self, pred: impl Fn(&Expr) -> bool) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if pred(e) {
                out.push(e);
            }
        });
        out
    }

    /// Replace every `Var` whose name is a key of `map`, simultaneously.
    pub fn substitute(&self, map: &HashMap<String, Expr>) -> Expr {
        let sub_all = |v: &[Expr]| v.iter().map(|e| e.substitute(map)).collect::<Vec<_>>();
        match self {
            Expr::Var(v) => map.get(&v.name).cloned().unwrap_or_else(|| self.clone()),
            Expr::IntImm { .. } | Expr::FloatImm { .. } | Expr::Tensor(_) => self.clone(),
            Expr::Load { tensor, indices } => Expr::Load {
                tensor: tensor.clone(),
                indices: sub_all(indices),
            },
            Expr::Store {
                tensor,
                indices,
                value,
            } => Expr::Store {
                tensor: tensor.clone(),
                indices: sub_all(indices),
                value: Box::new(value.substitute(map)),
            },
            Expr::Binary { op, lhs, rhs } => {
                Expr::binary(*op, lhs.substitute(map), rhs.substitute(map))
            }
            Expr::Call { name, args, ret } => Expr::Call {
                name: name.clone(),
                args: sub_all(args),
                ret: *ret,
            },
            Expr::Let { var, value } => Expr::Let {
                var: var.clone(),
                value: Box::new(value.substitute(map)),
            },
            Expr::For {
                var,
                extent,
                kind,
                body,
            } => Expr::For {
                var: var.clone(),
                extent: *extent,
                kind: *kind,
                body: Box::new(body.substitute(map)),
            },
            Expr::Block(stmts) => Expr::Block(sub_all(stmts)),
        }
    }

    /// Print as a statement at `indent` levels (two spaces each).
    pub fn write_stmt(&self, out: &mut impl fmt::Write, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            Expr::Block(stmts) => {
                for (i, s) in stmts.iter().enumerate() {
                    if i > 0 {
                        out.write_char('\n')?;
                    }
                    s.write_stmt(out, indent)?;
                }
                Ok(())
            }
            Expr::For {
                var,
                extent,
                kind,
                body,
            } => {
                write!(out, "{pad}for {} in 0..{extent}", var.name)?;
                match kind {
                    ForKind::Serial => {}
                    ForKind::Parallel => write!(out, " @parallel")?,
                    ForKind::Vectorized(lanes) => write!(out, " @vectorize({lanes})")?,
                    ForKind::GpuBlock => write!(out, " @gpu.block")?,
                    ForKind::GpuThread => write!(out, " @gpu.thread")?,
                }
                writeln!(out, " {{")?;
                body.write_stmt(out, indent + 1)?;
                write!(out, "\n{pad}}}")
            }
            Expr::Store {
                tensor,
                indices,
                value,
            } => {
                write!(out, "{pad}{}[", tensor.name)?;
                write_list(out, indices)?;
                write!(out, "] = {value}")
            }
            Expr::Let { var, value } => {
                write!(out, "{pad}let {}: {} = {value}", var.name, var.ty)
            }
            _ => write!(out, "{pad}{self}"),
        }
    }
}

fn write_list(out: &mut impl fmt::Write, items: &[Expr]) -> fmt::Result {
    for (i, e) in items.iter().enumerate() {
        if i > 0 {
            out.write_str(", ")?;
        }
        write!(out, "{e}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntImm { value, ty } if ty.is_bool() => write!(f, "{}", *value != 0),
            Expr::IntImm { value, .. } => write!(f, "{value}"),
            Expr::FloatImm { value, .. } => write!(f, "{value:?}"),
            Expr::Var(v) => f.write_str(&v.name),
            Expr::Tensor(t) => f.write_str(&t.name),
            Expr::Load { tensor, indices } => {
                write!(f, "{}[", tensor.name)?;
                write_list(f, indices)?;
                write!(f, "]")
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Expr::Call { name, args, .. } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Store { .. } | Expr::Let { .. } | Expr::For { .. } | Expr::Block(_) => {
                self.write_stmt(f, 0)
            }
        }
    }
}

impl ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Add, self, rhs)
    }
}

impl ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Sub, self, rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Mul, self, rhs)
    }
}

impl ops::Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Div, self, rhs)
    }
}

impl ops::Rem for Expr {
    type Output = Expr;

    fn rem(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Mod, self, rhs)
    }
}

/// Render an expression as statements, for tests and `--emit` output.
pub fn to_text(expr: &Expr) -> String {
    let mut s = String::new();
    // Writing into a String cannot fail.
    let _ = expr.write_stmt(&mut s, 0);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(name: &str, tensor: &str) -> Buffer {
        Buffer {
            name: name.to_string(),
            tensor: tensor.to_string(),
            dtype: ElementType::Float32,
            shape: Shape::from([2, 3]),
        }
    }

    #[test]
    fn arena_dedups_by_name() {
        let mut arena = BufferArena::new();
        let a = arena.intern(buffer("_a", "a"));
        let b = arena.intern(buffer("_b", "b"));
        let a2 = arena.intern(buffer("_a", "a_alias"));
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a).unwrap().tensor, "a");
        assert_eq!(arena.lookup("_b"), Some(b));
        assert_eq!(arena.get(a).unwrap().size_bytes(), 24);
    }

    #[test]
    fn substitute_is_simultaneous() {
        let i = Var::index("i");
        let j = Var::index("j");
        let e = Expr::var(&i) * Expr::int(4) + Expr::var(&j);
        let mut map = HashMap::new();
        map.insert("i".to_string(), Expr::var(&j));
        map.insert("j".to_string(), Expr::var(&i));
        assert_eq!(e.substitute(&map).to_string(), "((j * 4) + i)");
    }

    #[test]
    fn collect_nodes_pre_order() {
        let t = TensorRef {
            name: "t".into(),
            shape: Shape::from([4]),
            dtype: ElementType::Float32,
            buffer: None,
        };
        let i = Var::index("i");
        let body = Expr::For {
            var: i.clone(),
            extent: 4,
            kind: ForKind::Serial,
            body: Box::new(Expr::Store {
                tensor: t.clone(),
                indices: vec![Expr::var(&i)],
                value: Box::new(Expr::load(&t, vec![Expr::var(&i)])),
            }),
        };
        let tensors = body.collect_nodes(|e| e.tensor_ref().is_some());
        assert_eq!(tensors.len(), 2);
        assert!(matches!(tensors[0], Expr::Store { .. }));
        assert!(matches!(tensors[1], Expr::Load { .. }));
    }

    #[test]
    fn printer() {
        let t = TensorRef {
            name: "out".into(),
            shape: Shape::from([8]),
            dtype: ElementType::Int64,
            buffer: None,
        };
        let i = Var::index("i");
        let body = Expr::For {
            var: i.clone(),
            extent: 8,
            kind: ForKind::Vectorized(4),
            body: Box::new(Expr::Store {
                tensor: t,
                indices: vec![Expr::var(&i)],
                value: Box::new(Expr::int(0)),
            }),
        };
        assert_eq!(
            to_text(&body),
            "for i in 0..8 @vectorize(4) {\n  out[i] = 0\n}"
        );
    }

    #[test]
    fn types() {
        assert_eq!(Type::Ptr(ElementType::Int64).to_string(), "int64*");
        assert_eq!(Expr::bool(true).ty(), Type::Scalar(ElementType::Bool));
        assert_eq!(Expr::bool(false).to_string(), "false");
    }
}
