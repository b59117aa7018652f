// diag.rs — Unified diagnostics model
//
// Shared diagnostic types used by every compilation pass. A diagnostic
// carries a stable code, an error class separating operator bugs from
// user-input mistakes, and the operator/node it concerns.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0100`, `I0001`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Configuration (registry wiring, startup).
    pub const E0001: DiagCode = DiagCode("E0001"); // duplicate operator registration
    pub const E0002: DiagCode = DiagCode("E0002"); // operator definition missing a field
    pub const E0003: DiagCode = DiagCode("E0003"); // unknown operator
    pub const E0004: DiagCode = DiagCode("E0004"); // strategy has no implementations

    // Construction: attributes and inference.
    pub const E0100: DiagCode = DiagCode("E0100"); // missing required attribute
    pub const E0101: DiagCode = DiagCode("E0101"); // invalid attribute value
    pub const E0102: DiagCode = DiagCode("E0102"); // unsupported dtype
    pub const E0103: DiagCode = DiagCode("E0103"); // attribute kind mismatch
    pub const E0104: DiagCode = DiagCode("E0104"); // input arity mismatch
    pub const E0105: DiagCode = DiagCode("E0105"); // input shape mismatch
    pub const E0106: DiagCode = DiagCode("E0106"); // input dtype mismatch

    // Construction: strategy, compute and schedule.
    pub const E0200: DiagCode = DiagCode("E0200"); // no implementation for target
    pub const E0201: DiagCode = DiagCode("E0201"); // tensor-expression construction
    pub const E0202: DiagCode = DiagCode("E0202"); // schedule primitive rejected

    // Construction: lowering.
    pub const E0300: DiagCode = DiagCode("E0300"); // zero-output signature
    pub const E0301: DiagCode = DiagCode("E0301"); // body is not exactly one expression
    pub const E0302: DiagCode = DiagCode("E0302"); // duplicate preparation
    pub const E0303: DiagCode = DiagCode("E0303"); // malformed runtime call
    pub const E0304: DiagCode = DiagCode("E0304"); // input could not be loaded

    // Internal consistency.
    pub const I0001: DiagCode = DiagCode("I0001"); // inferred output count mismatch
    pub const I0002: DiagCode = DiagCode("I0002"); // output type undefined at allocation
    pub const I0003: DiagCode = DiagCode("I0003"); // buffer id not in arena
    pub const I0004: DiagCode = DiagCode("I0004"); // compute produced no stage for output
    pub const I0005: DiagCode = DiagCode("I0005"); // compute output disagrees with inference
    pub const I0006: DiagCode = DiagCode("I0006"); // pass ran without a prerequisite artifact
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Error class ──────────────────────────────────────────────────────────

/// Which party is at fault for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Registry wiring; fatal at startup.
    Configuration,
    /// Bad attributes, shapes or signatures in one compilation request.
    Construction,
    /// A bug in an operator's own inference or strategy.
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Configuration => write!(f, "configuration"),
            ErrorClass::Construction => write!(f, "construction"),
            ErrorClass::Internal => write!(f, "internal"),
        }
    }
}

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain explaining a propagated failure.
#[derive(Debug, Clone)]
pub struct CauseRecord {
    pub message: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any pass.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub class: ErrorClass,
    /// Operator the diagnostic concerns, if known.
    pub op: Option<String>,
    /// Model-graph node the diagnostic concerns, if known.
    pub node: Option<String>,
    pub message: String,
    pub hint: Option<String>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, context, hint, or causes.
    pub fn new(level: DiagLevel, class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            class,
            op: None,
            node: None,
            message: message.into(),
            hint: None,
            cause_chain: Vec::new(),
        }
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match (self.level, self.class) {
            (DiagLevel::Error, ErrorClass::Internal) => "internal error",
            (DiagLevel::Error, _) => "error",
            (DiagLevel::Warning, _) => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: ", level, code)?;
        } else {
            write!(f, "{}: ", level)?;
        }
        match (&self.node, &self.op) {
            (Some(node), Some(op)) => write!(f, "{} ({}): ", node, op)?,
            (None, Some(op)) => write!(f, "{}: ", op)?,
            (Some(node), None) => write!(f, "{}: ", node)?,
            (None, None) => {}
        }
        write!(f, "{}", self.message)?;
        for cause in &self.cause_chain {
            write!(f, "\n  caused by: {}", cause.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
