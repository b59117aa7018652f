// error.rs — Compilation error umbrella
//
// Every per-node failure funnels into `CompileError`, which knows its stable
// diagnostic code and error class and converts into a `Diagnostic`.

use crate::attr::AttrError;
use crate::diag::{codes, DiagCode, DiagLevel, Diagnostic, ErrorClass};
use crate::graph::GraphError;
use crate::infer::InferError;
use crate::lowered_func::LowerError;
use crate::pass::ArtifactId;
use crate::registry::RegistryError;
use crate::runtime::RuntimeCallError;
use crate::schedule::ScheduleError;
use crate::strategy::StrategyError;
use crate::te::TeError;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Infer(#[from] InferError),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Te(#[from] TeError),
    #[error(transparent)]
    Lower(#[from] LowerError),
    #[error(transparent)]
    Runtime(#[from] RuntimeCallError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Attr(#[from] AttrError),
    #[error("compute for '{op}' produced {found} for output {index}, inference said {expected}")]
    OutputMismatch {
        op: String,
        index: usize,
        expected: String,
        found: String,
    },
    #[error("artifact {0:?} is not available")]
    MissingArtifact(ArtifactId),
}

impl CompileError {
    pub fn code(&self) -> DiagCode {
        match self {
            CompileError::Registry(e) => e.code(),
            CompileError::Infer(e) => e.code(),
            CompileError::Strategy(e) => e.code(),
            CompileError::Schedule(e) => e.code(),
            CompileError::Te(e) => e.code(),
            CompileError::Lower(e) => e.code(),
            CompileError::Runtime(e) => e.code(),
            CompileError::Graph(e) => e.code(),
            CompileError::Attr(_) => codes::E0103,
            CompileError::OutputMismatch { .. } => codes::I0005,
            CompileError::MissingArtifact(_) => codes::I0006,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CompileError::Registry(e) => e.class(),
            CompileError::Infer(e) => e.class(),
            CompileError::Strategy(e) => e.class(),
            CompileError::Schedule(e) => e.class(),
            CompileError::Te(e) => e.class(),
            CompileError::Lower(e) => e.class(),
            CompileError::Runtime(e) => e.class(),
            CompileError::Graph(e) => e.class(),
            CompileError::Attr(_) => ErrorClass::Construction,
            CompileError::OutputMismatch { .. } | CompileError::MissingArtifact(_) => {
                ErrorClass::Internal
            }
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::new(DiagLevel::Error, self.class(), self.to_string())
            .with_code(self.code());
        if let Some(hint) = self.hint() {
            diag = diag.with_hint(hint);
        }
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            diag = diag.with_cause(cause.to_string());
            source = cause.source();
        }
        diag
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            CompileError::Registry(RegistryError::UnknownOp { .. }) => {
                Some("run with --emit registry to list operators")
            }
            CompileError::Infer(InferError::MissingAttribute { .. }) => {
                Some("pass it with --attr key=value")
            }
            CompileError::Strategy(StrategyError::NoImplementation { .. }) => {
                Some("choose another --target")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_delegate_to_source() {
        let e = CompileError::from(InferError::MissingAttribute {
            op: "randint".into(),
            key: "shape".into(),
        });
        assert_eq!(e.code(), codes::E0100);
        assert_eq!(e.class(), ErrorClass::Construction);

        let e = CompileError::from(StrategyError::EmptyStrategy { op: "x".into() });
        assert_eq!(e.class(), ErrorClass::Configuration);
    }

    #[test]
    fn diagnostic_carries_hint() {
        let e = CompileError::from(RegistryError::UnknownOp {
            name: "conv9d".into(),
        });
        let d = e.to_diagnostic();
        assert_eq!(d.code, Some(codes::E0003));
        assert!(d.hint.is_some());
        assert_eq!(d.level, DiagLevel::Error);
    }

    #[test]
    fn internal_mismatch_is_internal() {
        let e = CompileError::OutputMismatch {
            op: "identity".into(),
            index: 0,
            expected: "[4]".into(),
            found: "[8]".into(),
        };
        assert_eq!(e.class(), ErrorClass::Internal);
        assert!(e.to_diagnostic().to_string().starts_with("internal error[I0005]"));
    }
}
