// src/errors/mod.rs
//! Structured error reporting for the Acacia compiler.
//!
//! Error codes: E0xxx lexical, E1xxx syntactic, E2xxx semantic,
//! E3xxx emission and environment.

pub mod emit;
pub mod lexer;
pub mod parser;
pub mod report;
pub mod sema;

pub use emit::EmitError;
pub use lexer::LexerError;
pub use parser::ParserError;
pub use report::{render_to_stderr, render_to_string};
pub use sema::SemaError;

use miette::{Diagnostic, LabeledSpan, SourceSpan};
use std::fmt;
use thiserror::Error;

/// One note on the compile-time call stack: "calling `f`" at some span.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub message: String,
    pub span: SourceSpan,
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CallFrame {}

impl Diagnostic for CallFrame {
    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Advice)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some("here".to_string()),
            self.span,
        ))))
    }
}

/// A semantic error together with the compile-time call trace that led
/// to it ("calling `f`" / "callee defined at" notes).
#[derive(Debug, Clone)]
pub struct Traced {
    pub error: SemaError,
    pub frames: Vec<CallFrame>,
}

impl Traced {
    pub fn new(error: SemaError) -> Self {
        Self {
            error,
            frames: Vec::new(),
        }
    }

    pub fn with_frame(mut self, message: String, span: SourceSpan) -> Self {
        self.frames.push(CallFrame { message, span });
        self
    }
}

impl From<SemaError> for Traced {
    fn from(error: SemaError) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Traced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for Traced {}

impl Diagnostic for Traced {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.error.code()
    }

    fn severity(&self) -> Option<miette::Severity> {
        self.error.severity()
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.error.help()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.error.labels()
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        if self.frames.is_empty() {
            return None;
        }
        Some(Box::new(
            self.frames.iter().map(|f| f as &dyn Diagnostic),
        ))
    }
}

/// Top-level pipeline error: any stage can abort compilation.
#[derive(Error, Debug, Diagnostic)]
pub enum CompileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lexer(#[from] LexerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Sema(#[from] Traced),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Emit(#[from] EmitError),
}

impl From<SemaError> for CompileError {
    fn from(error: SemaError) -> Self {
        CompileError::Sema(Traced::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traced_exposes_inner_code() {
        let err = Traced::new(SemaError::ResultOutOfScope {
            span: (0, 3).into(),
        });
        assert_eq!(err.code().unwrap().to_string(), "E2033");
    }

    #[test]
    fn traced_frames_surface_as_related() {
        let err = Traced::new(SemaError::NonRtResult {
            span: (0, 1).into(),
        })
        .with_frame("calling `f`".to_string(), (10, 2).into());
        assert_eq!(err.related().unwrap().count(), 1);
    }
}
