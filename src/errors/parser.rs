// src/errors/parser.rs
//! Syntactic errors (E1xxx).

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ParserError {
    #[error("expected {expected}, found '{found}'")]
    #[diagnostic(code(E1001))]
    ExpectedToken {
        expected: String,
        found: String,
        #[label("unexpected token")]
        span: SourceSpan,
    },

    #[error("unexpected token '{found}'")]
    #[diagnostic(code(E1002))]
    UnexpectedToken {
        found: String,
        #[label("unexpected token")]
        span: SourceSpan,
    },

    #[error("expected an indented block")]
    #[diagnostic(code(E1003), help("a ':' header must be followed by an indented suite"))]
    EmptyBlock {
        #[label("block expected after this")]
        span: SourceSpan,
    },

    #[error("invalid assignment target")]
    #[diagnostic(code(E1004))]
    InvalidAssignTarget {
        #[label("cannot assign to this expression")]
        span: SourceSpan,
    },

    #[error("invalid formatted expression")]
    #[diagnostic(code(E1005))]
    InvalidFExpr {
        #[label("expected an expression inside '{{}}'")]
        span: SourceSpan,
    },

    #[error("parameter without default follows parameter with default")]
    #[diagnostic(code(E1006))]
    NonDefaultAfterDefault {
        #[label("needs a default value")]
        span: SourceSpan,
    },
}
