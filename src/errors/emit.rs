// src/errors/emit.rs
//! Emission and environment errors (E3xxx).

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum EmitError {
    #[error("interface path '{path}' is reserved")]
    #[diagnostic(code(E3001), help("the main and init file names cannot be interface paths"))]
    ReservedInterfacePath {
        path: String,
        #[label("reserved path")]
        span: SourceSpan,
    },

    #[error("interface '{path}' is declared more than once")]
    #[diagnostic(code(E3002))]
    DuplicateInterface {
        path: String,
        #[label("second declaration")]
        span: SourceSpan,
    },

    #[error("module '{name}' not found")]
    #[diagnostic(code(E3003))]
    ModuleNotFound {
        name: String,
        #[label("unresolved import")]
        span: SourceSpan,
    },

    #[error("circular import of module '{name}'")]
    #[diagnostic(code(E3004))]
    CircularParse {
        name: String,
        #[label("import cycle enters here")]
        span: SourceSpan,
    },

    #[error("i/o error: {0}")]
    #[diagnostic(code(E3005))]
    Io(#[from] std::io::Error),
}
