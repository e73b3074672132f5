// src/errors/lexer.rs
//! Lexical errors (E0xxx).

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum LexerError {
    #[error("invalid character '{ch}'")]
    #[diagnostic(code(E0001))]
    InvalidChar {
        ch: char,
        #[label("invalid character")]
        span: SourceSpan,
    },

    #[error("unclosed string literal")]
    #[diagnostic(code(E0002), help("add a closing '\"' to terminate the string"))]
    UnclosedQuote {
        #[label("string starts here")]
        span: SourceSpan,
    },

    #[error("unclosed long comment")]
    #[diagnostic(code(E0003), help("close the comment with '*#'"))]
    UnclosedLongComment {
        #[label("comment starts here")]
        span: SourceSpan,
    },

    #[error("dedent does not match any outer indentation level")]
    #[diagnostic(code(E0004))]
    InvalidDedent {
        #[label("unexpected indentation")]
        span: SourceSpan,
    },

    #[error("integer literal out of range")]
    #[diagnostic(code(E0005), help("scores are 32-bit signed integers"))]
    IntOverflow {
        #[label("does not fit in 32 bits")]
        span: SourceSpan,
    },

    #[error("unexpected character after line continuation")]
    #[diagnostic(code(E0006))]
    CharAfterContinuation {
        #[label("only a newline may follow '\\'")]
        span: SourceSpan,
    },

    #[error("end of file after line continuation")]
    #[diagnostic(code(E0007))]
    EofAfterContinuation {
        #[label("continuation has no following line")]
        span: SourceSpan,
    },

    #[error("unmatched closing '{close}'")]
    #[diagnostic(code(E0008))]
    UnmatchedBracketPair {
        close: char,
        #[label("mismatched closer")]
        span: SourceSpan,
    },

    #[error("unclosed '{open}'")]
    #[diagnostic(code(E0009))]
    UnclosedBracket {
        open: char,
        #[label("opened here")]
        span: SourceSpan,
    },

    #[error("invalid escape sequence")]
    #[diagnostic(code(E0010))]
    InvalidUnicodeEscape {
        #[label("unrecognized escape")]
        span: SourceSpan,
    },

    #[error("unclosed font specifier")]
    #[diagnostic(code(E0011), help("font escapes look like \\f{{bold,red}}"))]
    UnclosedFont {
        #[label("font specifier starts here")]
        span: SourceSpan,
    },

    #[error("unclosed formatted expression in string")]
    #[diagnostic(code(E0012))]
    UnclosedFExpr {
        #[label("'{{' is never closed")]
        span: SourceSpan,
    },
}
