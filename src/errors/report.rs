// src/errors/report.rs
//! Rendering utilities for miette diagnostics.
//!
//! We wrap diagnostics to inline the error code with the message.
//! miette displays: `CODE\n\n  × message`
//! We display: `  × [CODE]: message`

use miette::{
    Diagnostic, GraphicalReportHandler, GraphicalTheme, LabeledSpan, Severity, SourceCode,
    ThemeCharacters, ThemeStyles,
};
use std::fmt;

/// Wrapper that inlines the error code into the message.
/// Returns None for code() so miette won't print it separately.
struct InlineCodeDiagnostic<'a> {
    inner: &'a dyn Diagnostic,
    message: String,
}

impl<'a> InlineCodeDiagnostic<'a> {
    fn new(inner: &'a dyn Diagnostic) -> Self {
        let message = if let Some(code) = inner.code() {
            format!("[{}]: {}", code, inner)
        } else {
            inner.to_string()
        };
        Self { inner, message }
    }
}

impl fmt::Debug for InlineCodeDiagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.inner, f)
    }
}

impl fmt::Display for InlineCodeDiagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for InlineCodeDiagnostic<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl Diagnostic for InlineCodeDiagnostic<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        None // Don't show code separately - it's in the message
    }

    fn severity(&self) -> Option<Severity> {
        self.inner.severity()
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.inner.help()
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.inner.source_code()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.inner.labels()
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        self.inner.related()
    }
}

/// Create a handler for terminal output (unicode + colors).
fn terminal_handler() -> GraphicalReportHandler {
    let theme = GraphicalTheme {
        characters: ThemeCharacters::unicode(),
        styles: ThemeStyles::ansi(),
    };
    GraphicalReportHandler::new_themed(theme)
}

/// Create a handler for testing (ascii + no colors).
fn plain_handler() -> GraphicalReportHandler {
    let theme = GraphicalTheme {
        characters: ThemeCharacters::ascii(),
        styles: ThemeStyles::none(),
    };
    GraphicalReportHandler::new_themed(theme)
}

/// Render to stderr with unicode/colors.
pub fn render_to_stderr(report: &dyn Diagnostic) {
    let handler = terminal_handler();
    let wrapped = InlineCodeDiagnostic::new(report);
    let mut output = String::new();
    if handler.render_report(&mut output, &wrapped).is_ok() {
        eprint!("{}", output);
    }
}

/// Render to a buffer without colors (for tests).
pub fn render_to_string(report: &dyn Diagnostic) -> String {
    let handler = plain_handler();
    let wrapped = InlineCodeDiagnostic::new(report);
    let mut output = String::new();
    let _ = handler.render_report(&mut output, &wrapped);
    output
}
