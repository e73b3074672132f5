// src/frontend/token.rs

/// All token types in the Acacia language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Literals
    IntLiteral,
    FloatLiteral,
    StringLiteral,   // "text" with no formatted holes
    StringBegin,     // "text{
    StringMid,       // }text{
    StringEnd,       // }text"
    Command,         // raw /command line (lexeme holds the command text)
    Identifier,

    // Keywords
    KwIf,
    KwElif,
    KwElse,
    KwWhile,
    KwFor,
    KwIn,
    KwDef,
    KwInline,
    KwConst,
    KwEntity,
    KwStruct,
    KwInterface,
    KwImport,
    KwPass,
    KwResult,
    KwNew,
    KwVirtual,
    KwOverride,
    KwStatic,
    KwAnd,
    KwOr,
    KwNot,
    KwTrue,
    KwFalse,
    KwNone,
    KwSelf,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,        // =
    ColonEq,   // :=
    PlusEq,    // +=
    MinusEq,   // -=
    StarEq,    // *=
    SlashEq,   // /=
    PercentEq, // %=
    EqEq,
    BangEq,
    Lt,
    Gt,
    LtEq,
    GtEq,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Arrow, // ->
    Amp,   // &
    At,    // @
    Pipe,  // |

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenType {
    /// Get string representation for error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntLiteral => "integer",
            Self::FloatLiteral => "float",
            Self::StringLiteral => "string",
            Self::StringBegin | Self::StringMid | Self::StringEnd => "formatted string",
            Self::Command => "command",
            Self::Identifier => "identifier",
            Self::KwIf => "if",
            Self::KwElif => "elif",
            Self::KwElse => "else",
            Self::KwWhile => "while",
            Self::KwFor => "for",
            Self::KwIn => "in",
            Self::KwDef => "def",
            Self::KwInline => "inline",
            Self::KwConst => "const",
            Self::KwEntity => "entity",
            Self::KwStruct => "struct",
            Self::KwInterface => "interface",
            Self::KwImport => "import",
            Self::KwPass => "pass",
            Self::KwResult => "result",
            Self::KwNew => "new",
            Self::KwVirtual => "virtual",
            Self::KwOverride => "override",
            Self::KwStatic => "static",
            Self::KwAnd => "and",
            Self::KwOr => "or",
            Self::KwNot => "not",
            Self::KwTrue => "True",
            Self::KwFalse => "False",
            Self::KwNone => "None",
            Self::KwSelf => "self",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Eq => "=",
            Self::ColonEq => ":=",
            Self::PlusEq => "+=",
            Self::MinusEq => "-=",
            Self::StarEq => "*=",
            Self::SlashEq => "/=",
            Self::PercentEq => "%=",
            Self::EqEq => "==",
            Self::BangEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Dot => ".",
            Self::Arrow => "->",
            Self::Amp => "&",
            Self::At => "@",
            Self::Pipe => "|",
            Self::Newline => "newline",
            Self::Indent => "indent",
            Self::Dedent => "dedent",
            Self::Eof => "end of file",
        }
    }
}

/// Source location span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,    // Byte offset
    pub end: usize,      // Byte offset (exclusive)
    pub line: u32,       // Start line (1-indexed)
    pub column: u32,     // Start column (1-indexed)
    pub end_line: u32,   // End line (1-indexed)
    pub end_column: u32, // End column (1-indexed, exclusive)
}

impl Span {
    pub fn new_with_end(
        start: usize,
        end: usize,
        line: u32,
        column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            start,
            end,
            line,
            column,
            end_line,
            end_column,
        }
    }

    /// Create a new span, computing end position for single-line tokens
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        let length = end.saturating_sub(start);
        Self {
            start,
            end,
            line,
            column,
            end_line: line,
            end_column: column + length as u32,
        }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
            line: self.line,
            column: self.column,
            end_line: other.end_line,
            end_column: other.end_column,
        }
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        // miette uses (offset, length)
        (span.start, span.end.saturating_sub(span.start)).into()
    }
}

impl From<&Span> for miette::SourceSpan {
    fn from(span: &Span) -> Self {
        (*span).into()
    }
}

/// A token with its location in source code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub ty: TokenType,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(ty: TokenType, lexeme: impl Into<String>, span: Span) -> Self {
        Self {
            ty,
            lexeme: lexeme.into(),
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_with_end_position() {
        let span = Span::new(0, 5, 1, 1);
        assert_eq!(span.end_line, 1);
        assert_eq!(span.end_column, 6);
    }

    #[test]
    fn span_merge_preserves_end_position() {
        let a = Span::new_with_end(0, 5, 1, 1, 1, 6);
        let b = Span::new_with_end(10, 15, 2, 3, 2, 8);
        let merged = a.merge(b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 15);
        assert_eq!(merged.line, 1);
        assert_eq!(merged.end_line, 2);
        assert_eq!(merged.end_column, 8);
    }

    #[test]
    fn keyword_display_names() {
        assert_eq!(TokenType::KwEntity.as_str(), "entity");
        assert_eq!(TokenType::ColonEq.as_str(), ":=");
        assert_eq!(TokenType::Dedent.as_str(), "dedent");
    }
}
