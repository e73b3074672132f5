// src/frontend/lexer.rs

use std::collections::VecDeque;

use smallvec::{SmallVec, smallvec};

use crate::errors::LexerError;
use crate::frontend::{Span, Token, TokenType};

/// Parse an integer literal (decimal, 0x..., 0b...) into a value.
/// Returns None when the literal does not fit the 32-bit signed range
/// scoreboards use.
pub fn parse_int_literal(text: &str) -> Option<i32> {
    let (digits, radix) = if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (rest, 16)
    } else if let Some(rest) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (rest, 2)
    } else {
        (text, 10)
    };
    let value = i64::from_str_radix(digits, radix).ok()?;
    i32::try_from(value).ok()
}

pub struct Lexer<'src> {
    source: &'src str,
    chars: std::iter::Peekable<std::str::CharIndices<'src>>,
    start: usize,
    current: usize,
    line: u32,
    column: u32,
    start_line: u32,
    start_column: u32,
    // Indentation stack; the bottom entry is always width 0
    indents: SmallVec<[u32; 8]>,
    // Queued layout tokens (dedent bursts, final newline/eof)
    pending: VecDeque<Token>,
    // Open brackets; newlines and indentation are suppressed inside
    brackets: SmallVec<[(char, Span); 4]>,
    at_line_start: bool,
    // True right after a layout token: a '/' here starts a raw command
    stmt_start: bool,
    // Formatted-string state
    in_interp_string: bool,
    interp_brace_depth: u32,
    string_open: Option<Span>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            indents: smallvec![0],
            pending: VecDeque::new(),
            brackets: SmallVec::new(),
            at_line_start: true,
            stmt_start: true,
            in_interp_string: false,
            interp_brace_depth: 0,
            string_open: None,
        }
    }

    /// Get the next token from the source
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        if let Some(tok) = self.pending.pop_front() {
            return Ok(self.emit(tok));
        }

        if self.at_line_start && self.brackets.is_empty() && !self.in_interp_string {
            self.handle_indentation()?;
            if let Some(tok) = self.pending.pop_front() {
                return Ok(self.emit(tok));
            }
        }

        self.skip_inline_whitespace();

        self.start = self.current;
        self.start_column = self.column;
        self.start_line = self.line;

        let Some(c) = self.advance() else {
            return self.finish();
        };

        let tok = match c {
            '\n' => {
                let token = self.make_token(TokenType::Newline);
                self.line += 1;
                self.column = 1;
                if self.brackets.is_empty() {
                    self.at_line_start = true;
                    token
                } else {
                    // Newlines inside brackets are suppressed
                    return self.next_token();
                }
            }

            '\\' => return self.line_continuation(),

            '#' => {
                self.comment()?;
                return self.next_token();
            }

            '(' | '[' => {
                self.brackets.push((c, self.token_span()));
                self.make_token(if c == '(' {
                    TokenType::LParen
                } else {
                    TokenType::LBracket
                })
            }
            '{' => {
                self.brackets.push((c, self.token_span()));
                if self.in_interp_string {
                    self.interp_brace_depth += 1;
                }
                self.make_token(TokenType::LBrace)
            }
            ')' | ']' => self.close_bracket(c)?,
            '}' => {
                if self.in_interp_string && self.interp_brace_depth == 1 {
                    self.interp_brace_depth = 0;
                    return self.string_interp_continue();
                }
                if self.in_interp_string {
                    self.interp_brace_depth -= 1;
                }
                self.close_bracket('}')?
            }

            ',' => self.make_token(TokenType::Comma),
            '.' => self.make_token(TokenType::Dot),
            '&' => self.make_token(TokenType::Amp),
            '@' => self.make_token(TokenType::At),
            '|' => self.make_token(TokenType::Pipe),

            ':' => {
                if self.match_char('=') {
                    self.make_token(TokenType::ColonEq)
                } else {
                    self.make_token(TokenType::Colon)
                }
            }
            '+' => {
                if self.match_char('=') {
                    self.make_token(TokenType::PlusEq)
                } else {
                    self.make_token(TokenType::Plus)
                }
            }
            '-' => {
                if self.match_char('>') {
                    self.make_token(TokenType::Arrow)
                } else if self.match_char('=') {
                    self.make_token(TokenType::MinusEq)
                } else {
                    self.make_token(TokenType::Minus)
                }
            }
            '*' => {
                if self.match_char('=') {
                    self.make_token(TokenType::StarEq)
                } else {
                    self.make_token(TokenType::Star)
                }
            }
            '%' => {
                if self.match_char('=') {
                    self.make_token(TokenType::PercentEq)
                } else {
                    self.make_token(TokenType::Percent)
                }
            }
            '/' => {
                if self.stmt_start {
                    return self.raw_command();
                }
                if self.match_char('=') {
                    self.make_token(TokenType::SlashEq)
                } else {
                    self.make_token(TokenType::Slash)
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.make_token(TokenType::EqEq)
                } else {
                    self.make_token(TokenType::Eq)
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenType::BangEq)
                } else {
                    return Err(self.error_invalid_char('!'));
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenType::LtEq)
                } else {
                    self.make_token(TokenType::Lt)
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenType::GtEq)
                } else {
                    self.make_token(TokenType::Gt)
                }
            }

            '"' => return self.string(),

            c if c.is_ascii_digit() => return self.number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(),

            c => return Err(self.error_invalid_char(c)),
        };
        Ok(self.emit(tok))
    }

    // --- Layout ---

    /// Measure indentation at a line start, skipping blank and
    /// comment-only lines, and queue INDENT/DEDENT tokens.
    fn handle_indentation(&mut self) -> Result<(), LexerError> {
        loop {
            let line_start = self.current;
            let line_no = self.line;
            let mut width: u32 = 0;
            while self.peek() == Some(' ') {
                self.advance();
                width += 1;
            }
            match self.peek() {
                // EOF: leave at_line_start set so the next call drains
                // the dedent stack and emits EOF.
                None => return Ok(()),
                Some('\n') => {
                    // Blank line
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                    continue;
                }
                Some('#') => {
                    self.start = self.current;
                    self.start_line = self.line;
                    self.start_column = self.column;
                    self.advance();
                    self.comment()?;
                    if self.peek() == Some('\n') {
                        self.advance();
                        self.line += 1;
                        self.column = 1;
                        continue;
                    }
                    if self.peek().is_none() {
                        return Ok(());
                    }
                    // Block comment closed mid-line; the rest of the
                    // line is real content at this width.
                }
                _ => {}
            }

            let span = Span::new(line_start, self.current, line_no, 1);
            let top = *self.indents.last().unwrap();
            if width > top {
                self.indents.push(width);
                self.pending
                    .push_back(Token::new(TokenType::Indent, "", span));
            } else if width < top {
                while *self.indents.last().unwrap() > width {
                    self.indents.pop();
                    self.pending
                        .push_back(Token::new(TokenType::Dedent, "", span));
                }
                if *self.indents.last().unwrap() != width {
                    return Err(LexerError::InvalidDedent { span: span.into() });
                }
            }
            self.at_line_start = false;
            return Ok(());
        }
    }

    /// End of input: close the last line, drain dedents, emit EOF.
    fn finish(&mut self) -> Result<Token, LexerError> {
        if self.in_interp_string {
            let span = self.string_open.unwrap_or_else(|| self.token_span());
            return Err(LexerError::UnclosedFExpr { span: span.into() });
        }
        if let Some(&(open, span)) = self.brackets.last() {
            return Err(LexerError::UnclosedBracket {
                open,
                span: span.into(),
            });
        }
        let span = self.token_span();
        if !self.at_line_start {
            self.at_line_start = true;
            return Ok(self.emit(Token::new(TokenType::Newline, "", span)));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.pending
                .push_back(Token::new(TokenType::Dedent, "", span));
        }
        self.pending.push_back(Token::new(TokenType::Eof, "", span));
        let tok = self.pending.pop_front().unwrap();
        Ok(self.emit(tok))
    }

    fn line_continuation(&mut self) -> Result<Token, LexerError> {
        let span = self.token_span();
        // Trailing whitespace after the backslash is fine; anything
        // else on the line is not.
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                    // Leading whitespace of the continued line is
                    // ordinary inline whitespace, not indentation.
                    return self.next_token();
                }
                Some(_) => {
                    return Err(LexerError::CharAfterContinuation { span: span.into() });
                }
                None => {
                    return Err(LexerError::EofAfterContinuation { span: span.into() });
                }
            }
        }
    }

    fn close_bracket(&mut self, close: char) -> Result<Token, LexerError> {
        let expected_open = match close {
            ')' => '(',
            ']' => '[',
            _ => '{',
        };
        match self.brackets.pop() {
            Some((open, _)) if open == expected_open => Ok(self.make_token(match close {
                ')' => TokenType::RParen,
                ']' => TokenType::RBracket,
                _ => TokenType::RBrace,
            })),
            _ => Err(LexerError::UnmatchedBracketPair {
                close,
                span: self.token_span().into(),
            }),
        }
    }

    // --- Comments ---

    /// Called with the '#' already consumed.
    fn comment(&mut self) -> Result<(), LexerError> {
        if self.peek() == Some('*') {
            // Long comment: #* ... *#
            let open_span = self.token_span();
            self.advance();
            loop {
                match self.advance() {
                    None => {
                        return Err(LexerError::UnclosedLongComment {
                            span: open_span.into(),
                        });
                    }
                    Some('\n') => {
                        self.line += 1;
                        self.column = 1;
                    }
                    Some('*') if self.peek() == Some('#') => {
                        self.advance();
                        return Ok(());
                    }
                    Some(_) => {}
                }
            }
        }
        // Line comment: run to end of line without consuming the newline
        while self.peek() != Some('\n') && self.peek().is_some() {
            self.advance();
        }
        Ok(())
    }

    // --- Raw commands ---

    /// Called with the leading '/' already consumed at statement start.
    fn raw_command(&mut self) -> Result<Token, LexerError> {
        if self.peek() == Some('*') {
            // Long command: /* ... */ may span lines; interior line
            // breaks collapse to a single space.
            let open_span = self.token_span();
            self.advance();
            let mut text = String::new();
            loop {
                match self.advance() {
                    None => {
                        return Err(LexerError::UnclosedLongComment {
                            span: open_span.into(),
                        });
                    }
                    Some('\n') => {
                        self.line += 1;
                        self.column = 1;
                        text.push('\n');
                    }
                    Some('*') if self.peek() == Some('/') => {
                        self.advance();
                        break;
                    }
                    Some(c) => text.push(c),
                }
            }
            let joined = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            let span = self.token_span();
            return Ok(self.emit(Token::new(TokenType::Command, joined, span)));
        }
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.advance();
        }
        let span = self.token_span();
        Ok(self.emit(Token::new(TokenType::Command, text, span)))
    }

    // --- Strings ---

    /// Scan a string literal; called with the opening '"' consumed.
    /// Escapes stay raw in the lexeme and are processed by the parser.
    fn string(&mut self) -> Result<Token, LexerError> {
        let open_span = self.token_span();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(LexerError::UnclosedQuote {
                        span: open_span.into(),
                    });
                }
                Some('"') => {
                    self.advance();
                    return Ok(self.emit(self.make_token(TokenType::StringLiteral)));
                }
                Some('\\') => self.string_escape(&open_span)?,
                Some('{') => {
                    self.advance();
                    self.in_interp_string = true;
                    self.interp_brace_depth = 1;
                    self.string_open = Some(open_span);
                    return Ok(self.emit(self.make_token(TokenType::StringBegin)));
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Continue scanning after a formatted hole closes.
    fn string_interp_continue(&mut self) -> Result<Token, LexerError> {
        // The '}' was just consumed; include it in the lexeme.
        self.start = self.current - 1;
        let open_span = self.string_open.unwrap_or_else(|| self.token_span());
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(LexerError::UnclosedQuote {
                        span: open_span.into(),
                    });
                }
                Some('"') => {
                    self.advance();
                    self.in_interp_string = false;
                    self.string_open = None;
                    return Ok(self.emit(self.make_token(TokenType::StringEnd)));
                }
                Some('{') => {
                    self.advance();
                    self.interp_brace_depth = 1;
                    return Ok(self.emit(self.make_token(TokenType::StringMid)));
                }
                Some('\\') => self.string_escape(&open_span)?,
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Consume one escape sequence inside a string. `\f{...}` carries
    /// its braces so a font spec is never mistaken for a hole.
    fn string_escape(&mut self, open_span: &Span) -> Result<(), LexerError> {
        self.advance(); // backslash
        match self.peek() {
            None | Some('\n') => Err(LexerError::UnclosedQuote {
                span: (*open_span).into(),
            }),
            Some('f') => {
                self.advance();
                if self.peek() == Some('{') {
                    let font_span = self.token_span();
                    self.advance();
                    loop {
                        match self.peek() {
                            None | Some('\n') => {
                                return Err(LexerError::UnclosedFont {
                                    span: font_span.into(),
                                });
                            }
                            Some('}') => {
                                self.advance();
                                return Ok(());
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                }
                Ok(())
            }
            Some(_) => {
                self.advance();
                Ok(())
            }
        }
    }

    // --- Numbers and identifiers ---

    fn number(&mut self) -> Result<Token, LexerError> {
        let first_is_zero = &self.source[self.start..self.current] == "0";
        if first_is_zero && matches!(self.peek(), Some('x') | Some('X') | Some('b') | Some('B')) {
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() {
                    self.advance();
                } else {
                    break;
                }
            }
            let tok = self.make_token(TokenType::IntLiteral);
            return if parse_int_literal(&tok.lexeme).is_some() {
                Ok(self.emit(tok))
            } else {
                Err(LexerError::IntOverflow {
                    span: tok.span.into(),
                })
            };
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        // Decimal point followed by a digit makes a float
        if self.peek() == Some('.')
            && self
                .peek_next()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        {
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.advance();
                } else {
                    break;
                }
            }
            return Ok(self.emit(self.make_token(TokenType::FloatLiteral)));
        }

        let tok = self.make_token(TokenType::IntLiteral);
        if parse_int_literal(&tok.lexeme).is_some() {
            Ok(self.emit(tok))
        } else {
            Err(LexerError::IntOverflow {
                span: tok.span.into(),
            })
        }
    }

    fn identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.source[self.start..self.current];
        let ty = Self::keyword_type(text).unwrap_or(TokenType::Identifier);
        self.make_token(ty)
    }

    fn keyword_type(text: &str) -> Option<TokenType> {
        match text {
            "if" => Some(TokenType::KwIf),
            "elif" => Some(TokenType::KwElif),
            "else" => Some(TokenType::KwElse),
            "while" => Some(TokenType::KwWhile),
            "for" => Some(TokenType::KwFor),
            "in" => Some(TokenType::KwIn),
            "def" => Some(TokenType::KwDef),
            "inline" => Some(TokenType::KwInline),
            "const" => Some(TokenType::KwConst),
            "entity" => Some(TokenType::KwEntity),
            "struct" => Some(TokenType::KwStruct),
            "interface" => Some(TokenType::KwInterface),
            "import" => Some(TokenType::KwImport),
            "pass" => Some(TokenType::KwPass),
            "result" => Some(TokenType::KwResult),
            "new" => Some(TokenType::KwNew),
            "virtual" => Some(TokenType::KwVirtual),
            "override" => Some(TokenType::KwOverride),
            "static" => Some(TokenType::KwStatic),
            "and" => Some(TokenType::KwAnd),
            "or" => Some(TokenType::KwOr),
            "not" => Some(TokenType::KwNot),
            "True" => Some(TokenType::KwTrue),
            "False" => Some(TokenType::KwFalse),
            "None" => Some(TokenType::KwNone),
            "self" => Some(TokenType::KwSelf),
            _ => None,
        }
    }

    // --- Scanner primitives ---

    fn skip_inline_whitespace(&mut self) {
        while let Some(' ') | Some('\t') | Some('\r') = self.peek() {
            self.advance();
        }
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((idx, c)) = self.chars.next() {
            self.current = idx + c.len_utf8();
            self.column += 1;
            Some(c)
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        self.source[self.current..].chars().nth(1)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn token_span(&self) -> Span {
        Span::new_with_end(
            self.start,
            self.current,
            self.start_line,
            self.start_column,
            self.line,
            self.column,
        )
    }

    fn make_token(&self, ty: TokenType) -> Token {
        let lexeme = &self.source[self.start..self.current];
        Token::new(ty, lexeme, self.token_span())
    }

    fn emit(&mut self, tok: Token) -> Token {
        self.stmt_start = matches!(
            tok.ty,
            TokenType::Newline | TokenType::Indent | TokenType::Dedent
        );
        tok
    }

    fn error_invalid_char(&self, ch: char) -> LexerError {
        LexerError::InvalidChar {
            ch,
            span: self.token_span().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_types(source: &str) -> Vec<TokenType> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().expect("lex error");
            let ty = tok.ty;
            out.push(ty);
            if ty == TokenType::Eof {
                return out;
            }
        }
    }

    fn lex_error(source: &str) -> LexerError {
        let mut lexer = Lexer::new(source);
        loop {
            match lexer.next_token() {
                Ok(tok) if tok.ty == TokenType::Eof => panic!("expected a lex error"),
                Ok(_) => {}
                Err(e) => return e,
            }
        }
    }

    #[test]
    fn lex_operators() {
        use TokenType::*;
        assert_eq!(
            token_types("a + b * c == d"),
            vec![Identifier, Plus, Identifier, Star, Identifier, EqEq, Identifier, Newline, Eof]
        );
    }

    #[test]
    fn lex_keywords_and_walrus() {
        use TokenType::*;
        assert_eq!(
            token_types("x := 1"),
            vec![Identifier, ColonEq, IntLiteral, Newline, Eof]
        );
        assert_eq!(token_types("pass")[0], KwPass);
        assert_eq!(token_types("entity")[0], KwEntity);
    }

    #[test]
    fn lex_radix_literals() {
        let mut lexer = Lexer::new("0XF2e 0b11 42");
        let t = lexer.next_token().unwrap();
        assert_eq!(t.ty, TokenType::IntLiteral);
        assert_eq!(parse_int_literal(&t.lexeme), Some(0xF2e));
        let t = lexer.next_token().unwrap();
        assert_eq!(parse_int_literal(&t.lexeme), Some(3));
        let t = lexer.next_token().unwrap();
        assert_eq!(parse_int_literal(&t.lexeme), Some(42));
    }

    #[test]
    fn lex_int_overflow() {
        let err = lex_error("99999999999");
        assert!(matches!(err, LexerError::IntOverflow { .. }));
    }

    #[test]
    fn lex_indentation() {
        use TokenType::*;
        let src = "if x:\n    pass\ny := 1\n";
        assert_eq!(
            token_types(src),
            vec![
                KwIf, Identifier, Colon, Newline, Indent, KwPass, Newline, Dedent, Identifier,
                ColonEq, IntLiteral, Newline, Eof
            ]
        );
    }

    #[test]
    fn lex_dedent_to_unknown_level_fails() {
        let src = "if x:\n        pass\n    pass\n";
        let err = lex_error(src);
        assert!(matches!(err, LexerError::InvalidDedent { .. }));
    }

    #[test]
    fn lex_blank_and_comment_lines_ignored() {
        use TokenType::*;
        let src = "a := 1\n\n# comment\n    # indented comment\nb := 2\n";
        assert_eq!(
            token_types(src),
            vec![
                Identifier, ColonEq, IntLiteral, Newline, Identifier, ColonEq, IntLiteral,
                Newline, Eof
            ]
        );
    }

    #[test]
    fn lex_long_comment() {
        use TokenType::*;
        let src = "a := 1 #* multi\nline *# + 2\n";
        assert_eq!(
            token_types(src),
            vec![Identifier, ColonEq, IntLiteral, Plus, IntLiteral, Newline, Eof]
        );
    }

    #[test]
    fn lex_unclosed_long_comment() {
        let err = lex_error("#* never closed");
        assert!(matches!(err, LexerError::UnclosedLongComment { .. }));
    }

    #[test]
    fn lex_line_continuation() {
        use TokenType::*;
        let src = "a := 1 + \\\n    2\n";
        assert_eq!(
            token_types(src),
            vec![Identifier, ColonEq, IntLiteral, Plus, IntLiteral, Newline, Eof]
        );
    }

    #[test]
    fn lex_char_after_continuation() {
        let err = lex_error("a := 1 \\ x\n2\n");
        assert!(matches!(err, LexerError::CharAfterContinuation { .. }));
    }

    #[test]
    fn lex_eof_after_continuation() {
        let err = lex_error("a := 1 \\");
        assert!(matches!(err, LexerError::EofAfterContinuation { .. }));
    }

    #[test]
    fn lex_brackets_suppress_newlines() {
        use TokenType::*;
        let src = "a := [1,\n      2]\n";
        assert_eq!(
            token_types(src),
            vec![
                Identifier, ColonEq, LBracket, IntLiteral, Comma, IntLiteral, RBracket, Newline,
                Eof
            ]
        );
    }

    #[test]
    fn lex_unmatched_bracket() {
        let err = lex_error("a := (1]\n");
        assert!(matches!(
            err,
            LexerError::UnmatchedBracketPair { close: ']', .. }
        ));
    }

    #[test]
    fn lex_unclosed_bracket() {
        let err = lex_error("a := (1");
        assert!(matches!(err, LexerError::UnclosedBracket { open: '(', .. }));
    }

    #[test]
    fn lex_plain_string() {
        let mut lexer = Lexer::new("\"hello world\"");
        let t = lexer.next_token().unwrap();
        assert_eq!(t.ty, TokenType::StringLiteral);
        assert_eq!(t.lexeme, "\"hello world\"");
    }

    #[test]
    fn lex_string_interpolation() {
        let mut lexer = Lexer::new("\"x={x}, y={y}\"");
        assert_eq!(lexer.next_token().unwrap().ty, TokenType::StringBegin);
        assert_eq!(lexer.next_token().unwrap().ty, TokenType::Identifier);
        assert_eq!(lexer.next_token().unwrap().ty, TokenType::StringMid);
        assert_eq!(lexer.next_token().unwrap().ty, TokenType::Identifier);
        assert_eq!(lexer.next_token().unwrap().ty, TokenType::StringEnd);
    }

    #[test]
    fn lex_string_hole_with_map_literal() {
        use TokenType::*;
        let src = "\"v={ {1: 2}[1] }\"";
        assert_eq!(
            token_types(src),
            vec![
                StringBegin, LBrace, IntLiteral, Colon, IntLiteral, RBrace, LBracket, IntLiteral,
                RBracket, StringEnd, Newline, Eof
            ]
        );
    }

    #[test]
    fn lex_unclosed_string_reports_open_quote() {
        let src = "s = \"hello";
        let err = lex_error(src);
        match err {
            LexerError::UnclosedQuote { span } => {
                // Span points at the opening quote (byte 4)
                assert_eq!(span.offset(), 4);
            }
            other => panic!("expected UnclosedQuote, got {other:?}"),
        }
    }

    #[test]
    fn lex_font_escape_is_not_a_hole() {
        let mut lexer = Lexer::new("\"\\f{bold}hi\\f{}\"");
        let t = lexer.next_token().unwrap();
        assert_eq!(t.ty, TokenType::StringLiteral);
    }

    #[test]
    fn lex_unclosed_font() {
        let err = lex_error("\"\\f{bold\"");
        assert!(matches!(err, LexerError::UnclosedFont { .. }));
    }

    #[test]
    fn lex_raw_command_at_line_start() {
        let mut lexer = Lexer::new("/say hello ${name}\n");
        let t = lexer.next_token().unwrap();
        assert_eq!(t.ty, TokenType::Command);
        assert_eq!(t.lexeme, "say hello ${name}");
    }

    #[test]
    fn lex_slash_mid_line_is_division() {
        use TokenType::*;
        assert_eq!(
            token_types("a := b / c\n"),
            vec![Identifier, ColonEq, Identifier, Slash, Identifier, Newline, Eof]
        );
    }

    #[test]
    fn lex_long_command_joins_lines() {
        let src = "/*say this is\n   one long command*/\n";
        let mut lexer = Lexer::new(src);
        let t = lexer.next_token().unwrap();
        assert_eq!(t.ty, TokenType::Command);
        assert_eq!(t.lexeme, "say this is one long command");
    }

    #[test]
    fn lex_final_line_without_newline() {
        use TokenType::*;
        assert_eq!(
            token_types("x := 1"),
            vec![Identifier, ColonEq, IntLiteral, Newline, Eof]
        );
    }

    #[test]
    fn lex_dedent_burst_at_eof() {
        use TokenType::*;
        let src = "if a:\n    if b:\n        pass";
        let types = token_types(src);
        let dedents = types.iter().filter(|t| **t == Dedent).count();
        assert_eq!(dedents, 2);
        assert_eq!(*types.last().unwrap(), Eof);
    }

    #[test]
    fn lex_score_literal_tokens() {
        use TokenType::*;
        assert_eq!(
            token_types("|\"p\": \"obj\"|"),
            vec![Pipe, StringLiteral, Colon, StringLiteral, Pipe, Newline, Eof]
        );
    }
}
