use super::types::{Span, SyntaxError, Token, TokenKind};

const TAB_WIDTH: u32 = 8;

/// Tokenize guest source, producing `Indent`/`Dedent`/`Newline` tokens for
/// block structure. Newlines inside parentheses are ignored.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    indents: Vec<u32>,
    depth: u32,
    open_parens: Vec<Span>,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 0,
            indents: vec![0],
            depth: 0,
            open_parens: Vec::new(),
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn push(&mut self, kind: TokenKind, span: Span) {
        self.tokens.push(Token { kind, span });
    }

    fn here(&self) -> Span {
        Span::new(self.line, self.col, self.line, self.col)
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        loop {
            if self.at_line_start && self.depth == 0 && !self.indentation()? {
                continue;
            }

            let Some(ch) = self.peek() else {
                break;
            };

            match ch {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '\n' => {
                    let span = self.here();
                    self.advance();
                    if self.depth == 0 {
                        self.newline(span);
                        self.at_line_start = true;
                    }
                }
                '#' => self.skip_comment(),
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number()?,
                '"' | '\'' => self.string(ch)?,
                c if c.is_alphabetic() || c == '_' => self.identifier(),
                _ => self.operator(ch)?,
            }
        }

        if let Some(open) = self.open_parens.last() {
            return Err(SyntaxError::at(*open, "'(' was never closed"));
        }

        let end = self.here();
        self.newline(end);
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, end);
        }
        self.push(TokenKind::Eof, end);
        Ok(self.tokens)
    }

    fn newline(&mut self, span: Span) {
        let needs_newline = self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent));
        if needs_newline {
            self.push(TokenKind::Newline, span);
        }
    }

    /// Measures the indentation of a logical line. Returns `false` when the
    /// line was blank or comment-only and has been consumed.
    fn indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut width = 0u32;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width += TAB_WIDTH - width % TAB_WIDTH,
                '\x0c' => width = 0,
                _ => break,
            }
            self.advance();
        }

        match self.peek() {
            None => {
                self.at_line_start = false;
                return Ok(true);
            }
            Some('\n') | Some('\r') | Some('#') => {
                while let Some(ch) = self.advance() {
                    if ch == '\n' {
                        break;
                    }
                }
                return Ok(false);
            }
            _ => {}
        }

        self.at_line_start = false;
        let here = self.here();
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, here);
        } else {
            while width < self.indents.last().copied().unwrap_or(0) {
                self.indents.pop();
                self.push(TokenKind::Dedent, here);
            }
            if width != self.indents.last().copied().unwrap_or(0) {
                return Err(SyntaxError::indentation(
                    self.line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn number(&mut self) -> Result<(), SyntaxError> {
        let start = self.here();
        let mut text = String::new();
        let mut is_float = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '_' {
                if ch != '_' {
                    text.push(ch);
                }
            } else if ch == '.' && !is_float {
                is_float = true;
                text.push(ch);
            } else {
                break;
            }
            self.advance();
        }
        if self.exponent_follows() {
            is_float = true;
            text.push('e');
            self.advance();
            if let Some(sign) = self.peek().filter(|c| matches!(c, '+' | '-')) {
                text.push(sign);
                self.advance();
            }
            while let Some(ch) = self.peek().filter(|c| c.is_ascii_digit() || *c == '_') {
                if ch != '_' {
                    text.push(ch);
                }
                self.advance();
            }
        }
        let span = start.to(self.here());

        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(SyntaxError::at(span, "invalid decimal literal"));
        }

        let kind = if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| SyntaxError::at(span, "invalid decimal literal"))?;
            TokenKind::Float(value)
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| SyntaxError::at(span, "integer literal is too large"))?;
            TokenKind::Int(value)
        };
        self.push(kind, span);
        Ok(())
    }

    /// `e`/`E`, an optional sign, then at least one digit.
    fn exponent_follows(&self) -> bool {
        if !matches!(self.peek(), Some('e' | 'E')) {
            return false;
        }
        let digit_at = if matches!(self.peek_at(1), Some('+' | '-')) { 2 } else { 1 };
        self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit())
    }

    fn string(&mut self, quote: char) -> Result<(), SyntaxError> {
        let start = self.here();
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    let span = start.to(self.here());
                    return Err(SyntaxError::at(span, "unterminated string literal"));
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        Some(other) => {
                            value.push('\\');
                            other
                        }
                        None => {
                            let span = start.to(self.here());
                            return Err(SyntaxError::at(span, "unterminated string literal"));
                        }
                    };
                    value.push(escaped);
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        let span = start.to(self.here());
        self.push(TokenKind::Str(value), span);
        Ok(())
    }

    fn identifier(&mut self) {
        let start = self.here();
        let mut ident = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        let span = start.to(self.here());
        let kind = TokenKind::keyword(&ident).unwrap_or(TokenKind::Name(ident));
        self.push(kind, span);
    }

    fn operator(&mut self, ch: char) -> Result<(), SyntaxError> {
        let start = self.here();
        let next = self.peek_at(1);
        let (kind, width) = match (ch, next) {
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('=', _) => (TokenKind::Assign, 1),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::LtEq, 2),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', Some('=')) => (TokenKind::GtEq, 2),
            ('>', _) => (TokenKind::Gt, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', Some('/')) => (TokenKind::SlashSlash, 2),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            _ => {
                let span = Span::new(start.line, start.col, start.line, start.col + 1);
                return Err(SyntaxError::at(
                    span,
                    format!("invalid character '{}' (U+{:04X})", ch, ch as u32),
                ));
            }
        };
        for _ in 0..width {
            self.advance();
        }
        let span = start.to(self.here());

        match kind {
            TokenKind::LParen => {
                self.depth += 1;
                self.open_parens.push(span);
            }
            TokenKind::RParen => {
                if self.depth == 0 {
                    return Err(SyntaxError::at(span, "unmatched ')'"));
                }
                self.depth -= 1;
                self.open_parens.pop();
            }
            _ => {}
        }

        self.push(kind, span);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_assignment_tokens() {
        assert_eq!(
            kinds("x = 1\n"),
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let k = kinds("while x:\n    y = 1\nz = 2\n");
        assert!(k.contains(&TokenKind::Indent));
        assert!(k.contains(&TokenKind::Dedent));
        let indent = k.iter().position(|t| *t == TokenKind::Indent).unwrap();
        let dedent = k.iter().position(|t| *t == TokenKind::Dedent).unwrap();
        assert!(indent < dedent);
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        let k = kinds("# header\n\nx = 1  # trailing\n\n");
        assert_eq!(k.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
    }

    #[test]
    fn test_newlines_inside_parens_are_ignored() {
        let k = kinds("print(1,\n      2)\n");
        assert_eq!(k.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
        assert!(!k.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_token_spans_are_zero_based_columns() {
        let tokens = tokenize("y = x / 0\n").unwrap();
        let slash = tokens.iter().find(|t| t.kind == TokenKind::Slash).unwrap();
        assert_eq!(slash.span, Span::new(1, 6, 1, 7));
    }

    #[test]
    fn test_float_exponents() {
        assert_eq!(kinds("1e300\n")[0], TokenKind::Float(1e300));
        assert_eq!(kinds("2.5E-3\n")[0], TokenKind::Float(2.5e-3));
        assert_eq!(kinds("1_0e+1_0\n")[0], TokenKind::Float(10e10));
        assert_eq!(kinds(".5e1\n")[0], TokenKind::Float(5.0));
        assert!(tokenize("1e\n").is_err());
        assert!(tokenize("1e+x\n").is_err());
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("x = 'abc\n").unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!(err.line, 1);
        assert_eq!(err.column, Some(5));
    }

    #[test]
    fn test_bad_dedent_is_indentation_error() {
        let err = tokenize("if x:\n    y = 1\n  z = 2\n").unwrap_err();
        assert_eq!(err.kind, super::super::types::SyntaxErrorKind::Indentation);
        assert_eq!(err.line, 3);
        assert_eq!(err.column, None);
    }

    #[test]
    fn test_unclosed_paren() {
        let err = tokenize("print(1\n").unwrap_err();
        assert_eq!(err.message, "'(' was never closed");
    }
}
