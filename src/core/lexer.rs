// lexer.rs

use std::fmt;
use std::str::CharIndices;

use tracing::{debug, trace};

use crate::core::grammar;
use crate::core::token::{Literal, Token, TokenKind};

/// A recorded lexing failure. Lexing continues after one is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl LexerError {
    fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.column)
    }
}
impl std::error::Error for LexerError {}

pub struct Lexer<'a> {
    source: &'a str,
    chars: CharIndices<'a>,
    current: Option<(usize, char)>,
    line: usize,
    col: usize,
    in_type_context: bool,
    errors: Vec<LexerError>,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Self {
            source,
            chars: source.char_indices(),
            current: None,
            line: 1,
            col: 0,
            in_type_context: false,
            errors: Vec::new(),
            done: false,
        };
        lexer.advance_char();
        lexer
    }

    /// Errors recorded so far.
    pub fn errors(&self) -> &[LexerError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<LexerError> {
        self.errors
    }

    /// Lex the whole source. Always ends with an `Eof` token, even when errors were recorded.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while !self.done {
            match self.next_token() {
                Ok(Some(tok)) => tokens.push(tok),
                Ok(None) => {}
                Err(e) => {
                    trace!(error = %e, "lexer error recorded");
                    self.errors.push(e);
                }
            }
        }
        debug!(tokens = tokens.len(), errors = self.errors.len(), "tokenized source");
        tokens
    }

    #[inline]
    fn pos(&self) -> (usize, usize) {
        (self.line, self.col)
    }

    #[inline]
    fn offset(&self) -> usize {
        self.current.map(|(i, _)| i).unwrap_or(self.source.len())
    }

    #[inline]
    fn advance_char(&mut self) {
        if let Some((_, '\n')) = self.current {
            self.line += 1;
            self.col = 0;
        }
        self.current = self.chars.next();
        if self.current.is_some() {
            self.col += 1;
        }
    }

    #[inline]
    fn current_char(&self) -> Option<char> {
        self.current.map(|(_, c)| c)
    }

    #[inline]
    fn peek_char(&self) -> Option<char> {
        self.chars.clone().next().map(|(_, c)| c)
    }

    fn slice_from(&self, start: usize) -> &'a str {
        &self.source[start..self.offset()]
    }

    fn make(&self, kind: TokenKind, start: usize, line: usize, col: usize) -> Token {
        Token::new(kind, self.slice_from(start), line, col).at_offset(start)
    }

    /// Produce the next token. `Ok(None)` means whitespace or a comment was consumed.
    pub fn next_token(&mut self) -> Result<Option<Token>, LexerError> {
        let (start, ch) = match self.current {
            Some(c) => c,
            None => {
                self.done = true;
                let (line, col) = self.pos();
                return Ok(Some(Token::eof(line, col + 1, self.source.len())));
            }
        };
        let (line, col) = self.pos();

        if is_whitespace(ch) {
            self.advance_char();
            return Ok(None);
        }
        if ch == '#' {
            self.lex_line_comment();
            return Ok(None);
        }
        if ch == '<' && self.peek_char() == Some('#') {
            self.lex_block_comment()?;
            return Ok(None);
        }
        if ch.is_ascii_digit() {
            return self.lex_number().map(Some);
        }
        if is_identifier_start(ch) {
            return Ok(Some(self.lex_identifier()));
        }
        match ch {
            '$' => return self.lex_variable().map(Some),
            '"' | '\'' => return Ok(Some(self.lex_string(ch))),
            '`' => return Ok(Some(self.lex_raw_string())),
            _ => {}
        }

        if let Some(kind) = self.match_multi_char_operator(ch)? {
            return Ok(Some(self.make(kind, start, line, col)));
        }
        if let Some(kind) = self.match_single_char_token(ch) {
            self.advance_char();
            match kind {
                TokenKind::LBracket => self.in_type_context = true,
                TokenKind::RBracket => self.in_type_context = false,
                _ => {}
            }
            return Ok(Some(self.make(kind, start, line, col)));
        }

        self.advance_char();
        Err(LexerError::new(format!("Unexpected character '{}'", ch), line, col))
    }

    fn lex_line_comment(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == '\n' {
                break;
            }
            self.advance_char();
        }
    }

    /// `<# ... #>`, nesting-aware.
    fn lex_block_comment(&mut self) -> Result<(), LexerError> {
        let (start_line, start_col) = self.pos();
        self.advance_char(); // <
        self.advance_char(); // #
        let mut depth = 1usize;
        while let Some(ch) = self.current_char() {
            match (ch, self.peek_char()) {
                ('<', Some('#')) => {
                    depth += 1;
                    self.advance_char();
                }
                ('#', Some('>')) => {
                    depth -= 1;
                    self.advance_char();
                    if depth == 0 {
                        self.advance_char();
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.advance_char();
        }
        Err(LexerError::new("Unterminated block comment", start_line, start_col))
    }

    fn lex_number(&mut self) -> Result<Token, LexerError> {
        let (line, col) = self.pos();
        let start = self.offset();

        if self.current_char() == Some('0') {
            let radix = match self.peek_char() {
                Some('x') | Some('X') => Some(16),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance_char();
                self.advance_char();
                let digits_start = self.offset();
                while self.current_char().is_some_and(|c| c.is_digit(radix)) {
                    self.advance_char();
                }
                let digits = self.slice_from(digits_start);
                let label = if radix == 16 { "hexadecimal" } else { "binary" };
                if digits.is_empty() {
                    return Err(LexerError::new(format!("Invalid {} literal", label), line, col));
                }
                let value = i64::from_str_radix(digits, radix).map_err(|_| {
                    LexerError::new(format!("Invalid {} literal '{}'", label, self.slice_from(start)), line, col)
                })?;
                return Ok(self.make(TokenKind::Number, start, line, col).with_literal(Literal::Int(value)));
            }
        }

        self.skip_digits();
        let mut is_float = false;
        if self.current_char() == Some('.') && self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance_char();
            self.skip_digits();
            if matches!(self.current_char(), Some('e') | Some('E')) {
                self.advance_char();
                if matches!(self.current_char(), Some('+') | Some('-')) {
                    self.advance_char();
                }
                if !self.current_char().is_some_and(|c| c.is_ascii_digit()) {
                    return Err(LexerError::new("Invalid floating point exponent", line, col));
                }
                self.skip_digits();
            }
        }

        let text = self.slice_from(start);
        let literal = if is_float {
            text.parse::<f64>().map(Literal::Float).ok()
        } else {
            text.parse::<i64>().map(Literal::Int).ok()
        };
        match literal {
            Some(lit) => Ok(self.make(TokenKind::Number, start, line, col).with_literal(lit)),
            None => Err(LexerError::new(format!("Invalid number literal '{}'", text), line, col)),
        }
    }

    fn skip_digits(&mut self) {
        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance_char();
        }
    }

    fn read_identifier(&mut self) -> &'a str {
        let start = self.offset();
        while self.current_char().is_some_and(is_identifier_part) {
            self.advance_char();
        }
        self.slice_from(start)
    }

    fn lex_identifier(&mut self) -> Token {
        let (line, col) = self.pos();
        let start = self.offset();
        let ident = self.read_identifier();
        let type_kind = if self.in_type_context {
            grammar::type_keyword(ident)
        } else {
            None
        };
        match type_kind.or_else(|| grammar::keyword(ident)) {
            Some(kind) => self.make(kind, start, line, col),
            None => self
                .make(TokenKind::Identifier, start, line, col)
                .with_literal(Literal::Ident(ident.to_string())),
        }
    }

    fn lex_variable(&mut self) -> Result<Token, LexerError> {
        let (line, col) = self.pos();
        let start = self.offset();
        self.advance_char(); // $
        if !self.current_char().is_some_and(is_identifier_start) {
            return Err(LexerError::new("Expected variable name after '$'", line, col));
        }
        let name = self.read_identifier().to_string();
        Ok(self
            .make(TokenKind::Variable, start, line, col)
            .with_literal(Literal::Ident(name)))
    }

    /// Quoted string with escapes. An unterminated string records an error and
    /// still yields a token carrying what was read.
    fn lex_string(&mut self, quote: char) -> Token {
        let (line, col) = self.pos();
        let start = self.offset();
        self.advance_char(); // opening quote
        let mut content = String::new();
        loop {
            match self.current_char() {
                None => {
                    self.errors
                        .push(LexerError::new("Unterminated string", line, col));
                    break;
                }
                Some(ch) if ch == quote => {
                    self.advance_char();
                    break;
                }
                Some('\\') => {
                    self.advance_char();
                    match self.current_char() {
                        Some(esc) => {
                            match unescape(esc) {
                                Some(decoded) => content.push(decoded),
                                None => {
                                    content.push('\\');
                                    content.push(esc);
                                }
                            }
                            self.advance_char();
                        }
                        None => content.push('\\'),
                    }
                }
                Some(ch) => {
                    content.push(ch);
                    self.advance_char();
                }
            }
        }
        self.make(TokenKind::Str, start, line, col)
            .with_literal(Literal::Str(content))
    }

    /// Backtick string: no escape processing. Unterminated input is handled
    /// as in `lex_string`.
    fn lex_raw_string(&mut self) -> Token {
        let (line, col) = self.pos();
        let start = self.offset();
        self.advance_char();
        let body_start = self.offset();
        let content = loop {
            match self.current_char() {
                Some('`') => {
                    let content = self.slice_from(body_start).to_string();
                    self.advance_char();
                    break content;
                }
                Some(_) => self.advance_char(),
                None => {
                    self.errors
                        .push(LexerError::new("Unterminated string", line, col));
                    break self.slice_from(body_start).to_string();
                }
            }
        };
        self.make(TokenKind::Str, start, line, col)
            .with_literal(Literal::Str(content))
    }

    /// Greedy match of operators longer than one character, including `-word` operators.
    fn match_multi_char_operator(&mut self, ch: char) -> Result<Option<TokenKind>, LexerError> {
        use TokenKind::*;
        let (line, col) = self.pos();
        let next = self.peek_char();

        if ch == '-' && next.is_some_and(|c| c.is_ascii_alphabetic()) {
            self.advance_char();
            let start = self.offset();
            while self.current_char().is_some_and(|c| c.is_ascii_alphabetic()) {
                self.advance_char();
            }
            let word = self.slice_from(start);
            return match grammar::word_operator(word) {
                Some(kind) => Ok(Some(kind)),
                None => Err(LexerError::new(format!("Unknown operator '-{}'", word), line, col)),
            };
        }

        if ch == '.' && next == Some('.') {
            self.advance_char();
            self.advance_char();
            if self.current_char() == Some('.') {
                self.advance_char();
                return Ok(Some(Ellipsis));
            }
            return Ok(Some(DotDot));
        }

        let kind = match (ch, next) {
            ('+', Some('=')) => PlusAssign,
            ('+', Some('+')) => PlusPlus,
            ('-', Some('=')) => MinusAssign,
            ('-', Some('-')) => MinusMinus,
            ('*', Some('=')) => StarAssign,
            ('*', Some('*')) => StarStar,
            ('/', Some('=')) => SlashAssign,
            ('%', Some('=')) => PercentAssign,
            ('^', Some('=')) => CaretAssign,
            ('^', Some('^')) => CaretCaret,
            ('&', Some('=')) => AmpAssign,
            ('&', Some('&')) => AndAnd,
            ('|', Some('=')) => PipeAssign,
            ('|', Some('|')) => OrOr,
            ('<', Some('<')) => ShiftLeft,
            ('>', Some('>')) => ShiftRight,
            ('?', Some('?')) => NullCoalesce,
            ('?', Some('.')) => SafeDot,
            (':', Some(':')) => DoubleColon,
            ('=', Some('>')) => Arrow,
            _ => return Ok(None),
        };
        self.advance_char();
        self.advance_char();
        Ok(Some(kind))
    }

    fn match_single_char_token(&self, ch: char) -> Option<TokenKind> {
        use TokenKind::*;
        Some(match ch {
            '+' => Plus,
            '-' => Minus,
            '*' => Star,
            '/' => Slash,
            '%' => Percent,
            '^' => Caret,
            '&' => Ampersand,
            '|' => Pipe,
            '~' => Tilde,
            '!' => Bang,
            '=' => Assign,
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            '{' => LBrace,
            '}' => RBrace,
            '.' => Dot,
            ',' => Comma,
            ':' => Colon,
            ';' => Semicolon,
            '@' => At,
            '?' => Question,
            '<' => Lt,
            '>' => Gt,
            _ => return None,
        })
    }
}

fn unescape(ch: char) -> Option<char> {
    Some(match ch {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'b' => '\u{0008}',
        'f' => '\u{000C}',
        'v' => '\u{000B}',
        '0' => '\0',
        '\\' => '\\',
        '"' => '"',
        '\'' => '\'',
        '`' => '`',
        '$' => '$',
        _ => return None,
    })
}

fn is_identifier_start(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphabetic()
}
fn is_identifier_part(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphanumeric()
}
fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n' | '\u{FEFF}')
}

/// Convenience wrapper: tokens plus any recorded errors.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<LexerError>) {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize();
    (tokens, lexer.into_errors())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, errors) = tokenize(src);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn dot_needs_a_digit_to_join_a_number() {
        use TokenKind::*;
        assert_eq!(kinds("1..5"), vec![Number, DotDot, Number, Eof]);
        assert_eq!(kinds("1.5"), vec![Number, Eof]);
        assert_eq!(kinds("$a.b"), vec![Variable, Dot, Identifier, Eof]);
    }

    #[test]
    fn offsets_and_columns_track_source() {
        let (tokens, _) = tokenize("$x =\n  42;");
        assert_eq!((tokens[0].line, tokens[0].column, tokens[0].offset), (1, 1, 0));
        assert_eq!((tokens[2].line, tokens[2].column, tokens[2].offset), (2, 3, 7));
        assert_eq!(tokens[2].lexeme, "42");
    }

    #[test]
    fn nested_block_comments_are_skipped() {
        assert_eq!(kinds("<# outer <# inner #> still #> 1"), vec![TokenKind::Number, TokenKind::Eof]);
    }

    #[test]
    fn unknown_escape_keeps_backslash() {
        let (tokens, _) = tokenize(r#""a\qb""#);
        assert_eq!(tokens[0].literal, Some(Literal::Str("a\\qb".into())));
    }
}
