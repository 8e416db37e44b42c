// src/core/token.rs
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Identifiers and literals
    Identifier,
    Variable, // $name, literal carries the bare name
    Number,
    Str,

    // Keywords
    Class,
    Function,
    Return,
    If,
    Else,
    ElseIf,
    For,
    While,
    Do,
    Foreach,
    In,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Namespace,
    Using,
    Event,
    Const,
    New,
    This,
    Null,
    True,
    False,
    Try,
    Catch,
    Finally,
    Throw,
    Import,
    Export,
    From,
    As,
    Is,
    InstanceOf,
    TypeOf,
    Async,
    Await,

    // Type keywords (only inside `[...]`)
    IntType,
    DoubleType,
    StringType,
    BoolType,
    ArrayType,
    VoidType,
    ObjectType,
    DateTimeType,
    HashtableType,
    ListType,
    DictionaryType,

    // Word operators
    Eq,       // -eq
    Ne,       // -ne
    Gt,       // -gt, >
    Lt,       // -lt, <
    Ge,       // -ge
    Le,       // -le
    Like,     // -like
    NotLike,  // -notlike
    Match,    // -match
    NotMatch, // -notmatch
    Contains,
    NotContains,
    InOp,  // -in
    NotIn, // -notin
    IsOp,  // -is
    IsNot, // -isnot
    Replace,
    And,  // -and
    Or,   // -or
    Not,  // -not
    BAnd, // -band
    BOr,  // -bor
    BXor, // -bxor

    // Single-character operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Ampersand,
    Pipe,
    Tilde,
    Bang,
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Colon,
    Semicolon,
    At,
    Question,

    // Multi-character operators
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    CaretAssign,
    AmpAssign,
    PipeAssign,
    PlusPlus,
    MinusMinus,
    AndAnd,
    OrOr,
    CaretCaret,
    ShiftLeft,
    ShiftRight,
    NullCoalesce, // ??
    SafeDot,      // ?.
    DoubleColon,  // ::
    Arrow,        // =>
    Ellipsis,     // ...
    DotDot,       // ..
    StarStar,     // **

    Eof,
}

impl TokenKind {
    pub fn is_type_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            IntType
                | DoubleType
                | StringType
                | BoolType
                | ArrayType
                | VoidType
                | ObjectType
                | DateTimeType
                | HashtableType
                | ListType
                | DictionaryType
        )
    }

    pub fn is_keyword(self) -> bool {
        crate::core::grammar::KEYWORDS.values().any(|k| *k == self)
    }

    pub fn is_assignment(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Assign
                | PlusAssign
                | MinusAssign
                | StarAssign
                | SlashAssign
                | PercentAssign
                | CaretAssign
                | AmpAssign
                | PipeAssign
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        let s = match self {
            Identifier => "Identifier",
            Variable => "Variable",
            Number => "Number",
            Str => "String",
            Eof => "EOF",
            Eq => "-eq",
            Ne => "-ne",
            Gt => "-gt",
            Lt => "-lt",
            Ge => "-ge",
            Le => "-le",
            Like => "-like",
            NotLike => "-notlike",
            Match => "-match",
            NotMatch => "-notmatch",
            Contains => "-contains",
            NotContains => "-notcontains",
            InOp => "-in",
            NotIn => "-notin",
            IsOp => "-is",
            IsNot => "-isnot",
            Replace => "-replace",
            And => "-and",
            Or => "-or",
            Not => "-not",
            BAnd => "-band",
            BOr => "-bor",
            BXor => "-bxor",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Caret => "^",
            Ampersand => "&",
            Pipe => "|",
            Tilde => "~",
            Bang => "!",
            Assign => "=",
            LParen => "(",
            RParen => ")",
            LBracket => "[",
            RBracket => "]",
            LBrace => "{",
            RBrace => "}",
            Dot => ".",
            Comma => ",",
            Colon => ":",
            Semicolon => ";",
            At => "@",
            Question => "?",
            PlusAssign => "+=",
            MinusAssign => "-=",
            StarAssign => "*=",
            SlashAssign => "/=",
            PercentAssign => "%=",
            CaretAssign => "^=",
            AmpAssign => "&=",
            PipeAssign => "|=",
            PlusPlus => "++",
            MinusMinus => "--",
            AndAnd => "&&",
            OrOr => "||",
            CaretCaret => "^^",
            ShiftLeft => "<<",
            ShiftRight => ">>",
            NullCoalesce => "??",
            SafeDot => "?.",
            DoubleColon => "::",
            Arrow => "=>",
            Ellipsis => "...",
            DotDot => "..",
            StarStar => "**",
            keyword => {
                return match crate::core::grammar::keyword_text(*keyword) {
                    Some(text) => write!(f, "{}", text),
                    None => write!(f, "{:?}", keyword),
                }
            }
        };
        write!(f, "{}", s)
    }
}

/// Decoded payload of a literal-bearing token.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            literal: None,
            line,
            column,
            offset: 0,
        }
    }

    pub fn eof(line: usize, column: usize, offset: usize) -> Self {
        Self {
            offset,
            ..Self::new(TokenKind::Eof, "", line, column)
        }
    }

    pub fn with_literal(mut self, literal: Literal) -> Self {
        self.literal = Some(literal);
        self
    }

    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Copy of this token with a different kind. The original is untouched.
    pub fn with_kind(&self, kind: TokenKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Copy of this token with a different lexeme.
    pub fn with_lexeme(&self, lexeme: impl Into<String>) -> Self {
        Self {
            lexeme: lexeme.into(),
            ..self.clone()
        }
    }

    /// Bare variable name for `Variable` tokens, lexeme otherwise.
    pub fn name(&self) -> &str {
        match &self.literal {
            Some(Literal::Ident(name)) => name,
            _ => &self.lexeme,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.literal {
            Some(Literal::Str(s)) => write!(f, "{}({:?}) @{}:{}", self.kind, s, self.line, self.column),
            Some(Literal::Int(n)) => write!(f, "{}({}) @{}:{}", self.kind, n, self.line, self.column),
            Some(Literal::Float(n)) => write!(f, "{}({:?}) @{}:{}", self.kind, n, self.line, self.column),
            Some(Literal::Ident(n)) => write!(f, "{}('{}') @{}:{}", self.kind, n, self.line, self.column),
            None if self.kind == TokenKind::Identifier => {
                write!(f, "Identifier('{}') @{}:{}", self.lexeme, self.line, self.column)
            }
            None => write!(f, "{} @{}:{}", self.kind, self.line, self.column),
        }
    }
}
