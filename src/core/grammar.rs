//! Static keyword, operator and precedence tables shared by the lexer and parser.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::core::token::TokenKind;

/// Case-insensitive keyword table, keyed by lower-cased spelling.
pub static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    HashMap::from([
        ("class", Class),
        ("function", Function),
        ("return", Return),
        ("if", If),
        ("else", Else),
        ("elseif", ElseIf),
        ("for", For),
        ("while", While),
        ("do", Do),
        ("foreach", Foreach),
        ("in", In),
        ("switch", Switch),
        ("case", Case),
        ("default", Default),
        ("break", Break),
        ("continue", Continue),
        ("namespace", Namespace),
        ("using", Using),
        ("event", Event),
        ("const", Const),
        ("new", New),
        ("this", This),
        ("null", Null),
        ("true", True),
        ("false", False),
        ("try", Try),
        ("catch", Catch),
        ("finally", Finally),
        ("throw", Throw),
        ("import", Import),
        ("export", Export),
        ("from", From),
        ("as", As),
        ("is", Is),
        ("instanceof", InstanceOf),
        ("typeof", TypeOf),
        ("async", Async),
        ("await", Await),
    ])
});

/// Identifiers reclassified while the lexer is inside `[...]`.
pub static TYPE_KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    HashMap::from([
        ("int", IntType),
        ("double", DoubleType),
        ("string", StringType),
        ("bool", BoolType),
        ("array", ArrayType),
        ("void", VoidType),
        ("object", ObjectType),
        ("datetime", DateTimeType),
        ("hashtable", HashtableType),
        ("list", ListType),
        ("dictionary", DictionaryType),
    ])
});

/// `-word` operators, keyed by the word without its leading hyphen.
pub static WORD_OPERATORS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    HashMap::from([
        ("eq", Eq),
        ("ne", Ne),
        ("gt", Gt),
        ("lt", Lt),
        ("ge", Ge),
        ("le", Le),
        ("like", Like),
        ("notlike", NotLike),
        ("match", Match),
        ("notmatch", NotMatch),
        ("contains", Contains),
        ("notcontains", NotContains),
        ("in", InOp),
        ("notin", NotIn),
        ("is", IsOp),
        ("isnot", IsNot),
        ("replace", Replace),
        ("and", And),
        ("or", Or),
        ("not", Not),
        ("band", BAnd),
        ("bor", BOr),
        ("bxor", BXor),
    ])
});

pub fn keyword(word: &str) -> Option<TokenKind> {
    KEYWORDS.get(word.to_ascii_lowercase().as_str()).copied()
}

pub fn type_keyword(word: &str) -> Option<TokenKind> {
    TYPE_KEYWORDS.get(word.to_ascii_lowercase().as_str()).copied()
}

pub fn word_operator(word: &str) -> Option<TokenKind> {
    WORD_OPERATORS.get(word.to_ascii_lowercase().as_str()).copied()
}

/// Canonical spelling of a keyword or type keyword.
pub fn keyword_text(kind: TokenKind) -> Option<&'static str> {
    KEYWORDS
        .iter()
        .chain(TYPE_KEYWORDS.iter())
        .find(|(_, k)| **k == kind)
        .map(|(text, _)| *text)
}

/// Binding power, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment,
    Ternary,
    NullCoalesce,
    LogicalOr,
    LogicalAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseAnd,
    Equality,
    Relational,
    Shift,
    Range,
    Additive,
    Multiplicative,
    Power,
    Unary,
    Postfix,
    Call,
    Primary,
}

impl Precedence {
    /// One level tighter; used to make binary operators left-associative.
    pub fn next(self) -> Self {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Ternary,
            Ternary => NullCoalesce,
            NullCoalesce => LogicalOr,
            LogicalOr => LogicalAnd,
            LogicalAnd => BitwiseOr,
            BitwiseOr => BitwiseXor,
            BitwiseXor => BitwiseAnd,
            BitwiseAnd => Equality,
            Equality => Relational,
            Relational => Shift,
            Shift => Range,
            Range => Additive,
            Additive => Multiplicative,
            Multiplicative => Power,
            Power => Unary,
            Unary => Postfix,
            Postfix => Call,
            Call | Primary => Primary,
        }
    }
}

/// Infix/postfix binding power of a token; `Precedence::None` means it cannot continue an expression.
pub fn precedence_of(kind: TokenKind) -> Precedence {
    use TokenKind::*;
    match kind {
        k if k.is_assignment() => Precedence::Assignment,
        Question => Precedence::Ternary,
        NullCoalesce => Precedence::NullCoalesce,
        Or | OrOr => Precedence::LogicalOr,
        And | AndAnd => Precedence::LogicalAnd,
        Pipe | BOr => Precedence::BitwiseOr,
        CaretCaret | BXor => Precedence::BitwiseXor,
        Ampersand | BAnd => Precedence::BitwiseAnd,
        Eq | Ne | Like | NotLike | Match | NotMatch | Contains | NotContains | InOp | NotIn | IsOp
        | IsNot | Replace => Precedence::Equality,
        Gt | Lt | Ge | Le => Precedence::Relational,
        ShiftLeft | ShiftRight => Precedence::Shift,
        DotDot | Ellipsis => Precedence::Range,
        Plus | Minus => Precedence::Additive,
        Star | Slash | Percent => Precedence::Multiplicative,
        Caret | StarStar => Precedence::Power,
        PlusPlus | MinusMinus => Precedence::Postfix,
        LParen | LBracket | Dot | SafeDot | DoubleColon => Precedence::Call,
        _ => Precedence::None,
    }
}

/// Tokens that begin a statement; the parser resynchronizes on these.
pub fn starts_statement(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(
        kind,
        If | For
            | While
            | Do
            | Foreach
            | Switch
            | Return
            | Break
            | Continue
            | Try
            | Throw
            | Function
            | Class
            | Namespace
            | Using
            | Const
            | LBrace
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        assert_eq!(keyword("FOREACH"), Some(TokenKind::Foreach));
        assert_eq!(keyword("ElseIf"), Some(TokenKind::ElseIf));
        assert_eq!(type_keyword("HashTable"), Some(TokenKind::HashtableType));
        assert_eq!(word_operator("NotContains"), Some(TokenKind::NotContains));
        assert_eq!(keyword("whilst"), None);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert!(precedence_of(TokenKind::Star) > precedence_of(TokenKind::Plus));
        assert!(precedence_of(TokenKind::Plus) > precedence_of(TokenKind::Gt));
        assert!(precedence_of(TokenKind::Gt) > precedence_of(TokenKind::Eq));
        assert!(precedence_of(TokenKind::Eq) > precedence_of(TokenKind::And));
        assert!(precedence_of(TokenKind::And) > precedence_of(TokenKind::Or));
        assert_eq!(precedence_of(TokenKind::Semicolon), Precedence::None);
    }

    #[test]
    fn keyword_text_round_trips() {
        assert_eq!(keyword_text(TokenKind::Foreach), Some("foreach"));
        assert_eq!(keyword_text(TokenKind::IntType), Some("int"));
        assert_eq!(keyword_text(TokenKind::Plus), None);
    }
}
