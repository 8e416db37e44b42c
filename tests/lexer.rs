use powerlang::core::lexer::{tokenize, Lexer};
use powerlang::core::token::{Literal, TokenKind};

fn kinds(src: &str) -> Vec<TokenKind> {
    let (tokens, errors) = tokenize(src);
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    tokens.into_iter().map(|t| t.kind).collect()
}

#[test]
fn unterminated_string_is_one_error_and_still_ends_in_eof() {
    let (tokens, errors) = tokenize("$s = \"never closed;");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Unterminated string");
    assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
}

#[test]
fn errors_accumulate_across_the_file() {
    let mut lexer = Lexer::new("$x = 1 -bogus 2;\n$y = 0x;\n$z = 3;");
    let tokens = lexer.tokenize();
    let lines: Vec<usize> = lexer.errors().iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![1, 2]);
    assert!(tokens.iter().any(|t| t.kind == TokenKind::Variable && t.name() == "z"));
}

#[test]
fn word_operators_ignore_case() {
    use TokenKind::*;
    assert_eq!(kinds("$a -EQ $b -And $c"), vec![Variable, Eq, Variable, And, Variable, Eof]);
}

#[test]
fn type_names_are_keywords_only_inside_brackets() {
    use TokenKind::*;
    assert_eq!(kinds("[int]$x"), vec![LBracket, IntType, RBracket, Variable, Eof]);
    assert_eq!(kinds("int"), vec![Identifier, Eof]);
}

#[test]
fn variables_carry_their_bare_name() {
    let (tokens, _) = tokenize("$Total");
    assert_eq!(tokens[0].lexeme, "$Total");
    assert_eq!(tokens[0].literal, Some(Literal::Ident("Total".into())));
}

#[test]
fn numbers_decode_by_form() {
    let lits: Vec<Option<Literal>> = tokenize("42 1.5 0x1F 0b101 2.5e3")
        .0
        .into_iter()
        .map(|t| t.literal)
        .collect();
    assert_eq!(lits[0], Some(Literal::Int(42)));
    assert_eq!(lits[1], Some(Literal::Float(1.5)));
    assert_eq!(lits[2], Some(Literal::Int(31)));
    assert_eq!(lits[3], Some(Literal::Int(5)));
    assert_eq!(lits[4], Some(Literal::Float(2500.0)));
}

#[test]
fn exponent_needs_digits() {
    let (tokens, errors) = tokenize("$x = 1.5e;\n$y = 2.5e+;");
    let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["Invalid floating point exponent"; 2]);
    assert_eq!(errors[1].line, 2);
    assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
}

#[test]
fn unterminated_backtick_string_still_yields_a_token() {
    let (tokens, errors) = tokenize("$s = `raw text");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Unterminated string");
    let s = tokens.iter().find(|t| t.kind == TokenKind::Str).expect("string token");
    assert_eq!(s.literal, Some(Literal::Str("raw text".into())));
    assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
}

#[test]
fn relexing_lexemes_gives_the_same_kinds() {
    let src = r#"
        # comment
        function area([double]$w, $h = 2) { return $w * $h; }
        $m = @{ a = 1; b = @(1, 2, 3) };
        if ($m.a -ne 0 -and $m["b"] -contains 2) { $m.a += 1; } <# block #>
    "#;
    let (first, errors) = tokenize(src);
    assert!(errors.is_empty());
    let joined = first
        .iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.lexeme.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let again: Vec<TokenKind> = kinds(&joined);
    let original: Vec<TokenKind> = first.iter().map(|t| t.kind).collect();
    assert_eq!(again, original);
}
