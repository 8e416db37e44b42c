//! Snapshot tests for the token dump and diagnostic rendering.

use powerlang::commands::tokens::dump;
use powerlang::core::diagnostics::{render_error, Span};
use powerlang::core::lexer::tokenize;

#[test]
fn token_dump() {
    let (tokens, errors) = tokenize(r#"if ($x -gt 2) { $y = "hi"; }"#);
    assert!(errors.is_empty());
    insta::assert_snapshot!("token_dump", dump(&tokens));
}

#[test]
fn name_error_rendering() {
    let out = render_error(
        "demo.pow",
        "$x = 1;\n$y = $z + 1;",
        "NameError: Undefined variable 'z'",
        Span::single(2, 6),
    );
    insta::assert_snapshot!("name_error_rendering", out);
}
