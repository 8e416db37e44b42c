use powerlang::core::ast::{ExprKind, Program, StmtKind};
use powerlang::core::lexer::tokenize;
use powerlang::core::parser::{parse_program, Parser, ParserError};
use powerlang::core::token::TokenKind;

fn parse(src: &str) -> Result<Program, Vec<ParserError>> {
    let (tokens, lex_errors) = tokenize(src);
    assert!(lex_errors.is_empty(), "lexer errors: {lex_errors:?}");
    parse_program(tokens)
}

fn parse_ok(src: &str) -> Program {
    parse(src).unwrap_or_else(|e| panic!("parse errors: {e:?}"))
}

#[test]
fn declarations_are_hoisted_out_of_the_statement_list() {
    let p = parse_ok("$a = 1; function f() { } class C { } f();");
    assert_eq!(p.functions.len(), 1);
    assert_eq!(p.classes.len(), 1);
    assert_eq!(p.statements.len(), 2);
}

#[test]
fn variable_statement_disambiguation() {
    let p = parse_ok("$x = 1; $y; $obj.field = 2; $list[0] = 3; $f(1); $n += 1;");
    let kinds: Vec<bool> = p
        .statements
        .iter()
        .map(|s| matches!(s.kind, StmtKind::VarDecl { .. }))
        .collect();
    assert_eq!(kinds, vec![true, true, false, false, false, false]);
}

#[test]
fn typed_declaration_keeps_its_annotation() {
    let p = parse_ok("[string[]]$names = @();");
    match &p.statements[0].kind {
        StmtKind::VarDecl { name, type_annotation: Some(t), .. } => {
            assert_eq!(name, "names");
            assert_eq!(t.name, "string");
            assert!(t.is_array);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn cast_in_expression_position() {
    let p = parse_ok("[int]\"42\" + 1;");
    let StmtKind::Expression(e) = &p.statements[0].kind else {
        panic!("expected expression");
    };
    let ExprKind::Binary { left, .. } = &e.kind else {
        panic!("expected binary");
    };
    assert!(matches!(left.kind, ExprKind::Cast { .. }));
}

#[test]
fn class_members_and_bases() {
    let p = parse_ok("class Dog : Animal, IPet { [string]$name; Dog($n) { } function bark() { } }");
    let class = &p.classes[0];
    assert_eq!(class.base.as_deref(), Some("Animal"));
    assert_eq!(class.interfaces, vec!["IPet".to_string()]);
    assert_eq!(class.fields.len(), 1);
    let names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Dog", "bark"]);
}

#[test]
fn assignment_is_right_associative() {
    let p = parse_ok("$a.x = $b.y = 3;");
    let StmtKind::Expression(e) = &p.statements[0].kind else {
        panic!("expected expression");
    };
    let ExprKind::Assign { op, value, .. } = &e.kind else {
        panic!("expected assignment");
    };
    assert_eq!(*op, TokenKind::Assign);
    assert!(matches!(value.kind, ExprKind::Assign { .. }));
}

#[test]
fn invalid_assignment_target_is_reported() {
    let errors = parse("1 + 2 = 3;").unwrap_err();
    assert_eq!(errors[0].message, "Invalid assignment target");
}

#[test]
fn errors_accumulate_and_parsing_continues() {
    let (tokens, _) = tokenize("$a = ;\n$b = 1 + ;\n$ok = 1;");
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    let lines: Vec<usize> = parser.errors().iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![1, 2]);
    assert!(program
        .statements
        .iter()
        .any(|s| matches!(&s.kind, StmtKind::VarDecl { name, .. } if name == "ok")));
}

#[test]
fn unmatched_brace_is_reported_at_eof() {
    let errors = parse("function f() { $x = 1;").unwrap_err();
    assert!(errors.iter().any(|e| e.message == "Unmatched '{'"));
}

#[test]
fn switch_accepts_colon_and_brace_bodies() {
    let p = parse_ok("switch ($x) { case 1, 2: 'low'; case 3 { 'three'; } default: 'other'; }");
    let StmtKind::Switch { cases, default, .. } = &p.statements[0].kind else {
        panic!("expected switch");
    };
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].values.len(), 2);
    assert!(default.is_some());
}

#[test]
fn catch_clause_forms() {
    for src in [
        "try { } catch { }",
        "try { } catch ($e) { }",
        "try { } catch ([Exception] $e) { }",
        "try { } catch (Exception $e) { } finally { }",
        "try { } finally { }",
    ] {
        parse_ok(src);
    }
    assert!(parse("try { }").is_err());
}

#[test]
fn lambdas_and_async() {
    let p = parse_ok("$f = function ($x) { return $x; }; $g = async ($y) => $y * 2; async function h() { }");
    assert!(p.functions[0].is_async);
    match &p.statements[1].kind {
        StmtKind::VarDecl { value: Some(v), .. } => {
            assert!(matches!(v.kind, ExprKind::Lambda { is_async: true, .. }))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn switch_rejects_a_second_default() {
    let errors = parse("switch ($x) { default: 1; case 2: 2; default: 3; }").unwrap_err();
    assert!(errors
        .iter()
        .any(|e| e.message == "Multiple default clauses in switch statement"));
}

#[test]
fn stray_closer_does_not_hide_a_later_unclosed_opener() {
    let errors = parse("} $x = 1;\nif (true) { $y = 2;").unwrap_err();
    assert!(errors.iter().any(|e| e.message == "Unmatched '{'"));
}
