use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn bin() -> String {
    // Cargo sets this for bin targets in integration tests
    env!("CARGO_BIN_EXE_powerlang").to_string()
}

fn run_script(dir: &Path, src: &str, args: &[&str]) -> Output {
    let input = dir.join("script.pow");
    fs::write(&input, src).unwrap();
    // keep a developer's ~/.powerlang/config.toml out of the way
    let config = dir.join("config.toml");
    fs::write(&config, "").unwrap();
    Command::new(bin())
        .arg("--config")
        .arg(&config)
        .args(args)
        .arg(&input)
        .output()
        .expect("run")
}

fn stdout(o: &Output) -> String {
    String::from_utf8_lossy(&o.stdout).into_owned()
}

fn stderr(o: &Output) -> String {
    String::from_utf8_lossy(&o.stderr).into_owned()
}

#[test]
fn prints_non_null_result() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), "function add($a, $b) { return $a + $b; } add(1, 2);", &[]);
    assert!(output.status.success(), "stderr:\n{}", stderr(&output));
    assert_eq!(stdout(&output), "3\n");
}

#[test]
fn containers_print_as_json_and_strings_bare() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), "print(\"hello\"); @{ b = @(1, 2); a = \"x\" };", &["run"]);
    assert!(output.status.success(), "stderr:\n{}", stderr(&output));
    assert_eq!(stdout(&output), "hello\n{\"a\":\"x\",\"b\":[1,2]}\n");
}

#[test]
fn null_result_prints_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), "$x = null;", &[]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "");
}

#[test]
fn missing_file_argument_prints_usage() {
    let output = Command::new(bin()).output().expect("run");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Usage: powerlang <file.pow>"));
}

#[test]
fn runtime_error_exits_nonzero_with_kind_and_position() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), "$a = 1;\n$a / 0;", &[]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("DivisionByZeroError: Division by zero"), "{}", err);
    assert!(err.contains("script.pow:2:"), "{}", err);
}

#[test]
fn every_parse_error_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), "$a = ;\n$b = 1 + ;\n", &[]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert_eq!(err.lines().filter(|l| l.starts_with("ParseError:")).count(), 2, "{}", err);
    assert!(err.contains("2 error(s): 2 ParseError"), "{}", err);
}

#[test]
fn pretty_errors_show_the_source_line() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_script(dir.path(), "$s = \"open;", &["--pretty-errors"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("LexerError: Unterminated string"), "{}", err);
    assert!(err.contains("$s = \"open;"), "{}", err);
}

#[test]
fn short_circuit_flag_changes_logic() {
    let dir = tempfile::tempdir().unwrap();
    let src = "$n = 0; function f() { $n++; return true; } $r = false -and f(); ($n);";
    assert_eq!(stdout(&run_script(dir.path(), src, &[])), "1\n");
    assert_eq!(stdout(&run_script(dir.path(), src, &["--short-circuit"])), "0\n");
}

#[test]
fn config_file_sets_scope_mode() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("shadow.toml");
    fs::write(&config, "scope = \"shadow\"\n").unwrap();
    let input = dir.path().join("s.pow");
    fs::write(&input, "$x = 1; if (true) { $x = 2; } ($x);").unwrap();
    let output = Command::new(bin()).arg("--config").arg(&config).arg(&input).output().expect("run");
    assert_eq!(stdout(&output), "1\n");
}

#[test]
fn tokens_and_ast_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = run_script(dir.path(), "$x = 1;", &["tokens"]);
    assert!(tokens.status.success());
    assert!(stdout(&tokens).starts_with("Variable('x') @1:1\n"));

    let ast = run_script(dir.path(), "$x = 1;", &["ast"]);
    assert!(ast.status.success());
    assert!(stdout(&ast).contains("VarDecl"));
}
