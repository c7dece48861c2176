//! Unit tests for the built-in line engine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use console_host::engine::basic::{BasicEngine, ENGINE_NAME};
use console_host::engine::{Engine, ExecContext, OutputSink, Scope, ScriptError};
use console_host::AppError;

#[derive(Default)]
struct Captured {
    out: Mutex<Vec<String>>,
    err: Mutex<Vec<String>>,
}

impl OutputSink for Captured {
    fn out_line(&self, line: &str) {
        self.out.lock().unwrap().push(line.to_owned());
    }

    fn err_line(&self, line: &str) {
        self.err.lock().unwrap().push(line.to_owned());
    }
}

fn run(source: &str, scope: &mut Scope) -> (Result<serde_json::Value, ScriptError>, Arc<Captured>) {
    let engine = BasicEngine::new();
    let unit = engine.compile(source).expect("compile");
    let captured = Arc::new(Captured::default());
    let ctx = ExecContext::new(CancellationToken::new(), captured.clone());
    (engine.execute(&unit, scope, &ctx), captured)
}

#[test]
fn compiled_unit_records_engine_and_source() {
    let unit = BasicEngine::new().compile("print hi").expect("compile");
    assert_eq!(unit.engine, ENGINE_NAME);
    assert_eq!(unit.source, "print hi");
}

#[test]
fn invalid_statement_is_a_compile_error() {
    let err = BasicEngine::new().compile("print ok\nlet = 3").unwrap_err();
    assert!(matches!(err, AppError::Compile(ref msg) if msg.starts_with("line 2")), "{err}");
}

#[test]
fn comments_and_blank_lines_are_ignored() {
    let mut scope = Scope::new();
    let (result, captured) = run("# note\n\nprint a\n", &mut scope);
    assert_eq!(result, Ok(serde_json::Value::Null));
    assert_eq!(*captured.out.lock().unwrap(), vec!["a"]);
}

#[test]
fn print_and_eprint_reach_their_streams() {
    let mut scope = Scope::new();
    let (_, captured) = run("print to out\neprint to err", &mut scope);
    assert_eq!(*captured.out.lock().unwrap(), vec!["to out"]);
    assert_eq!(*captured.err.lock().unwrap(), vec!["to err"]);
}

#[test]
fn let_binds_and_last_expression_is_result() {
    let mut scope = Scope::new();
    let (result, captured) = run("let x = {\"a\": 1}\nprint got $x\n$x", &mut scope);
    assert_eq!(result, Ok(json!({"a": 1})));
    assert_eq!(*captured.out.lock().unwrap(), vec!["got {\"a\":1}"]);
    assert_eq!(scope.get("x"), Some(&json!({"a": 1})));
}

#[test]
fn literal_expression_is_result() {
    let mut scope = Scope::new();
    let (result, _) = run("42", &mut scope);
    assert_eq!(result, Ok(json!(42)));
}

#[test]
fn repeat_prints_numbered_lines() {
    let mut scope = Scope::new();
    let (_, captured) = run("repeat 3 row", &mut scope);
    assert_eq!(*captured.out.lock().unwrap(), vec!["row 1", "row 2", "row 3"]);
}

#[test]
fn undefined_name_fails() {
    let mut scope = Scope::new();
    let (result, _) = run("missing", &mut scope);
    assert_eq!(
        result,
        Err(ScriptError::Failed("name 'missing' is not defined".into()))
    );
}

#[test]
fn fail_and_exit_are_distinct_failures() {
    let mut scope = Scope::new();
    assert_eq!(
        run("fail boom", &mut scope).0,
        Err(ScriptError::Failed("boom".into()))
    );
    assert_eq!(run("exit 7", &mut scope).0, Err(ScriptError::Exit(7)));
    assert_eq!(run("exit", &mut scope).0, Err(ScriptError::Exit(0)));
}

#[test]
fn cancelled_context_interrupts_spin() {
    let engine = BasicEngine::new();
    let unit = engine.compile("spin").expect("compile");
    let token = CancellationToken::new();
    let ctx = ExecContext::new(token.clone(), Arc::new(Captured::default()));

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        token.cancel();
    });
    let result = engine.execute(&unit, &mut Scope::new(), &ctx);
    canceller.join().unwrap();
    assert_eq!(result, Err(ScriptError::Interrupted));
}

#[test]
fn sleep_wakes_early_on_cancel() {
    let engine = BasicEngine::new();
    let unit = engine.compile("sleep 60000").expect("compile");
    let token = CancellationToken::new();
    token.cancel();
    let ctx = ExecContext::new(token, Arc::new(Captured::default()));
    assert_eq!(
        engine.execute(&unit, &mut Scope::new(), &ctx),
        Err(ScriptError::Interrupted)
    );
}

#[test]
fn member_names_filter_by_prefix() {
    let engine = BasicEngine::new();
    let mut scope = Scope::new();
    scope.set("foo", json!(1));
    scope.set("food", json!(2));
    scope.set("bar", json!(3));
    assert_eq!(engine.member_names(&scope, "fo"), vec!["foo", "food"]);
    assert_eq!(engine.member_names(&scope, "$b"), vec!["bar"]);
    assert_eq!(engine.member_names(&scope, "").len(), 3);
}

#[test]
fn format_failure_renders_traceback() {
    let text = BasicEngine::new().format_failure("boom");
    assert!(text.starts_with("Traceback"));
    assert!(text.ends_with("ScriptError: boom"));
}
