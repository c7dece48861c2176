//! Minimal line-oriented script engine.
//!
//! Each non-empty source line is one statement:
//!
//! | Statement            | Effect                                           |
//! |----------------------|--------------------------------------------------|
//! | `print TEXT`         | write `TEXT` to stdout, `$name` is interpolated  |
//! | `eprint TEXT`        | write `TEXT` to stderr                           |
//! | `let NAME = JSON`    | bind a variable                                  |
//! | `repeat N TEXT`      | print `TEXT 1` .. `TEXT N`                       |
//! | `sleep MILLIS`       | sleep, interruptible                             |
//! | `spin`               | loop until interrupted                           |
//! | `hang`               | loop forever, ignoring interrupts                |
//! | `fail MESSAGE`       | raise a script failure                           |
//! | `exit [CODE]`        | ask the hosting process to exit                  |
//! | `NAME` / `$NAME`     | evaluate a variable                              |
//! | `JSON`               | evaluate a literal                               |
//!
//! The value of the last evaluated expression is the unit's result. Lines
//! starting with `#` are comments.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{CompiledUnit, Engine, ExecContext, Scope, ScriptError, Value};
use crate::{AppError, Result};

/// Name recorded in units compiled by [`BasicEngine`].
pub const ENGINE_NAME: &str = "basic";

/// Poll interval of `spin` and `hang`.
const LOOP_TICK: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Op {
    Print { text: String },
    Eprint { text: String },
    Let { name: String, value: Value },
    Repeat { count: u64, text: String },
    Sleep { millis: u64 },
    Spin,
    Hang,
    Fail { message: String },
    Exit { code: i32 },
    Var { name: String },
    Literal { value: Value },
}

/// The built-in engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicEngine;

impl BasicEngine {
    /// Create the engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Engine for BasicEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn compile(&self, source: &str) -> Result<CompiledUnit> {
        let mut ops = Vec::new();
        for (index, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let op = parse_statement(line)
                .map_err(|msg| AppError::Compile(format!("line {}: {msg}", index + 1)))?;
            ops.push(op);
        }

        Ok(CompiledUnit {
            engine: ENGINE_NAME.to_owned(),
            source: source.to_owned(),
            code: serde_json::to_value(ops)?,
        })
    }

    fn execute(
        &self,
        unit: &CompiledUnit,
        scope: &mut Scope,
        ctx: &ExecContext,
    ) -> std::result::Result<Value, ScriptError> {
        if unit.engine != ENGINE_NAME {
            return Err(ScriptError::Failed(format!(
                "unit compiled by engine '{}' cannot run on '{ENGINE_NAME}'",
                unit.engine
            )));
        }

        let ops: Vec<Op> = serde_json::from_value(unit.code.clone())
            .map_err(|err| ScriptError::Failed(format!("corrupt unit: {err}")))?;

        let mut result = Value::Null;
        for op in ops {
            ctx.checkpoint()?;
            match op {
                Op::Print { text } => ctx.print(&interpolate(&text, scope)),
                Op::Eprint { text } => ctx.eprint(&interpolate(&text, scope)),
                Op::Let { name, value } => scope.set(name, value),
                Op::Repeat { count, text } => {
                    let text = interpolate(&text, scope);
                    for i in 1..=count {
                        ctx.checkpoint()?;
                        ctx.print(&format!("{text} {i}"));
                    }
                }
                Op::Sleep { millis } => ctx.sleep(Duration::from_millis(millis))?,
                Op::Spin => loop {
                    ctx.checkpoint()?;
                    std::thread::sleep(LOOP_TICK);
                },
                Op::Hang => loop {
                    std::thread::sleep(LOOP_TICK);
                },
                Op::Fail { message } => {
                    return Err(ScriptError::Failed(interpolate(&message, scope)));
                }
                Op::Exit { code } => return Err(ScriptError::Exit(code)),
                Op::Var { name } => {
                    result = scope
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| ScriptError::Failed(format!("name '{name}' is not defined")))?;
                }
                Op::Literal { value } => result = value,
            }
        }

        Ok(result)
    }

    fn member_names(&self, scope: &Scope, expr: &str) -> Vec<String> {
        let prefix = expr.trim().trim_start_matches('$');
        scope
            .names()
            .filter(|name| name.starts_with(prefix))
            .map(str::to_owned)
            .collect()
    }

    fn format_failure(&self, message: &str) -> String {
        format!("Traceback (most recent call last):\n  File \"<console>\"\nScriptError: {message}")
    }
}

fn parse_statement(line: &str) -> std::result::Result<Op, String> {
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    match keyword {
        "print" => Ok(Op::Print {
            text: rest.to_owned(),
        }),
        "eprint" => Ok(Op::Eprint {
            text: rest.to_owned(),
        }),
        "let" => {
            let (name, value) = rest
                .split_once('=')
                .ok_or_else(|| "let: expected `let NAME = VALUE`".to_owned())?;
            let name = name.trim();
            if !is_identifier(name) {
                return Err(format!("let: invalid name '{name}'"));
            }
            let value = serde_json::from_str(value.trim())
                .map_err(|err| format!("let: value must be JSON: {err}"))?;
            Ok(Op::Let {
                name: name.to_owned(),
                value,
            })
        }
        "repeat" => {
            let (count, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let count = count
                .parse::<u64>()
                .map_err(|err| format!("repeat: invalid count '{count}': {err}"))?;
            Ok(Op::Repeat {
                count,
                text: text.trim().to_owned(),
            })
        }
        "sleep" => {
            let millis = rest
                .parse::<u64>()
                .map_err(|err| format!("sleep: invalid duration '{rest}': {err}"))?;
            Ok(Op::Sleep { millis })
        }
        "spin" => Ok(Op::Spin),
        "hang" => Ok(Op::Hang),
        "fail" => Ok(Op::Fail {
            message: if rest.is_empty() {
                "failure".to_owned()
            } else {
                rest.to_owned()
            },
        }),
        "exit" => {
            let code = if rest.is_empty() {
                0
            } else {
                rest.parse::<i32>()
                    .map_err(|err| format!("exit: invalid code '{rest}': {err}"))?
            };
            Ok(Op::Exit { code })
        }
        _ => parse_expression(line),
    }
}

fn parse_expression(line: &str) -> std::result::Result<Op, String> {
    if let Some(name) = line.strip_prefix('$') {
        if is_identifier(name) {
            return Ok(Op::Var {
                name: name.to_owned(),
            });
        }
    }
    if let Ok(value) = serde_json::from_str::<Value>(line) {
        return Ok(Op::Literal { value });
    }
    if is_identifier(line) {
        return Ok(Op::Var {
            name: line.to_owned(),
        });
    }
    Err(format!("unrecognised statement '{line}'"))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replace `$name` references with the variable's display form.
fn interpolate(text: &str, scope: &Scope) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = after
            .char_indices()
            .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '_'))
            .map_or(after.len(), |(i, _)| i);
        let name = &after[..len];
        match scope.get(name) {
            Some(Value::String(s)) if !name.is_empty() => out.push_str(s),
            Some(value) if !name.is_empty() => out.push_str(&value.to_string()),
            _ => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}
