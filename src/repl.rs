//! Interactive read-eval-print loop for both engines.
//!
//! State persists across lines so definitions survive: the compiler engine
//! keeps one symbol table, one constant pool, and one globals array alive
//! for the whole session; the interpreter engine keeps one environment.
//!
//! Parse errors are printed indented and the loop continues; compile and
//! runtime errors print as `<ErrorName>: <message>`. Results print in their
//! `inspect` form unless they are the `Empty` or `Break` sentinels.
//! Ctrl-C and ctrl-D both end the session.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::compiler::Compiler;
use crate::environment::Environment;
use crate::evaluator::eval_program;
use crate::lexer::lex;
use crate::parser::parse_tokens;
use crate::value::Value;
use crate::vm::{Vm, GLOBALS_SIZE};
use crate::{Engine, MonkeyError};

const PROMPT: &str = ">> ";

/// Run the REPL until EOF or interrupt.
pub fn start(engine: Engine) -> Result<(), MonkeyError> {
    println!("This is the Monkey programming language ({engine} engine).");
    match engine {
        Engine::Interpreter => run_interpreter(),
        Engine::Compiler => run_compiler(),
    }
}

fn read_line(editor: &mut DefaultEditor) -> Result<Option<String>, MonkeyError> {
    match editor.readline(PROMPT) {
        Ok(line) => {
            let _ = editor.add_history_entry(line.as_str());
            Ok(Some(line))
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(err) => Err(MonkeyError::Readline(err)),
    }
}

/// Lex and parse one line. Diagnostics are printed indented; `None` means
/// the line did not parse.
fn parse_line(line: &str) -> Option<crate::ast::Program> {
    let (tokens, lex_errors) = lex(line);
    if !lex_errors.is_empty() {
        for err in &lex_errors {
            println!("\t{err}");
        }
        return None;
    }
    let (program, parse_errors) = parse_tokens(tokens);
    if !parse_errors.is_empty() {
        for err in &parse_errors {
            println!("\t{err}");
        }
        return None;
    }
    Some(program)
}

fn print_result(value: &Value) {
    match value {
        Value::Empty | Value::Break => {}
        other => println!("{other}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engines
// ─────────────────────────────────────────────────────────────────────────────

fn run_compiler() -> Result<(), MonkeyError> {
    let mut editor = DefaultEditor::new()?;
    // One symbol table (builtins included), constant pool and globals array
    // for the whole session.
    let (symbol_table, constants) = Compiler::new().state();
    let mut globals = vec![Value::null(); GLOBALS_SIZE];

    while let Some(line) = read_line(&mut editor)? {
        let Some(program) = parse_line(&line) else {
            continue;
        };

        let mut compiler = Compiler::with_state(symbol_table.clone(), constants.clone());
        if let Err(err) = compiler.compile(&program) {
            println!("CompileError: {err}");
            continue;
        }

        let mut vm = Vm::with_globals(compiler.bytecode(), std::mem::take(&mut globals));
        let run_result = vm.run();
        let last_popped = vm.last_popped_stack_element();
        globals = vm.into_globals();

        match run_result {
            Ok(()) => print_result(&last_popped),
            Err(err) => println!("RuntimeError: {err}"),
        }
    }
    Ok(())
}

fn run_interpreter() -> Result<(), MonkeyError> {
    let mut editor = DefaultEditor::new()?;
    let env = Environment::new();

    while let Some(line) = read_line(&mut editor)? {
        let Some(program) = parse_line(&line) else {
            continue;
        };
        let result = eval_program(&program, &env);
        match &*result {
            Value::Error(message) => println!("RuntimeError: {message}"),
            other => print_result(other),
        }
    }
    Ok(())
}
