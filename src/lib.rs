//! The Monkey language: a shared front end with two execution engines.
//!
//! This crate provides the complete Monkey pipeline:
//!
//! 1. **Lexer** (`lexer`) — tokenises source text into a flat `Vec<Token>`.
//! 2. **Parser** (`parser`) — builds a typed [`ast::Program`] from the tokens.
//! 3. **Values** (`value`) — the runtime `Value` enum with canonical
//!    instances for integers, booleans and null.
//! 4. **Bytecode** (`bytecode`) — `OpCode` definitions, the assembler and
//!    the disassembler.
//! 5. **Symbol table** (`symbol_table`) — lexical resolution with
//!    free-variable capture for the compiler.
//! 6. **Compiler** (`compiler`) — lowers the AST to bytecode + constants.
//! 7. **VM** (`vm`) — stack-based interpreter executing the bytecode.
//! 8. **Evaluator** (`evaluator`) — tree-walking engine over the same AST,
//!    with assignment, `while` and `break` on top of the common subset.
//! 9. **Builtins** (`builtins`) — the fixed host function table.
//!
//! # Entry point
//!
//! ```rust,ignore
//! use monkey::{run_source, Engine};
//! let result = run_source("1 + 2", Engine::Compiler)?;
//! ```

use std::fmt;
use std::rc::Rc;

// ─────────────────────────────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod symbol_table;
pub mod token;
pub mod value;
pub mod vm;

use crate::compiler::{CompileError, Compiler};
use crate::environment::Environment;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::value::Value;
use crate::vm::{RuntimeError, Vm};

// ─────────────────────────────────────────────────────────────────────────────
// Engine selection
// ─────────────────────────────────────────────────────────────────────────────

/// Which execution engine to run a program through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// The tree-walking evaluator.
    Interpreter,
    /// The bytecode compiler + virtual machine.
    Compiler,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Interpreter => write!(f, "interpreter"),
            Engine::Compiler => write!(f, "compiler"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unified error type
// ─────────────────────────────────────────────────────────────────────────────

/// The unified error type for all pipeline stages.
///
/// Each variant wraps errors from the corresponding stage so that callers
/// can handle them uniformly or match on the specific stage.
#[derive(Debug, thiserror::Error)]
pub enum MonkeyError {
    /// One or more lexical errors.
    #[error("LexError: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Lex(Vec<LexError>),

    /// One or more parse errors.
    #[error("ParseError: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Parse(Vec<ParseError>),

    /// A compile-time error (name resolution, unknown operator).
    #[error("CompileError: {0}")]
    Compile(#[from] CompileError),

    /// A runtime error raised by the VM.
    #[error("RuntimeError: {0}")]
    Runtime(#[from] RuntimeError),

    /// A runtime error value produced by the evaluator.
    #[error("RuntimeError: {0}")]
    Eval(String),

    /// A line-editing failure in the REPL.
    #[error("readline error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),

    /// An I/O error (script file reading).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Lex and parse a source string, returning a typed [`ast::Program`].
pub fn parse_source(src: &str) -> Result<ast::Program, MonkeyError> {
    let (tokens, lex_errors) = lexer::lex(src);
    if !lex_errors.is_empty() {
        return Err(MonkeyError::Lex(lex_errors));
    }
    let (program, parse_errors) = parser::parse_tokens(tokens);
    if !parse_errors.is_empty() {
        return Err(MonkeyError::Parse(parse_errors));
    }
    Ok(program)
}

/// Full pipeline: parse, then run through the selected engine. Returns the
/// program's final value.
pub fn run_source(src: &str, engine: Engine) -> Result<Rc<Value>, MonkeyError> {
    let program = parse_source(src)?;
    match engine {
        Engine::Compiler => {
            let mut compiler = Compiler::new();
            compiler.compile(&program)?;
            let mut vm = Vm::new(compiler.bytecode());
            vm.run()?;
            Ok(vm.last_popped_stack_element())
        }
        Engine::Interpreter => {
            let env = Environment::new();
            let result = evaluator::eval_program(&program, &env);
            match &*result {
                Value::Error(message) => Err(MonkeyError::Eval(message.clone())),
                _ => Ok(result),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
