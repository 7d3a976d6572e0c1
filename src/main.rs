//! Command-line entry point: run a script through either engine, or start
//! the REPL when no script is given.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use monkey::value::Value;
use monkey::Engine;

#[derive(Parser)]
#[command(name = "monkey", about = "The Monkey programming language", version)]
struct Cli {
    /// Execution engine to use.
    #[arg(long, value_enum, default_value_t = EngineArg::Compiler)]
    engine: EngineArg,

    /// Script file to run. Starts the REPL when omitted.
    script: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EngineArg {
    /// Tree-walking evaluator.
    Interpreter,
    /// Bytecode compiler + virtual machine.
    Compiler,
}

// clap renders the default value through Display.
impl std::fmt::Display for EngineArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineArg::Interpreter => write!(f, "interpreter"),
            EngineArg::Compiler => write!(f, "compiler"),
        }
    }
}

impl From<EngineArg> for Engine {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Interpreter => Engine::Interpreter,
            EngineArg::Compiler => Engine::Compiler,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let engine = Engine::from(cli.engine);

    match cli.script {
        Some(path) => {
            let src = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let result = monkey::run_source(&src, engine).map_err(|e| anyhow::anyhow!("{e}"))?;
            match &*result {
                Value::Empty | Value::Break => {}
                other => println!("{other}"),
            }
            Ok(())
        }
        None => {
            monkey::repl::start(engine)?;
            Ok(())
        }
    }
}
