//=============================================
// src/main.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript CLI entrypoint for running .ebs scripts
// Objective: Parse, optionally dump the AST, execute, and drain pending
//            callbacks before exit
//=============================================

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser as ClapParser;

use emberscript::parser::Parser;
use emberscript::tokenizer::Tokenizer;
use emberscript::{ScriptRuntime, Value};

#[derive(Debug, ClapParser)]
#[command(
    name = "emberscript",
    about = "Runs EmberScript files or evaluates inline expressions.",
    version
)]
struct Args {
    /// Path to the EmberScript file to execute.
    script: PathBuf,

    /// Pretty-print the parsed AST instead of executing.
    #[arg(long)]
    print_ast: bool,

    /// Evaluate an expression after the script finishes and print the result.
    #[arg(long)]
    expr: Option<String>,

    /// Seconds to wait for pending callbacks and timers before exiting.
    #[arg(long, default_value_t = 1)]
    drain_secs: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let source = fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read {}", args.script.display()))?;

    let program = emberscript::parse(&source)
        .map_err(|err| anyhow!("{}: {}", args.script.display(), err))?;

    if args.print_ast {
        println!("{:#?}", program);
        return Ok(());
    }

    let mut runtime = ScriptRuntime::new();
    let result = runtime
        .execute(&program, Some(args.script.as_path()))
        .map_err(|err| anyhow!("{}: {}", args.script.display(), err))?;

    if let Some(expr) = args.expr.as_deref() {
        let value = evaluate_expression(&mut runtime, expr)?;
        println!("{}", value);
    } else if let Some(value) = result {
        println!("{}", value);
    }

    runtime.wait_idle(Duration::from_secs(args.drain_secs));
    runtime.shutdown();
    Ok(())
}

fn evaluate_expression(runtime: &mut ScriptRuntime, expr: &str) -> Result<Value> {
    let tokens = Tokenizer::new(expr)
        .tokenize()
        .map_err(|err| anyhow!("--expr: {}", err))?;
    let parsed = Parser::new(tokens)
        .parse_expression_only()
        .map_err(|err| anyhow!("--expr: {}", err))?;
    let wrapper = emberscript::ast::Program::new(vec![emberscript::ast::Stmt::Return {
        value: Some(parsed),
        line: 0,
    }]);
    runtime
        .execute(&wrapper, None)
        .map_err(|err| anyhow!("--expr: {}", err))
        .map(|value| value.unwrap_or(Value::Null))
}
