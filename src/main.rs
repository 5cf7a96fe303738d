use std::io;
use std::process::ExitCode;

use clap::Parser;
use deskcalc::Interpreter;
use miette::IntoDiagnostic;
use miette::WrapErr;

/// A line-oriented desk calculator with variables and `$`-functions.
///
/// Statements are separated by newlines or semicolons; each expression
/// statement prints its value. Errors go to stderr and the exit status is
/// the number of errors encountered.
#[derive(Parser, Debug)]
struct Args {
    /// Expression(s) to evaluate; standard input is read when absent.
    expression: Option<String>,
}

fn main() -> miette::Result<ExitCode> {
    let args = Args::parse();

    let source = match args.expression {
        Some(expression) => expression,
        None => io::read_to_string(io::stdin())
            .into_diagnostic()
            .wrap_err("reading standard input failed")?,
    };

    let mut interpreter = Interpreter::new(&source);
    for value in &mut interpreter {
        println!("{value}");
    }
    println!();

    Ok(ExitCode::from(interpreter.errors() as u8))
}
