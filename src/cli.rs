//! Demo CLI: evaluate an expression against an optional JSON context.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use crate::context::Context;
use crate::error::CelError;
use crate::json;

#[derive(Parser)]
#[command(name = "cel")]
#[command(about = "Evaluate CEL expressions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The expression to evaluate
    pub expression: String,

    /// JSON file whose top-level object becomes the binding context
    #[arg(long, short)]
    pub context: Option<PathBuf>,

    /// Print the result as JSON instead of the canonical rendering
    #[arg(long)]
    pub json: bool,
}

pub fn run(cli: Cli) -> ExitCode {
    let context = match load_context(cli.context.as_deref()) {
        Ok(context) => context,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    match crate::eval(&cli.expression, &context) {
        Ok(value) => {
            if cli.json {
                match json::from_value(&value) {
                    Ok(encoded) => println!("{encoded}"),
                    Err(err) => {
                        eprintln!("error: {err}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!("{value}");
            }
            ExitCode::SUCCESS
        }
        Err(CelError::Parse(errors)) => {
            for error in &errors.errors {
                eprintln!("{}", error.display_with_source(&cli.expression));
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_context(path: Option<&std::path::Path>) -> Result<Context, String> {
    let Some(path) = path else {
        return Ok(Context::new());
    };
    let text = fs::read_to_string(path)
        .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&text)
        .map_err(|err| format!("{} is not valid JSON: {err}", path.display()))?;
    let serde_json::Value::Object(entries) = document else {
        return Err(format!("{}: context must be a JSON object", path.display()));
    };

    let mut context = Context::new();
    for (name, value) in &entries {
        context.insert(name.clone(), json::to_value(value));
    }
    Ok(context)
}
