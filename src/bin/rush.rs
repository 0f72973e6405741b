//! rush REPL entry point
//!
//! Reads expressions line by line, keeps prompting with a continuation
//! prompt while parentheses are open, and prints each result as `-> value`.

use anyhow::{Context, Result};
use clap::Parser;
use rush::ast::Value;
use rush::evaluator::{self, Environment};
use rush::scheme::{paren_depth, tokenize};
use rush::{Error, interpret_once, with_eval_stack};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::rc::Rc;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "rush >> ";
const CONTINUATION_PROMPT: &str = " ... >> ";

/// A minimal Scheme interpreter
#[derive(Parser, Debug)]
#[command(name = "rush", version, about)]
struct Args {
    /// Evaluate EXPR and print its result instead of starting the REPL
    /// (may be given more than once)
    #[arg(short, long = "eval", value_name = "EXPR")]
    eval: Vec<String>,

    /// Log definitions and assignments to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries results only
    let default_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .init();

    // Deeply recursive programs need more stack than the main thread has
    with_eval_stack(move || {
        let env = evaluator::create_global_env();
        if args.eval.is_empty() {
            run_repl(&env)
        } else {
            run_batch(&args.eval, &env)
        }
    })
    .context("Could not start evaluation thread")?
}

fn run_batch(expressions: &[String], env: &Rc<Environment>) -> Result<()> {
    for source in expressions {
        debug!(%source, "evaluating");
        let value = interpret_once(source, env).with_context(|| format!("evaluating {source}"))?;
        print_value(&value);
    }
    Ok(())
}

fn run_repl(env: &Rc<Environment>) -> Result<()> {
    let mut rl = DefaultEditor::new().context("Could not initialize line editor")?;
    let mut input = InputBuffer::default();
    info!("rush {} ready", env!("CARGO_PKG_VERSION"));

    loop {
        let prompt = if input.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };

        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(err) => return Err(err).context("Could not read input"),
        };

        if input.is_empty() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let _ = rl.add_history_entry(trimmed);

            match Command::from_line(trimmed) {
                Some(Command::Quit) => break,
                Some(Command::Env) => {
                    print_environment(env);
                    continue;
                }
                Some(Command::Help) => {
                    print_help();
                    continue;
                }
                None => {}
            }
        } else {
            let _ = rl.add_history_entry(line.trim());
        }

        match input.push_line(&line) {
            Input::Pending => {}
            Input::Complete(source) => match interpret_once(&source, env) {
                Ok(value) => print_value(&value),
                Err(e) => println!("Error: {e}"),
            },
            Input::Invalid(e) => println!("Error: {e}"),
        }
    }

    println!("-> bye...");
    Ok(())
}

fn print_value(value: &Value) {
    if !matches!(value, Value::Unspecified) {
        println!("-> {value}");
    }
}

/// REPL commands recognized at the start of a fresh expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quit,
    Env,
    Help,
}

impl Command {
    fn from_line(line: &str) -> Option<Self> {
        match line {
            "(quit)" | "(exit)" | ":quit" | ":exit" => Some(Command::Quit),
            ":env" => Some(Command::Env),
            ":help" => Some(Command::Help),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Input {
    /// Parentheses are still open
    Pending,
    /// Balanced source text, ready to evaluate
    Complete(String),
    Invalid(Error),
}

/// Accumulates lines until the parentheses they contain balance out
#[derive(Debug, Default)]
struct InputBuffer {
    text: String,
    depth: usize,
}

impl InputBuffer {
    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn push_line(&mut self, line: &str) -> Input {
        match paren_depth(&tokenize(line), self.depth) {
            Ok(0) => {
                self.text.push_str(line);
                self.depth = 0;
                Input::Complete(std::mem::take(&mut self.text))
            }
            Ok(depth) => {
                self.text.push_str(line);
                self.text.push('\n');
                self.depth = depth;
                Input::Pending
            }
            Err(e) => {
                self.text.clear();
                self.depth = 0;
                Input::Invalid(e)
            }
        }
    }
}

fn print_help() {
    println!("rush - a minimal Scheme interpreter");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter (also :exit, (quit), (exit))");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms: quote, if, define, set!, lambda");
    println!("Primitives:    + - * / < > <= >= = not cons car cdr list list? null? symbol?");
    println!();
    println!("Examples:");
    println!("  (define square (lambda (n) (* n n)))");
    println!("  (square 256)");
    println!("  (if (< 10 3) 5 15)");
    println!("  (car (quote (1 2 3)))");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    // Separate built-in functions from user-defined values
    let (builtins, user_defined): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Value::BuiltinFunction { .. }));

    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        for row in builtins.chunks(6) {
            let names: Vec<String> = row.iter().map(|(name, _)| format!("{name:<10}")).collect();
            println!("  {}", names.concat().trim_end());
        }
        println!();
    }

    if user_defined.is_empty() {
        println!("No user-defined values.");
    } else {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        let cases = [
            ("(quit)", Some(Command::Quit)),
            ("(exit)", Some(Command::Quit)),
            (":quit", Some(Command::Quit)),
            (":exit", Some(Command::Quit)),
            (":env", Some(Command::Env)),
            (":help", Some(Command::Help)),
            ("quit", None),
            ("(+ 1 2)", None),
        ];
        for (line, expected) in cases {
            assert_eq!(Command::from_line(line), expected, "{line}");
        }
    }

    #[test]
    fn test_input_buffer_continuation() {
        let mut input = InputBuffer::default();
        assert_eq!(input.push_line("(+ 1 2)"), Input::Complete("(+ 1 2)".to_owned()));
        assert!(input.is_empty());

        assert_eq!(input.push_line("(+ 10"), Input::Pending);
        assert!(!input.is_empty());
        assert_eq!(input.push_line("   (* 2"), Input::Pending);
        assert_eq!(input.push_line("3))"), Input::Complete("(+ 10\n   (* 2\n3))".to_owned()));
        assert!(input.is_empty());

        // An extra close paren discards the pending text
        assert_eq!(input.push_line("(car"), Input::Pending);
        assert!(matches!(input.push_line("x))"), Input::Invalid(Error::SyntaxError(_))));
        assert!(input.is_empty());
    }

    #[test]
    fn test_args() {
        let args = Args::parse_from(["rush", "-e", "(+ 1 2)", "--eval", "(car (list 3))", "-v"]);
        assert_eq!(args.eval, vec!["(+ 1 2)", "(car (list 3))"]);
        assert!(args.verbose);

        let args = Args::parse_from(["rush"]);
        assert!(args.eval.is_empty());
        assert!(!args.verbose);
    }
}
