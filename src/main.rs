use std::fs;
use std::panic;
use std::path::{Path, PathBuf};
use std::process;

use minilisp::reader::{ReaderConfig, read_next};
use minilisp::{Environment, Error, Evaluator, Value};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// Interactive session settings
#[derive(Debug, Clone)]
struct ReplConfig {
    prompt: String,
    /// Shown while a form is still open
    continuation_prompt: String,
    /// Where line history is loaded from and saved to, if anywhere
    history_file: Option<PathBuf>,
}

impl Default for ReplConfig {
    fn default() -> Self {
        ReplConfig {
            prompt: "user> ".to_owned(),
            continuation_prompt: "  ... ".to_owned(),
            history_file: None,
        }
    }
}

impl ReplConfig {
    /// Defaults, with the history file taken from `MINILISP_HISTORY`
    fn from_env() -> Self {
        ReplConfig {
            history_file: std::env::var_os("MINILISP_HISTORY").map(PathBuf::from),
            ..ReplConfig::default()
        }
    }
}

/// Command line options
#[derive(Debug, Default)]
struct Options {
    files: Vec<PathBuf>,
    no_repl: bool,
    verbose: bool,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    for arg in args {
        match arg.as_str() {
            "--no-repl" => options.no_repl = true,
            "-v" | "--verbose" => options.verbose = true,
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option '{flag}'")),
            file => options.files.push(PathBuf::from(file)),
        }
    }
    Ok(options)
}

fn print_usage() {
    eprintln!("Usage: minilisp [options] [file ...]");
    eprintln!();
    eprintln!("Evaluates each file in order, then starts the interactive loop.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --no-repl       Exit after evaluating the files");
    eprintln!("  -v, --verbose   Debug logging (otherwise RUST_LOG, default warn)");
    eprintln!("  -h, --help      Show this message");
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    if let Err(err) = simple_logger::SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
    {
        eprintln!("Could not initialize logging: {err}");
    }
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("minilisp: {msg}");
            print_usage();
            process::exit(2);
        }
    };

    init_logging(options.verbose);

    let result = panic::catch_unwind(|| run(&options));

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(panic_info) => {
            eprintln!("The interpreter encountered an unexpected error and must exit.");

            if let Some(msg) = panic_info.downcast_ref::<&str>() {
                eprintln!("Error: {msg}");
            } else if let Some(msg) = panic_info.downcast_ref::<String>() {
                eprintln!("Error: {msg}");
            } else {
                eprintln!("Error: Unknown panic occurred");
            }

            process::exit(1);
        }
    }
}

/// Returns false if any file could not be read or had a failing form
fn run(options: &Options) -> bool {
    let evaluator = Evaluator::standard();
    let env = Environment::root();

    let mut clean = true;
    for path in &options.files {
        clean &= run_file(&evaluator, &env, path);
    }

    if !options.no_repl {
        run_repl(&evaluator, &env, &ReplConfig::from_env());
    }

    clean
}

fn print_result(result: &Result<Value, Error>) {
    match result {
        Ok(value) => println!("=> {value}"),
        Err(e) => println!("Error: {e}"),
    }
}

/// How evaluating a chunk of source text ended
#[derive(Debug)]
enum Chunk<'a> {
    /// Every form was read and evaluated
    Done,
    /// The text ends inside a form; `rest` is the unread text of that form
    Incomplete { rest: &'a str, error: Error },
    /// A form could not be read; nothing after it was evaluated
    Malformed(Error),
}

/// Read and evaluate `source` one form at a time, handing each result to
/// `report` before the next form is read.
///
/// A malformed form stops the chunk, but forms before it have already run.
fn eval_forms<'a>(
    evaluator: &Evaluator<'_>,
    env: &Environment,
    source: &'a str,
    mut report: impl FnMut(Result<Value, Error>),
) -> Chunk<'a> {
    let mut rest = source;
    loop {
        match read_next(rest, ReaderConfig::with_comments()) {
            Ok(None) => return Chunk::Done,
            Ok(Some((form, remaining))) => {
                report(evaluator.eval(&form, env));
                rest = remaining;
            }
            Err(Error::Parse(e)) if e.is_incomplete() => {
                return Chunk::Incomplete {
                    rest,
                    error: Error::Parse(e),
                };
            }
            Err(e) => return Chunk::Malformed(e),
        }
    }
}

fn run_file(evaluator: &Evaluator<'_>, env: &Environment, path: &Path) -> bool {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            println!("Error: cannot read {}: {err}", path.display());
            return false;
        }
    };

    log::debug!("evaluating {}", path.display());

    // A failing form is reported and the rest still run
    let mut clean = true;
    let outcome = eval_forms(evaluator, env, &source, |result| {
        clean &= result.is_ok();
        print_result(&result);
    });

    match outcome {
        Chunk::Done => clean,
        Chunk::Incomplete { error: e, .. } | Chunk::Malformed(e) => {
            println!("Error: {}: {e}", path.display());
            false
        }
    }
}

fn run_repl(evaluator: &Evaluator<'_>, env: &Environment, config: &ReplConfig) {
    println!("minilisp - a minimal Lisp");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };

    if let Some(history) = &config.history_file
        && let Err(err) = rl.load_history(history)
    {
        log::debug!("no history loaded from {}: {err}", history.display());
    }

    // Lines of a form that is not complete yet
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() {
            &config.prompt
        } else {
            &config.continuation_prompt
        };

        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    match line.trim() {
                        "" => continue,
                        ":help" => {
                            let _ = rl.add_history_entry(line.trim());
                            print_help();
                            continue;
                        }
                        ":env" => {
                            let _ = rl.add_history_entry(line.trim());
                            print_environment(evaluator, env);
                            continue;
                        }
                        ":quit" | ":exit" => break,
                        _ => {}
                    }
                }

                let _ = rl.add_history_entry(line.trim_end());
                pending.push_str(&line);
                pending.push('\n');

                match eval_forms(evaluator, env, &pending, |result| print_result(&result)) {
                    // Forms before the open one have run; keep only the open one
                    Chunk::Incomplete { rest, .. } => pending = rest.to_owned(),
                    Chunk::Malformed(e) => {
                        println!("Error: {e}");
                        pending.clear();
                    }
                    Chunk::Done => pending.clear(),
                }
            }
            // Ctrl-C abandons an open form, or exits at a fresh prompt
            Err(ReadlineError::Interrupted) if !pending.is_empty() => pending.clear(),
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    if let Some(history) = &config.history_file
        && let Err(err) = rl.save_history(history)
    {
        log::warn!("could not save history to {}: {err}", history.display());
    }

    println!("Goodbye!");
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!("  Ctrl+C     - Abandon the current form (exit at an empty prompt)");
    println!();
    println!("Special forms: (quote x) 'x (if c a b) (define name expr)");
    println!("               (define (name params...) body) (lambda (params...) body)");
    println!("Primitives:    + - * = < > <= >= car cdr cons");
    println!("Only #f is false: 0, nil and () are all true.");
    println!();
    println!("Examples:");
    println!("  (define (add2 x) (+ x 2))");
    println!("  (add2 5)");
    println!("  (car '(1 2 3))");
    println!();
}

fn print_environment(evaluator: &Evaluator<'_>, env: &Environment) {
    let registry = evaluator.registry();
    println!("Special forms: {}", registry.special_form_names().join(" "));
    println!("Primitives:    {}", registry.primitive_names().join(" "));
    println!();

    let bindings = env.get_all_bindings();
    if bindings.is_empty() {
        println!("No user bindings.");
        return;
    }

    let (functions, values): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Value::Closure(_)));

    if !functions.is_empty() {
        println!("Functions ({}):", functions.len());
        for (name, value) in functions {
            if let Value::Closure(closure) = value {
                let signature = std::iter::once(name.as_str())
                    .chain(closure.params.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("  ({signature})");
            }
        }
    }

    if !values.is_empty() {
        println!("Values ({}):", values.len());
        for (name, value) in values {
            println!("  {name} = {value}");
        }
    }
}
