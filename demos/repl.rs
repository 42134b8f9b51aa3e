use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use scmlite::ast::Value;
use scmlite::evaluator::Environment;
use scmlite::scheme::ReaderConfig;
use scmlite::{Config, Error, Interpreter};
use std::panic;
use std::process;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a tracing subscriber, only if RUST_LOG is set
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

fn repl_config() -> Config {
    Config {
        reader: ReaderConfig {
            handle_comments: true,
            ..ReaderConfig::default()
        },
        ..Config::default()
    }
}

fn main() {
    init_tracing();

    let result = panic::catch_unwind(|| match std::env::args().nth(1) {
        Some(path) => run_file(&path),
        None => {
            run_repl();
            0
        }
    });

    match result {
        Ok(code) => process::exit(code),
        Err(panic_info) => {
            eprintln!("The REPL encountered an unexpected error and must exit.");

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

/// Evaluate a whole file and print it as a transcript: each source line after
/// `scm: > `, then the result after `scm: `.
fn run_file(path: &str) -> i32 {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read {path}: {err}");
            return 1;
        }
    };

    for line in source.trim().lines() {
        println!("scm: > {line}");
    }

    let interp = Interpreter::with_config(repl_config());
    match interp.run(&source) {
        Ok(result) => {
            println!("scm: {result}");
            0
        }
        Err(err) => {
            println!("scm: Error: {err}");
            1
        }
    }
}

fn run_repl() {
    println!("scmlite - a minimal Scheme interpreter");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };
    let interp = Interpreter::with_config(repl_config());

    // Callable from user code too
    interp.register_builtin_operation::<(), _>("help", print_help);

    loop {
        match rl.readline("scm> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        _ = print_help().is_ok();
                        continue;
                    }
                    ":env" => {
                        print_environment(interp.global_env());
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                match interp.run(line) {
                    // Nothing to show for forms that produce no value
                    Ok(Value::Unspecified) => {}
                    Ok(result) => println!("{result}"),
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() -> Result<Value, Error> {
    println!("scmlite commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Language:");
    println!("  Numbers: 42, -5, 2.5");
    println!("  Booleans: #t, #f (only #f is false)");
    println!("  Text: \"hello\" (no spaces or parentheses inside)");
    println!("  Special forms: begin, lambda, let, define, set!, cond, if");
    println!("  Procedures: car, cdr, cons, atom?, eq?, <, >, +, -, *, /, abs, display");
    println!("  Comments: ; to end of line");
    println!();
    println!("Examples:");
    println!("  (define (square x) (* x x))");
    println!("  (square 6)");
    println!("  (let ((a 3) (b 4)) (+ a b))");
    println!("  (cond ((< 1 0) \"neg\") (else \"pos\"))");
    println!();

    Ok(Value::Unspecified)
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-ins from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Procedure { .. } | Value::SpecialForm { .. } => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-ins ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
            print!("  {:<15}", name.name());
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
