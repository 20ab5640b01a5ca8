//! Purpose: `red-introspect` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, seeds the search path, runs commands.
//! Invariants: One-shot commands print the response envelope on stdout (JSON unless `--human`).
//! Invariants: `serve` keeps stdout reserved for JSON-RPC; logs go to stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use red_introspect::api::{
    self, Error, ErrorKind, LibdocPayload, ResponseEnvelope, VariableTable, to_exit_code,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod rpc_stdio;

const PATH_ENV: &str = "RED_INTROSPECT_PATH";

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint(clap_error_hint(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();
    let color_mode = cli.color;
    api::seed_base_search_path(base_search_path(
        &cli.path,
        std::env::var_os(PATH_ENV),
    ));

    if !matches!(cli.command, Command::Completion { .. } | Command::Version) {
        api::prepare_interpreter();
    }

    dispatch_command(cli.command, cli.human, color_mode).map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "red-introspect",
    version,
    about = "Class, variable and libdoc introspection for Robot Framework libraries",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Answers the questions an IDE asks about test libraries:
  - `classes` lists the class names a module, package or archive defines
  - `variables` evaluates a variable file and returns its bindings
  - `libdoc` documents a library's keywords as JSON
  - `serve` answers the same questions as JSON-RPC over stdio
"#,
    after_help = r#"EXAMPLES
  $ red-introspect classes libs/module/__init__.py
  $ red-introspect variables vars.py --arg _suffix
  $ red-introspect --path libs libdoc MyLibrary
  $ red-introspect serve                     # one JSON-RPC request per line

NOTES
  - Base search path: --path (repeatable) followed by RED_INTROSPECT_PATH
  - Logs go to stderr; tune with RUST_LOG (default: warn)"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Base search directory for imports (repeatable)",
        value_hint = ValueHint::DirPath
    )]
    path: Vec<PathBuf>,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,
    #[arg(
        long,
        global = true,
        help = "Print one-shot results as human-readable text instead of the JSON envelope"
    )]
    human: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Serve JSON-RPC 2.0 over stdin/stdout",
        after_help = r#"EXAMPLES
  $ echo '{"jsonrpc":"2.0","id":1,"method":"ping"}' | red-introspect serve

NOTES
  - Methods: ping, list_methods, get_classes_from_module, get_variables, create_libdoc
  - Each result is the {result, exception} envelope"#
    )]
    Serve,
    #[command(
        arg_required_else_help = true,
        about = "List class names defined by a module, package or archive",
        after_help = r#"EXAMPLES
  $ red-introspect classes libs/module/__init__.py
  $ red-introspect classes libs/compressed.zip
  $ red-introspect classes lib.py --python-path deps --class-path classes"#
    )]
    Classes {
        #[arg(help = "Source file, package directory or initializer, .zip or .jar", value_hint = ValueHint::AnyPath)]
        location: PathBuf,
        #[arg(long = "python-path", help = "Extra source search directory (repeatable)", value_hint = ValueHint::DirPath)]
        python_path: Vec<PathBuf>,
        #[arg(long = "class-path", help = "Extra class search entry (repeatable)", value_hint = ValueHint::AnyPath)]
        class_path: Vec<PathBuf>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Evaluate a variable file and print its variables",
        after_help = r#"EXAMPLES
  $ red-introspect variables vars.py
  $ red-introspect variables vars_with_argument.py --arg _suffix"#
    )]
    Variables {
        #[arg(help = "Variable file (.py)", value_hint = ValueHint::FilePath)]
        location: PathBuf,
        #[arg(long = "arg", help = "Argument passed to the variable file (repeatable)")]
        args: Vec<String>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate libdoc JSON for a library",
        after_help = r#"EXAMPLES
  $ red-introspect libdoc MyLibrary --class-dir libs
  $ red-introspect libdoc libs/keywords.py"#
    )]
    Libdoc {
        #[arg(help = "Library name or path to a .py file")]
        library: String,
        #[arg(long = "class-dir", help = "Extra class search directory (repeatable)", value_hint = ValueHint::DirPath)]
        class_dirs: Vec<PathBuf>,
        #[arg(long = "general-dir", help = "Extra general search directory (repeatable)", value_hint = ValueHint::DirPath)]
        general_dirs: Vec<PathBuf>,
    },
    #[command(arg_required_else_help = true, about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info")]
    Version,
}

fn dispatch_command(
    command: Command,
    human: bool,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Serve => {
            rpc_stdio::serve()?;
            Ok(RunOutcome::ok())
        }
        Command::Classes {
            location,
            python_path,
            class_path,
        } => {
            let outcome = api::classes_from_module(&location, &python_path, &class_path);
            emit_outcome(outcome, human, color_mode, |names: &Vec<String>| {
                names.join("\n")
            })
        }
        Command::Variables { location, args } => {
            let outcome = api::variables(&location, &args);
            emit_outcome(outcome, human, color_mode, render_variables_human)
        }
        Command::Libdoc {
            library,
            class_dirs,
            general_dirs,
        } => {
            if human {
                let outcome = api::libdoc(&library, &class_dirs, &general_dirs);
                emit_outcome(outcome, true, color_mode, render_libdoc_human)
            } else {
                let outcome =
                    api::render_libdoc(&api::JsonRenderer, &library, &class_dirs, &general_dirs);
                emit_outcome(outcome, false, color_mode, |_: &Value| String::new())
            }
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "red-introspect", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
    }
}

/// Print the outcome and derive the exit code; failures are not escalated
/// since the envelope already carries them.
fn emit_outcome<T: Serialize>(
    outcome: Result<T, Error>,
    human: bool,
    color_mode: ColorMode,
    render_human: impl Fn(&T) -> String,
) -> Result<RunOutcome, Error> {
    let exit_code = match &outcome {
        Ok(_) => 0,
        Err(err) => to_exit_code(err.kind()),
    };
    if human {
        match &outcome {
            Ok(value) => println!("{}", render_human(value)),
            Err(err) => emit_error(err, color_mode),
        }
        return Ok(RunOutcome::with_code(exit_code));
    }
    let envelope = ResponseEnvelope::from(outcome);
    let value = serde_json::to_value(&envelope).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode response envelope")
            .with_source(err)
    })?;
    emit_json(&value);
    Ok(RunOutcome::with_code(exit_code))
}

fn base_search_path(cli_paths: &[PathBuf], env_value: Option<OsString>) -> Vec<PathBuf> {
    let mut dirs = cli_paths.to_vec();
    if let Some(value) = env_value {
        dirs.extend(
            std::env::split_paths(&value).filter(|dir| !dir.as_os_str().is_empty()),
        );
    }
    dirs
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn render_variables_human(table: &VariableTable) -> String {
    let width = table.keys().map(|name| name.chars().count()).max().unwrap_or(0);
    table
        .iter()
        .map(|(name, value)| {
            format!(
                "{name:<width$}  {}",
                value.replace('\n', "\\n").replace('\r', "\\r")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_libdoc_human(payload: &LibdocPayload) -> String {
    let mut lines = vec![format!(
        "{} {} (scope: {}, format: {})",
        payload.name,
        if payload.version.is_empty() {
            "-"
        } else {
            payload.version.as_str()
        },
        payload.scope,
        payload.doc_format
    )];
    if let Some(source) = &payload.source {
        lines.push(format!("source: {source}"));
    }
    for keyword in &payload.keywords {
        let args = keyword
            .args
            .iter()
            .map(|arg| arg.repr.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if keyword.shortdoc.is_empty() {
            lines.push(format!("  {}({args})", keyword.name));
        } else {
            lines.push(format!("  {}({args})  {}", keyword.name, keyword.shortdoc));
        }
    }
    lines.join("\n")
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("red-introspect {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(&json!({
            "name": "red-introspect",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

fn emit_json(value: &Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|_| "{\"result\":null,\"exception\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::UnsupportedContainer => "unsupported container".to_string(),
        ErrorKind::DataError => "data error".to_string(),
        ErrorKind::SyntaxError => "syntax error".to_string(),
        ErrorKind::ImportError => "import error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().label()));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(line) = err.line() {
        inner.insert("line".to_string(), json!(line));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}: {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        err.kind().label(),
        error_message(err)
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        let location = match err.line() {
            Some(line) => format!("{}:{line}", path.display()),
            None => path.display().to_string(),
        };
        lines.push(format!(
            "{} {location}",
            colorize_label("path:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `red-introspect --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "red-introspect") else {
        return "Try `red-introspect --help`.".to_string();
    };
    let parts: Vec<&str> = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect();
    if parts.is_empty() {
        return "Try `red-introspect --help`.".to_string();
    }
    format!("Try `red-introspect {} --help`.", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use red_introspect::api::{ArgumentDoc, ArgumentKind, KeywordDoc};
    use std::collections::BTreeMap;

    #[test]
    fn error_text_respects_color_flag() {
        let err = Error::new(ErrorKind::Usage).with_message("bad input");
        let colored = error_text(&err, true);
        let plain = error_text(&err, false);
        assert!(colored.contains("\u{1b}[31merror:\u{1b}[0m"));
        assert!(plain.contains("error: UsageError: bad input"));
        assert!(!plain.contains("\u{1b}["));
    }

    #[test]
    fn error_json_carries_location() {
        let err = Error::new(ErrorKind::SyntaxError)
            .with_message("invalid syntax")
            .with_path("/tmp/lib.py")
            .with_line(3);
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "SyntaxError");
        assert_eq!(value["error"]["path"], "/tmp/lib.py");
        assert_eq!(value["error"]["line"], 3);
    }

    #[test]
    fn base_search_path_orders_flags_before_environment() {
        let joined = std::env::join_paths([PathBuf::from("/env/a"), PathBuf::from("/env/b")])
            .expect("join");
        let dirs = base_search_path(&[PathBuf::from("/cli")], Some(joined));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/cli"),
                PathBuf::from("/env/a"),
                PathBuf::from("/env/b"),
            ]
        );
        assert!(base_search_path(&[], None).is_empty());
    }

    #[test]
    fn variables_render_as_aligned_table() {
        let table: BTreeMap<String, String> = [("a", "1"), ("long_name", "two\nlines")]
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        assert_eq!(
            render_variables_human(&table),
            "a          1\nlong_name  two\\nlines"
        );
    }

    #[test]
    fn libdoc_renders_keyword_summary() {
        let payload = LibdocPayload {
            name: "lib".to_string(),
            doc: String::new(),
            version: "1.0".to_string(),
            scope: "GLOBAL".to_string(),
            doc_format: "ROBOT".to_string(),
            library_type: "LIBRARY".to_string(),
            source: None,
            lineno: 1,
            inits: Vec::new(),
            keywords: vec![KeywordDoc {
                name: "Greet".to_string(),
                args: vec![ArgumentDoc {
                    name: "who".to_string(),
                    kind: ArgumentKind::PositionalOrNamed,
                    default_value: Some("world".to_string()),
                    repr: "who=world".to_string(),
                }],
                doc: "Say hello.".to_string(),
                shortdoc: "Say hello.".to_string(),
                tags: Vec::new(),
                lineno: 2,
            }],
        };
        assert_eq!(
            render_libdoc_human(&payload),
            "lib 1.0 (scope: GLOBAL, format: ROBOT)\n  Greet(who=world)  Say hello."
        );
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "red-introspect",
            "classes",
            "lib.py",
            "--python-path",
            "deps",
            "--path",
            "base",
            "--human",
        ])
        .expect("parse");
        assert!(cli.human);
        assert_eq!(cli.path, vec![PathBuf::from("base")]);
        assert!(matches!(cli.command, Command::Classes { .. }));
    }
}
