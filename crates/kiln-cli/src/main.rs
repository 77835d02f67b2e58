//! Kiln command-line interface.
//!
//! Runs SQL against a local Kiln data directory.
//!
//! # Usage
//!
//! ```bash
//! # Execute a single command
//! kiln -c "SELECT * FROM users"
//!
//! # Execute commands from a file
//! kiln -f schema.sql
//!
//! # Read statements from stdin, output as JSON
//! echo "SELECT COUNT(*) FROM users" | kiln -o json
//! ```

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use kiln_common::EngineConfig;
use kiln_engine::Database;

mod formatter;

use formatter::OutputFormat;

/// Kiln command-line interface
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Command-line interface for Kiln",
    long_about = "Runs SQL against a Kiln data directory.\n\n\
                  Every query is compiled to a native kernel with the configured C compiler.\n\
                  Without -c or -f, statements are read from standard input."
)]
struct Args {
    /// Execute a single SQL command and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Execute SQL commands from file and exit
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "table")]
    output: OutputFormatArg,

    /// Data directory (overrides the configuration file)
    #[arg(short = 'd', long, value_name = "DIR", env = "KILN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Only print query results, no footers for writes
    #[arg(short = 'q', long)]
    quiet: bool,
}

/// Output format argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    /// Display results in a formatted table
    Table,
    /// Display results as JSON
    Json,
    /// Display results as CSV
    Csv,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Csv => OutputFormat::Csv,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let config = load_config(&args)?;
    let db = Database::open(config).context("failed to open database")?;

    let script = if let Some(command) = &args.command {
        info!("Executing command: {}", command);
        command.clone()
    } else if let Some(file) = &args.file {
        info!("Executing file: {}", file.display());
        std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("failed to read standard input")?;
        input
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute_script(&db, &script, args.output.into(), args.quiet, &mut out)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("kiln_cli=debug,kiln_engine=debug,kiln_storage=debug,kiln_sql=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }

    Ok(config)
}

/// Executes each statement of `script` in order, printing every result.
/// Stops at the first failing statement.
fn execute_script<W: Write>(
    db: &Database,
    script: &str,
    format: OutputFormat,
    quiet: bool,
    out: &mut W,
) -> Result<()> {
    for statement in split_statements(script) {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        debug!("Executing statement: {}", trimmed);

        let result = db
            .execute_one(trimmed)
            .with_context(|| format!("statement failed: {}", trimmed))?;

        if quiet && result.rows_affected().is_some() {
            continue;
        }
        out.write_all(formatter::format_result(&result, format).as_bytes())?;
    }
    out.flush()?;
    Ok(())
}

/// Split SQL content into individual statements.
///
/// Semicolons inside quoted strings and comments do not split. Segments
/// holding only whitespace or comments are dropped.
fn split_statements(content: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_code = false;
    let mut in_string: Option<char> = None;
    let mut in_comment = false;
    let mut in_block_comment = false;

    let mut chars = content.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);

        if in_block_comment {
            if c == '*' && next == Some('/') {
                chars.next();
                in_block_comment = false;
            }
            continue;
        }
        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }

        if let Some(quote) = in_string {
            if c == quote {
                // Doubled quote is an escaped quote.
                if next == Some(quote) {
                    chars.next();
                } else {
                    in_string = None;
                }
            }
            continue;
        }

        match (c, next) {
            ('/', Some('*')) => {
                chars.next();
                in_block_comment = true;
            }
            ('-', Some('-')) => {
                chars.next();
                in_comment = true;
            }
            ('\'' | '"', _) => {
                in_string = Some(c);
                has_code = true;
            }
            (';', _) => {
                if has_code {
                    statements.push(&content[start..i]);
                }
                start = i + 1;
                has_code = false;
            }
            (c, _) if !c.is_whitespace() => has_code = true,
            _ => {}
        }
    }

    if has_code {
        statements.push(&content[start..]);
    }

    statements
}
