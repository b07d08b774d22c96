//! AsyncAPI Normalizer CLI
//!
//! Command-line interface for normalizing and validating AsyncAPI documents.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use asyncapi_normalize::{
    load_document, validate_document, DefaultFetcher, Diagnostic, NormalizeOptions, Normalizer,
    Severity,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "asyncapi-normalize")]
#[command(about = "Resolve, merge and normalize AsyncAPI documents")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a document into its resolved, trait-merged form
    Normalize {
        /// Document file (JSON or YAML)
        source: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Remove traits lists from merged nodes
        #[arg(long)]
        strip_traits: bool,

        /// Do not fetch references to other documents
        #[arg(long)]
        no_external: bool,

        /// Directory relative external references resolve against
        /// (default: the document's directory)
        #[arg(long, conflicts_with = "no_external")]
        base_dir: Option<PathBuf>,

        /// Output model and diagnostics as one JSON object (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Validate a document against a JSON Schema (e.g. the AsyncAPI meta-schema)
    Validate {
        /// Document file to validate
        document: PathBuf,

        /// Schema file
        #[arg(long)]
        schema: PathBuf,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Normalize {
            source,
            output,
            pretty,
            strip_traits,
            no_external,
            base_dir,
            json,
        } => run_normalize(NormalizeArgs {
            source,
            output,
            pretty,
            strip_traits,
            no_external,
            base_dir,
            json_output: json,
        }),
        Commands::Validate {
            document,
            schema,
            json,
        } => run_validate(&document, &schema, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Log to stderr. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

struct NormalizeArgs {
    source: PathBuf,
    output: Option<PathBuf>,
    pretty: bool,
    strip_traits: bool,
    no_external: bool,
    base_dir: Option<PathBuf>,
    json_output: bool,
}

fn run_normalize(args: NormalizeArgs) -> Result<(), u8> {
    let NormalizeArgs {
        source,
        output,
        pretty,
        strip_traits,
        no_external,
        base_dir,
        json_output,
    } = args;

    let document = load_document(&source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let mut options = NormalizeOptions::new().strip_traits(strip_traits);
    if !no_external {
        let fetcher = match base_dir {
            Some(dir) => DefaultFetcher::new(dir),
            None => DefaultFetcher::for_document(&source),
        };
        options = options.with_fetcher(fetcher);
    }

    let result = Normalizer::new(options).normalize(&document);
    let failed = !result.is_ok();
    let has_errors = result.has_errors();
    let (model, diagnostics) = result.into_parts();

    let rendered = if json_output {
        let report = serde_json::json!({
            "model": model,
            "diagnostics": diagnostics,
        });
        Some(to_json(&report, pretty)?)
    } else {
        report_diagnostics(&diagnostics);
        model.as_ref().map(|m| to_json(m, pretty)).transpose()?
    };

    if let Some(text) = rendered {
        match output {
            Some(path) => {
                std::fs::write(&path, &text).map_err(|e| {
                    eprintln!("Error writing to {}: {}", path.display(), e);
                    3u8
                })?;
            }
            None => {
                println!("{}", text);
            }
        }
    }

    if failed {
        Err(2)
    } else if has_errors {
        Err(1)
    } else {
        Ok(())
    }
}

fn run_validate(document: &Path, schema: &Path, json_output: bool) -> Result<(), u8> {
    let instance = load_document(document).map_err(|e| {
        report_error(json_output, &format!("loading document: {}", e));
        e.exit_code() as u8
    })?;
    let schema = load_document(schema).map_err(|e| {
        report_error(json_output, &format!("loading schema: {}", e));
        e.exit_code() as u8
    })?;

    let diagnostics = validate_document(&instance, &schema);
    if diagnostics.is_empty() {
        if json_output {
            println!(r#"{{"valid":true}}"#);
        } else {
            println!("Valid");
        }
        return Ok(());
    }

    if json_output {
        let output = serde_json::json!({
            "valid": false,
            "errors": diagnostics
        });
        println!("{}", output);
    } else {
        eprintln!("Validation failed:");
        for diagnostic in &diagnostics {
            eprintln!("  {}", diagnostic);
        }
    }
    Err(1)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String, u8> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}

/// Print diagnostics to stderr, colored by severity.
fn report_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let color = match diagnostic.severity {
            Severity::Error => "\x1b[31m",
            Severity::Warning => "\x1b[33m",
            Severity::Info => "\x1b[36m",
        };
        eprintln!("{}{}\x1b[0m", color, diagnostic);
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
