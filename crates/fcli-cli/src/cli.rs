//! CLI argument definitions using clap

use crate::error::{CliError, CliResult};
use crate::writer::OutputFormat;
use clap::{Args, Parser, Subcommand};
use fcli_core::ProductKind;
use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;

/// Prefix of the per-parameter options accepted by `action run`.
pub const PARAM_PREFIX: &str = "--param.";

#[derive(Parser, Debug)]
#[command(
    name = "fcli",
    about = "fcli - run declarative actions against application security products",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub product: Product,

    /// Runner configuration file (YAML or JSON)
    #[arg(long, env = "FCLI_CONFIG", global = true, help = "Path to the runner configuration file")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable debug logging on stderr")]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Product {
    /// Fortify Software Security Center (with ScanCentral SAST/DAST)
    Ssc {
        #[command(subcommand)]
        command: ProductCommand,
    },
    /// Fortify on Demand
    Fod {
        #[command(subcommand)]
        command: ProductCommand,
    },
    /// ScanCentral DAST
    #[command(name = "sc-dast")]
    ScDast {
        #[command(subcommand)]
        command: ProductCommand,
    },
    /// Fortify Aviator
    Aviator {
        #[command(subcommand)]
        command: ProductCommand,
    },
}

impl Product {
    pub fn kind(&self) -> ProductKind {
        match self {
            Product::Ssc { .. } => ProductKind::Ssc,
            Product::Fod { .. } => ProductKind::Fod,
            Product::ScDast { .. } => ProductKind::ScDast,
            Product::Aviator { .. } => ProductKind::Aviator,
        }
    }

    /// Backends whose request helpers this product's actions may target.
    pub fn backends(&self) -> &'static [&'static str] {
        match self {
            Product::Ssc { .. } => &["ssc", "sc-sast", "sc-dast"],
            Product::Fod { .. } => &["fod"],
            Product::ScDast { .. } => &["sc-dast"],
            Product::Aviator { .. } => &["aviator"],
        }
    }

    pub fn command(&self) -> &ProductCommand {
        match self {
            Product::Ssc { command }
            | Product::Fod { command }
            | Product::ScDast { command }
            | Product::Aviator { command } => command,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ProductCommand {
    /// Work with actions
    Action {
        #[command(subcommand)]
        command: ActionCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ActionCommand {
    /// Run an action
    Run(RunArgs),
    /// Load and validate an action without running it
    Validate {
        #[arg(help = "Action file path or name in the actions directory")]
        action: String,
    },
    /// List the functions available to action expressions
    Functions,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(help = "Action file path or name in the actions directory")]
    pub action: String,

    #[arg(long, value_enum, default_value = "jsonl", help = "Record output format")]
    pub output: OutputFormat,

    #[arg(long, help = "Write records to this file instead of stdout")]
    pub output_file: Option<PathBuf>,

    #[arg(long, help = "Fail the run when any request item fails")]
    pub strict: bool,

    /// Action parameters as `--param.<name>=<value>` or `--param.<name> <value>`
    #[arg(
        value_name = "--param.<name> <value>",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub params: Vec<String>,
}

impl RunArgs {
    pub fn parameters(&self) -> CliResult<Map<String, JsonValue>> {
        parse_param_args(&self.params)
    }
}

/// Collect `--param.<name>` bindings. A trailing flag without a value, or one
/// followed directly by another parameter, is taken as `true`.
pub fn parse_param_args(args: &[String]) -> CliResult<Map<String, JsonValue>> {
    let mut params = Map::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        let binding = arg.strip_prefix(PARAM_PREFIX).ok_or_else(|| {
            CliError::InvalidArgument(format!(
                "unexpected argument '{}'; options must come before {}<name> bindings",
                arg, PARAM_PREFIX
            ))
        })?;
        let (name, value) = match binding.split_once('=') {
            Some((name, value)) => (name, value.to_string()),
            None => match iter.peek() {
                Some(next) if !next.starts_with(PARAM_PREFIX) => (binding, iter.next().cloned().unwrap_or_default()),
                _ => (binding, "true".to_string()),
            },
        };
        if name.is_empty() {
            return Err(CliError::InvalidArgument(format!("missing parameter name in '{}'", arg)));
        }
        params.insert(name.to_string(), JsonValue::String(value));
    }
    Ok(params)
}
