pub mod cli;
pub mod commands;
pub mod error;
pub mod utils;
pub mod writer;

pub use cli::{ActionCommand, Cli, Product, ProductCommand};
pub use error::{CliError, CliResult};
pub use utils::{init_tracing, ColoredOutput};

use commands::{FunctionsCommand, RunCommand, ValidateCommand};
use fcli_config::ConfigLoader;

/// Execute a parsed command line and return the process exit code.
pub async fn run(cli: Cli) -> CliResult<i32> {
    init_tracing(cli.verbose)?;
    if cli.no_color {
        colored::control::set_override(false);
    }
    tracing::debug!("fcli v{}", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::default().load(cli.config.as_deref())?;
    let ProductCommand::Action { command } = cli.product.command();
    match command {
        ActionCommand::Run(args) => RunCommand::run(&config, &cli.product, args).await,
        ActionCommand::Validate { action } => {
            ValidateCommand::run(&config, &cli.product, action)?;
            Ok(0)
        }
        ActionCommand::Functions => {
            FunctionsCommand::run(&config, &cli.product)?;
            Ok(0)
        }
    }
}
