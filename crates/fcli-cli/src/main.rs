//! fcli entry point

use clap::Parser;
use fcli_cli::{Cli, ColoredOutput};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match fcli_cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", ColoredOutput::error("Error:"), e);
            e.exit_code()
        }
    };

    std::process::exit(exit_code);
}
