//! Load and validate an action without running it

use crate::cli::Product;
use crate::error::CliResult;
use crate::utils::ColoredOutput;
use fcli_config::RunnerConfig;
use fcli_runtime::ActionRunner;
use tracing::info;

pub struct ValidateCommand;

impl ValidateCommand {
    pub fn run(config: &RunnerConfig, product: &Product, action: &str) -> CliResult<()> {
        let runner = ActionRunner::from_config(config, product.backends())?;
        let document = runner.load(action)?;
        let report = runner.validate(&document);
        info!(action = %document.name, issues = report.issues.len(), "validated action");

        for issue in report.issues.iter().chain(&report.configuration) {
            eprintln!("  {} {}", ColoredOutput::error("✗"), issue);
        }
        report.into_result()?;

        println!(
            "{} Action '{}' is valid ({} steps)",
            ColoredOutput::success("✓"),
            ColoredOutput::highlight(&document.name),
            document.steps.len()
        );
        Ok(())
    }
}
