//! List the functions available to action expressions

use crate::cli::Product;
use crate::error::CliResult;
use crate::utils::ColoredOutput;
use fcli_config::RunnerConfig;
use fcli_expr::FunctionDef;
use fcli_runtime::ActionRunner;

pub struct FunctionsCommand;

impl FunctionsCommand {
    pub fn run(config: &RunnerConfig, product: &Product) -> CliResult<()> {
        let runner = ActionRunner::from_config(config, product.backends())?;
        let mut functions: Vec<&FunctionDef> = runner.registry().iter().collect();
        functions.sort_by_key(|f| f.qualified_name());

        let width = functions
            .iter()
            .map(|f| f.qualified_name().len())
            .max()
            .unwrap_or_default();
        for function in functions {
            println!("{}", format_function(function, width));
        }
        Ok(())
    }
}

fn format_function(function: &FunctionDef, width: usize) -> String {
    let name = format!("{:width$}", function.qualified_name(), width = width);
    format!(
        "{}  {}  {}",
        ColoredOutput::highlight(&name),
        ColoredOutput::dim(&format!("{:9}", function.category.to_string())),
        function.description
    )
}
