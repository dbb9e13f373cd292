//! Run an action and write its records

use crate::cli::{Product, RunArgs};
use crate::error::CliResult;
use crate::utils::{ensure_parent_dir, format_duration, ColoredOutput, ConsoleProgress};
use crate::writer::RecordWriter;
use fcli_config::RunnerConfig;
use fcli_runtime::{ActionResult, ActionRunner, OutputSink, RunSummary};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct RunCommand;

impl RunCommand {
    /// Run the action and return the process exit code for its outcome.
    pub async fn run(config: &RunnerConfig, product: &Product, args: &RunArgs) -> CliResult<i32> {
        let writer = Arc::new(Self::writer(args)?);
        let runner = ActionRunner::from_config(config, product.backends())?
            .with_progress(Arc::new(ConsoleProgress))
            .with_sink(writer.clone())
            .with_strict(config.strict || args.strict);

        let document = runner.load(&args.action)?;
        let params = args.parameters()?;
        info!(action = %document.name, product = %product.kind(), params = params.len(), "running action");

        let start = Instant::now();
        let result = runner.run_until(&document, params, interrupted()).await;
        // Records written before a failure or interrupt stay valid output.
        let summary = settle(result, writer.finish())?;

        report(&summary, writer.written(), start.elapsed());
        Ok(summary.exit_code())
    }

    fn writer(args: &RunArgs) -> CliResult<RecordWriter> {
        Ok(match &args.output_file {
            Some(path) => {
                ensure_parent_dir(path)?;
                let file = File::create(path)?;
                RecordWriter::new(args.output, Box::new(BufWriter::new(file)))
            }
            None => RecordWriter::stdout(args.output),
        })
    }
}

/// The run's error wins over a failure to finish the record stream.
fn settle<T>(result: ActionResult<T>, finished: ActionResult<()>) -> CliResult<T> {
    let value = result?;
    finished?;
    Ok(value)
}

/// Completes on SIGINT. Never completes when the handler cannot be installed.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for interrupts");
        std::future::pending::<()>().await;
    }
}

fn report(summary: &RunSummary, written: usize, elapsed: std::time::Duration) {
    info!(
        action = %summary.action,
        records = written,
        failed_items = summary.failed_items,
        exit_code = summary.exit_code(),
        "run finished in {}",
        format_duration(elapsed)
    );
    if summary.failed_items > 0 {
        eprintln!(
            "{} {} request item(s) failed{}",
            ColoredOutput::warning("WARN:"),
            summary.failed_items,
            if summary.strict { "" } else { "; see records marked FAILED" }
        );
    }
    for check in summary.failed_checks() {
        eprintln!("{} check '{}' failed", ColoredOutput::error("FAIL:"), check.name);
    }
}
