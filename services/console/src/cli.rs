use crate::demo::{run_demo, run_evaluate, DemoArgs, EvaluateArgs};
use clap::{Parser, Subcommand};
use credit_origination::config::AppConfig;
use credit_origination::error::AppError;
use credit_origination::telemetry;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "Credit Origination Console",
    about = "Exercise the credit-card origination workflows from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an end-to-end demo over in-memory stores (default command)
    Demo(DemoArgs),
    /// Score a pair of bureau payloads and print the underwriting verdict
    Evaluate(EvaluateArgs),
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    debug!(environment = ?config.environment, "configuration loaded");

    let command = cli
        .command
        .unwrap_or_else(|| Command::Demo(DemoArgs::default()));

    match command {
        Command::Demo(args) => run_demo(args, &config.origination).await,
        Command::Evaluate(args) => run_evaluate(args, &config.origination),
    }
}
