//! GraphGuard engine entry point

use clap::Parser;
use tracing::info;

use graphguard_config::AppSettings;
use graphguard_fraud_engine::cli::{run_command, Cli, Console};
use graphguard_fraud_engine::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = AppSettings::load_from_dir(&cli.config_dir)?;
    graphguard_logging::init(&settings.logging);
    info!(
        environment = %settings.application.environment,
        "starting graphguard"
    );

    let orchestrator = Orchestrator::build(settings).await?;
    orchestrator.warmup().await?;

    let result = match cli.command {
        Some(command) => run_command(&orchestrator, command).await,
        None => Console::new(orchestrator.clone()).run().await,
    };

    orchestrator.shutdown().await;
    result?;
    Ok(())
}
