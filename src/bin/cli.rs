use clap::Parser;
use orderdesk::cli::{self, Cli};
use orderdesk::env::setup_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();
    let cli = Cli::parse();
    let _telemetry_guard = setup_tracing(&cli.env);

    cli::run(cli).await
}
