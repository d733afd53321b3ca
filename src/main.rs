use clap::Parser;
use projectmeta::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so `extract` output stays valid JSON.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    run(cli)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "projectmeta failed"))
}
