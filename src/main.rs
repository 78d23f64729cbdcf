use anyhow::Result;
use tracing_subscriber::EnvFilter;

use duet::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    // 日志写到 stderr，对话内容走 stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("duet=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    run_cli().await
}
