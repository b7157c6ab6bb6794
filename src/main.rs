use clap::Parser;
use steward::{Args, DhcpServer, ServerConfig, StewardError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), StewardError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = ServerConfig::try_from(&args)?;

    tracing::info!(
        "Binding to interface '{}' and port {}...",
        config.interface.as_deref().unwrap_or("*"),
        config.port
    );

    let server = DhcpServer::new(config).await?;

    server
        .run(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received shutdown signal, stopping server..."),
                Err(e) => {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
}
