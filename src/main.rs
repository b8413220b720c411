use clap::Parser;
use shopfront_api::cli::Cli;
use shopfront_api::config::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env if present so DATABASE_URL, JWT_SECRET etc. are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("UNHANDLED PANIC! Shutting down... {}", info);
        std::process::exit(1);
    }));

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    tracing::info!("Starting Shopfront API in {:?} mode", config.environment);

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = shopfront_api::cli::run(cli, config).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
