use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;

use crate::config::{AppConfig, StoreBackend};
use crate::database::models::{Role, User};
use crate::database::{DatabaseManager, DocumentStore, MemoryStore, PgStore};
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "shopfront-api")]
#[command(about = "Shopfront API - accounts, product catalog and reviews")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve,

    #[command(about = "Apply database migrations and exit")]
    Migrate,

    #[command(about = "Grant the admin role to an existing user")]
    Promote {
        #[arg(help = "Email of the user to promote")]
        email: String,
    },
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Migrate => {
            let pool = DatabaseManager::connect(&config.database).await?;
            DatabaseManager::migrate(&pool).await?;
            DatabaseManager::close(pool).await;
            Ok(())
        }
        Commands::Promote { email } => promote(config, &email).await,
    }
}

/// Opens the configured store, migrating Postgres first.
async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.database.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = DatabaseManager::connect(&config.database).await?;
            DatabaseManager::migrate(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let store = open_store(&config).await?;
    let state = AppState::new(config, store);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Shopfront API listening on http://{}", bind_addr);

    axum::serve(listener, crate::app(state)).await?;
    Ok(())
}

async fn promote(config: AppConfig, email: &str) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let repo = crate::database::Repository::<User>::new(store);

    let mut user = repo
        .select_one(json!({ "email": email.trim().to_lowercase() }))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no user with email {}", email))?;
    user.role = Role::Admin;
    let user = repo.save(user).await?;

    tracing::info!("{} is now an admin", user.email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::parse_from(["shopfront-api"]);
        assert_eq!(cli.command, None);

        let cli = Cli::parse_from(["shopfront-api", "promote", "ada@example.com"]);
        assert_eq!(cli.command, Some(Commands::Promote { email: "ada@example.com".into() }));
    }
}
