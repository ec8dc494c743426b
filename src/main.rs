mod ai;
mod bot;
mod commands;
mod config;
mod directory;
mod dispatch;
mod error;
mod router;
mod rules;
mod tickets;

use ai::{GroqClient, IntentClassifier};
use anyhow::Result;
use bot::{Handler, ShardManagerContainer};
use config::Config;
use router::{MessageRouter, RouterSettings};
use rules::RuleMatcher;
use serenity::prelude::*;
use std::sync::Arc;
use tickets::{FlowEngine, TicketStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");

    let store = TicketStore::load(&config.store_path).await?;

    let completion = Arc::new(GroqClient::new(
        config.groq_api_key.clone(),
        config.groq_api_url.clone(),
        config.groq_model.clone(),
        config.classifier_timeout,
    ));
    let router = Arc::new(MessageRouter::new(
        RouterSettings::from_config(&config),
        RuleMatcher::new(config.directory.clone()),
        IntentClassifier::new(completion, config.classifier_timeout),
        FlowEngine::new(store),
    ));
    let handler = Handler::new(router);

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await?;

    {
        let mut data = client.data.write().await;
        data.insert::<ShardManagerContainer>(client.shard_manager.clone());
    }

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, closing shards");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting SMH Manager...");

    if let Err(e) = client.start().await {
        error!("Client error: {:?}", e);
    }

    Ok(())
}
