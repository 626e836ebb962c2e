use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use reqwest::Client as HttpClient;
use serenity::all::{Client, GatewayIntents};
use songbird::{SerenityInit, Songbird};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod announcer;
mod commands;
mod config;
mod embeds;
mod error;
mod events;
mod music;

use crate::announcer::Announcer;
use crate::config::Config;
use crate::events::Handler;
use crate::music::{PlayerManager, SongbirdConnector, YtDlpResolver};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,jengbot=debug")),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        idle_timeout = ?config.idle_timeout,
        max_queue_len = ?config.max_queue_len,
        ytdlp = %config.ytdlp_path,
        "Loaded configuration"
    );

    let songbird = Songbird::serenity();
    let resolver = YtDlpResolver::new(config.ytdlp_path.clone(), config.ytdlp_cookies.clone());
    let connector = SongbirdConnector::new(songbird.clone(), HttpClient::new());
    let (player, events) = PlayerManager::new(
        Arc::new(resolver),
        Arc::new(connector),
        config.player_settings(),
    );

    let announcer = Arc::new(Announcer::default());
    let handler = Handler {
        player: Arc::new(player),
        announcer: announcer.clone(),
    };

    let mut client = Client::builder(
        &config.discord_token,
        GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES,
    )
    .event_handler(handler)
    .register_songbird_with(songbird)
    .await?;

    tokio::spawn(announcer.run(client.http.clone(), events));

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    // Shards will automatically attempt to reconnect, and will perform
    // exponential backoff until it reconnects.
    if let Err(why) = client.start().await {
        error!("Client error: {why:?}");
    }

    Ok(())
}
