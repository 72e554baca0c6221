//! Discord adaptor for the habla bot
//!
//! Wires the serenity gateway to the TTS pipeline: the [`Handler`] routes
//! messages and commands, the [`QueueRegistry`] holds per-guild FIFO
//! queues, and the [`VoiceManager`] drives songbird playback workers.

#![warn(clippy::all)]

pub mod handler;
pub mod queue;
pub mod voice;

use std::sync::Arc;
use std::time::Duration;

use habla_core::store::SavesStore;
use habla_core::{HablaConfig, HablaError, Result};
use habla_provider_tts::TtsEngine;
use serenity::prelude::GatewayIntents;
use songbird::{SerenityInit, Songbird};
use tracing::info;

pub use handler::Handler;
pub use queue::{GuildQueue, NextJob, QueueRegistry, SpeechJob};
pub use voice::VoiceManager;

/// Build the Discord client and run it until the gateway shuts down
pub async fn run(config: HablaConfig, store: Arc<SavesStore>, tts: Arc<TtsEngine>) -> Result<()> {
    let songbird = Songbird::serenity();
    let registry = Arc::new(QueueRegistry::new());
    let voice = Arc::new(VoiceManager::new(
        Arc::clone(&songbird),
        registry,
        Duration::from_secs(config.audio_timeout_secs),
    ));

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_VOICE_STATES;

    let handler = Handler::new(config.clone(), store, tts, voice);

    let mut client = serenity::Client::builder(&config.token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await
        .map_err(|e| HablaError::discord(format!("failed to build client: {e}")))?;

    info!("Starting Discord client");
    client
        .start()
        .await
        .map_err(|e| HablaError::discord(format!("gateway error: {e}")))
}
