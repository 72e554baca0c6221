//! habla — Discord TTS bot entry point

use std::sync::Arc;

use anyhow::Context;
use habla_core::store::SavesStore;
use habla_core::{config, HablaConfig};
use habla_provider_tts::{TtsEngine, VoiceProfile};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = HablaConfig::from_env().context("invalid configuration")?;

    let store = Arc::new(
        SavesStore::load(&config.saves_file, &config.initial_target_users)
            .context("failed to load saves file")?,
    );

    let tts = Arc::new(
        TtsEngine::new(&config.tts_endpoint)
            .with_default_profile(
                VoiceProfile::new(&config.default_voice)
                    .with_rate(&config.default_rate)
                    .with_volume(&config.default_volume),
            )
            .with_max_text_length(config.max_message_length),
    );

    info!(
        endpoint = %config.tts_endpoint,
        voice = %config.default_voice,
        prefix = %config.command_prefix,
        "Starting habla"
    );

    habla_adaptor_discord::run(config, store, tts)
        .await
        .context("Discord client exited with an error")?;

    Ok(())
}
