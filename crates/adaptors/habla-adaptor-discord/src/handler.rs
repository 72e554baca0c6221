//! Gateway event handler: message routing and the command layer

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use habla_core::store::SavesStore;
use habla_core::{normalize, HablaConfig};
use habla_provider_tts::TtsEngine;
use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::{GuildId, UserId};
use serenity::model::voice::VoiceState;
use serenity::prelude::{Context, EventHandler};
use tracing::{debug, error, info, warn};

use crate::queue::SpeechJob;
use crate::voice::VoiceManager;

/// (guild, user) -> voice channel, fed by gateway voice-state updates.
/// Fallback for when the cache misses a user's voice state.
pub type VoiceStateMap = Arc<RwLock<HashMap<(u64, u64), u64>>>;

/// Split a command body into the command word and its argument tail
pub(crate) fn parse_command(body: &str) -> (String, &str) {
    let mut parts = body.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or("").to_lowercase();
    let args = parts.next().unwrap_or("").trim();
    (command, args)
}

/// Display name used for whitelist checks and clip attribution: server
/// nick, then global name, then account name
pub(crate) fn display_name(msg: &Message) -> String {
    msg.member
        .as_ref()
        .and_then(|m| m.nick.clone())
        .or_else(|| msg.author.global_name.clone())
        .unwrap_or_else(|| msg.author.name.clone())
}

pub struct Handler {
    config: HablaConfig,
    store: Arc<SavesStore>,
    tts: Arc<TtsEngine>,
    voice: Arc<VoiceManager>,
    voice_states: VoiceStateMap,
}

impl Handler {
    pub fn new(
        config: HablaConfig,
        store: Arc<SavesStore>,
        tts: Arc<TtsEngine>,
        voice: Arc<VoiceManager>,
    ) -> Self {
        Self {
            config,
            store,
            tts,
            voice,
            voice_states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn reply(&self, ctx: &Context, msg: &Message, text: impl Into<String>) {
        if let Err(e) = msg.channel_id.say(&ctx.http, text.into()).await {
            warn!(error = %e, "Failed to send reply");
        }
    }

    /// Voice channel the user currently occupies, if known
    fn user_voice_channel(&self, ctx: &Context, guild_id: u64, user_id: u64) -> Option<u64> {
        if let Ok(states) = self.voice_states.read() {
            if let Some(channel) = states.get(&(guild_id, user_id)) {
                return Some(*channel);
            }
        }
        let guild = ctx.cache.guild(GuildId::new(guild_id))?;
        guild
            .voice_states
            .get(&UserId::new(user_id))
            .and_then(|vs| vs.channel_id)
            .map(|c| c.get())
    }

    /// Non-command message path: whitelist, placement and binding checks,
    /// then normalize -> synthesize -> enqueue.
    async fn route_tts(&self, ctx: &Context, msg: &Message, guild_id: u64) {
        let name = display_name(msg);

        if !self.store.is_target(&name) {
            return;
        }
        if self.store.is_silenced(&name) {
            debug!(user = %name, "User is silenced, skipping");
            return;
        }
        if msg.content.trim().is_empty() {
            return;
        }

        let Some(user_channel) = self.user_voice_channel(ctx, guild_id, msg.author.id.get())
        else {
            debug!(user = %name, "User not in a voice channel, skipping");
            return;
        };
        if self.voice.current_channel(guild_id).await != Some(user_channel) {
            debug!(user = %name, "Bot not in the user's voice channel, skipping");
            return;
        }

        let bound = self.voice.registry().get(guild_id).and_then(|q| q.bound_text_channel());
        if bound != Some(msg.channel_id.get()) {
            debug!(
                guild_id,
                channel_id = msg.channel_id.get(),
                "Message outside the bound text channel, skipping"
            );
            return;
        }

        self.speak(ctx, msg, guild_id, &name, &msg.content).await;
    }

    /// Normalize, synthesize with the user's voice (or the default) and
    /// hand the clip to the playback pipeline.
    async fn speak(&self, ctx: &Context, msg: &Message, guild_id: u64, name: &str, text: &str) {
        let normalized = normalize::normalize(text);
        let profile = self
            .store
            .voice_for(name)
            .map(|v| self.tts.profile_for(&v))
            .unwrap_or_else(|| self.tts.default_profile().clone());

        match self.tts.synthesize(&normalized, &profile).await {
            Ok(audio) => {
                self.voice.enqueue(guild_id, SpeechJob::new(name, audio));
            }
            Err(e) => {
                error!(user = %name, error = %e, "Speech synthesis failed");
                self.reply(ctx, msg, format!("❌ Error generating speech: {e}"))
                    .await;
            }
        }
    }

    async fn handle_command(&self, ctx: &Context, msg: &Message, guild_id: u64, body: &str) {
        let (command, args) = parse_command(body);
        match command.as_str() {
            "join" => self.cmd_join(ctx, msg, guild_id).await,
            "leave" => self.cmd_leave(ctx, msg, guild_id).await,
            "status" => self.cmd_status(ctx, msg, guild_id).await,
            "say" => self.cmd_say(ctx, msg, guild_id, args).await,
            "voices" => self.cmd_voices(ctx, msg).await,
            "setvoice" => self.cmd_setvoice(ctx, msg, args).await,
            "adduser" => self.cmd_adduser(ctx, msg, args).await,
            "removeuser" => self.cmd_removeuser(ctx, msg, args).await,
            "mute" => self.cmd_mute(ctx, msg, args).await,
            "unmute" => self.cmd_unmute(ctx, msg, args).await,
            "ping" => self.reply(ctx, msg, "Pong! 🏓").await,
            "help" => self.cmd_help(ctx, msg).await,
            _ => {}
        }
    }

    async fn cmd_join(&self, ctx: &Context, msg: &Message, guild_id: u64) {
        let Some(channel_id) = self.user_voice_channel(ctx, guild_id, msg.author.id.get()) else {
            self.reply(ctx, msg, "❌ You must be in a voice channel first")
                .await;
            return;
        };

        match self.voice.join_channel(guild_id, channel_id).await {
            Ok(()) => {
                let text_channel = msg.channel_id.get();
                if let Some(queue) = self.voice.registry().get(guild_id) {
                    queue.bind_text_channel(text_channel);
                }
                if let Err(e) = self
                    .store
                    .set_binding(guild_id, text_channel)
                    .and_then(|_| self.store.save())
                {
                    warn!(error = %e, "Failed to persist channel binding");
                }
                self.reply(
                    ctx,
                    msg,
                    "✅ Joined your voice channel. I will read messages from this text channel.",
                )
                .await;
            }
            Err(e) => {
                error!(guild_id, error = %e, "Failed to join voice channel");
                self.reply(ctx, msg, format!("❌ Could not join: {e}")).await;
            }
        }
    }

    async fn cmd_leave(&self, ctx: &Context, msg: &Message, guild_id: u64) {
        if let Err(e) = self.voice.leave_channel(guild_id).await {
            error!(guild_id, error = %e, "Failed to leave voice channel");
        }
        if let Err(e) = self
            .store
            .clear_binding(guild_id)
            .and_then(|_| self.store.save())
        {
            warn!(error = %e, "Failed to persist channel unbinding");
        }
        self.reply(ctx, msg, "👋 Left the voice channel").await;
    }

    async fn cmd_status(&self, ctx: &Context, msg: &Message, guild_id: u64) {
        let connected = self.voice.current_channel(guild_id).await;
        let (depth, worker, bound) = match self.voice.registry().get(guild_id) {
            Some(q) => (q.len(), q.worker_active(), q.bound_text_channel()),
            None => (0, false, None),
        };

        let mut lines = vec![
            "**Status**".to_string(),
            match connected {
                Some(c) => format!("Voice: connected to <#{c}>"),
                None => "Voice: not connected".to_string(),
            },
            match bound {
                Some(c) => format!("Bound text channel: <#{c}>"),
                None => "Bound text channel: none".to_string(),
            },
            format!("Queued clips: {depth}"),
            format!("Worker: {}", if worker { "running" } else { "idle" }),
        ];

        let targets = self.store.target_users();
        lines.push(if targets.is_empty() {
            "Reading messages from: nobody".to_string()
        } else {
            format!("Reading messages from: {}", targets.join(", "))
        });
        for (user, voice) in self.store.user_voices() {
            lines.push(format!("Voice for {user}: {voice}"));
        }

        self.reply(ctx, msg, lines.join("\n")).await;
    }

    async fn cmd_say(&self, ctx: &Context, msg: &Message, guild_id: u64, args: &str) {
        if args.is_empty() {
            self.reply(ctx, msg, "Usage: `say <text>`").await;
            return;
        }
        if !self.voice.is_connected(guild_id).await {
            self.reply(ctx, msg, "❌ Not connected to a voice channel")
                .await;
            return;
        }
        let name = display_name(msg);
        self.speak(ctx, msg, guild_id, &name, args).await;
    }

    async fn cmd_voices(&self, ctx: &Context, msg: &Message) {
        match self.tts.available_voices().await {
            Ok(voices) => {
                let mut lines = vec!["**Available voices**".to_string()];
                for v in voices.iter().take(25) {
                    lines.push(format!(
                        "• `{}` ({}, {})",
                        v.short_name,
                        v.locale,
                        v.gender.as_str()
                    ));
                }
                if voices.len() > 25 {
                    lines.push(format!("… and {} more", voices.len() - 25));
                }
                self.reply(ctx, msg, lines.join("\n")).await;
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch voice catalog");
                self.reply(ctx, msg, format!("❌ Could not list voices: {e}"))
                    .await;
            }
        }
    }

    async fn cmd_setvoice(&self, ctx: &Context, msg: &Message, args: &str) {
        let (user, voice) = match args.rsplit_once(char::is_whitespace) {
            Some((user, voice)) if !user.trim().is_empty() => (user.trim(), voice.trim()),
            _ => {
                self.reply(ctx, msg, "Usage: `setvoice <user> <voice>`").await;
                return;
            }
        };
        match self
            .store
            .set_voice(user, voice)
            .and_then(|_| self.store.save())
        {
            Ok(()) => {
                self.reply(ctx, msg, format!("🗣️ {user} will now speak with `{voice}`"))
                    .await;
            }
            Err(e) => {
                error!(error = %e, "Failed to persist voice override");
                self.reply(ctx, msg, "❌ Could not save the voice setting")
                    .await;
            }
        }
    }

    async fn cmd_adduser(&self, ctx: &Context, msg: &Message, args: &str) {
        if args.is_empty() {
            self.reply(ctx, msg, "Usage: `adduser <display name>`").await;
            return;
        }
        match self.store.add_target(args).and_then(|added| {
            self.store.save()?;
            Ok(added)
        }) {
            Ok(true) => {
                self.reply(ctx, msg, format!("✅ Now reading messages from **{args}**"))
                    .await;
            }
            Ok(false) => {
                self.reply(ctx, msg, format!("**{args}** is already on the list"))
                    .await;
            }
            Err(e) => {
                error!(error = %e, "Failed to persist whitelist");
                self.reply(ctx, msg, "❌ Could not save the user list").await;
            }
        }
    }

    async fn cmd_removeuser(&self, ctx: &Context, msg: &Message, args: &str) {
        if args.is_empty() {
            self.reply(ctx, msg, "Usage: `removeuser <display name>`")
                .await;
            return;
        }
        match self.store.remove_target(args).and_then(|removed| {
            self.store.save()?;
            Ok(removed)
        }) {
            Ok(true) => {
                self.reply(ctx, msg, format!("✅ Stopped reading messages from **{args}**"))
                    .await;
            }
            Ok(false) => {
                self.reply(ctx, msg, format!("**{args}** was not on the list"))
                    .await;
            }
            Err(e) => {
                error!(error = %e, "Failed to persist whitelist");
                self.reply(ctx, msg, "❌ Could not save the user list").await;
            }
        }
    }

    async fn cmd_mute(&self, ctx: &Context, msg: &Message, args: &str) {
        if args.is_empty() {
            self.reply(ctx, msg, "Usage: `mute <display name>`").await;
            return;
        }
        if self.store.silence(args) {
            self.reply(ctx, msg, format!("🔇 **{args}** muted for this session"))
                .await;
        } else {
            self.reply(ctx, msg, format!("**{args}** is already muted")).await;
        }
    }

    async fn cmd_unmute(&self, ctx: &Context, msg: &Message, args: &str) {
        if args.is_empty() {
            self.reply(ctx, msg, "Usage: `unmute <display name>`").await;
            return;
        }
        if self.store.unsilence(args) {
            self.reply(ctx, msg, format!("🔊 **{args}** unmuted")).await;
        } else {
            self.reply(ctx, msg, format!("**{args}** was not muted")).await;
        }
    }

    async fn cmd_help(&self, ctx: &Context, msg: &Message) {
        let p = &self.config.command_prefix;
        let text = format!(
            "**Commands**\n\
             `{p}join` — join your voice channel and bind this text channel\n\
             `{p}leave` — leave the voice channel\n\
             `{p}status` — connection, queue and user list\n\
             `{p}say <text>` — speak a test message\n\
             `{p}voices` — list available Spanish voices\n\
             `{p}setvoice <user> <voice>` — set a user's voice\n\
             `{p}adduser <user>` / `{p}removeuser <user>` — manage the list\n\
             `{p}mute <user>` / `{p}unmute <user>` — silence for this session\n\
             `{p}ping` — latency check"
        );
        self.reply(ctx, msg, text).await;
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "Bot connected to Discord");

        // Prime persisted text-channel bindings into the registry
        for (guild_id, channel_id) in self.store.bindings() {
            self.voice
                .registry()
                .get_or_create(guild_id)
                .bind_text_channel(channel_id);
            debug!(guild_id, channel_id, "Restored text channel binding");
        }
    }

    async fn voice_state_update(&self, _ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else { return };
        let key = (guild_id.get(), new.user_id.get());

        match self.voice_states.write() {
            Ok(mut states) => match new.channel_id {
                Some(channel) => {
                    states.insert(key, channel.get());
                }
                None => {
                    states.remove(&key);
                }
            },
            Err(_) => warn!("Voice state tracker lock poisoned"),
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id.map(|g| g.get()) else {
            return;
        };

        if let Some(body) = msg.content.strip_prefix(&self.config.command_prefix) {
            if !body.is_empty() {
                let (command, _) = parse_command(body);
                if is_known_command(&command) {
                    self.handle_command(&ctx, &msg, guild_id, body).await;
                    return;
                }
            }
        }

        self.route_tts(&ctx, &msg, guild_id).await;
    }
}

fn is_known_command(command: &str) -> bool {
    matches!(
        command,
        "join"
            | "leave"
            | "status"
            | "say"
            | "voices"
            | "setvoice"
            | "adduser"
            | "removeuser"
            | "mute"
            | "unmute"
            | "ping"
            | "help"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_splits_args() {
        let (cmd, args) = parse_command("say hola que tal");
        assert_eq!(cmd, "say");
        assert_eq!(args, "hola que tal");
    }

    #[test]
    fn test_parse_command_no_args() {
        let (cmd, args) = parse_command("join");
        assert_eq!(cmd, "join");
        assert_eq!(args, "");
    }

    #[test]
    fn test_parse_command_lowercases() {
        let (cmd, _) = parse_command("JOIN");
        assert_eq!(cmd, "join");
    }

    #[test]
    fn test_parse_command_trims_args() {
        let (cmd, args) = parse_command("setvoice   Alice   es-MX-DaliaNeural  ");
        assert_eq!(cmd, "setvoice");
        assert_eq!(args, "Alice   es-MX-DaliaNeural");
    }

    #[test]
    fn test_known_commands() {
        assert!(is_known_command("join"));
        assert!(is_known_command("setvoice"));
        assert!(!is_known_command("banhammer"));
        // Plain words that merely start with the prefix stay TTS messages
        assert!(!is_known_command("engo"));
    }
}
