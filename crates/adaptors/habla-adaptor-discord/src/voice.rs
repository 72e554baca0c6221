//! Voice connection lifecycle and the per-guild playback worker
//!
//! [`VoiceManager`] owns the songbird instance and the queue registry. Join
//! and leave manage the single voice connection per guild; `enqueue` feeds
//! the guild's FIFO and spawns the worker on the first job. The worker
//! plays clips strictly in order, parks while idle, and exits after the
//! idle timeout without closing the voice connection.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use habla_core::{HablaError, Result};
use serenity::model::id::GuildId;
use songbird::input::Input;
use songbird::tracks::PlayMode;
use songbird::{
    Call, Event, EventContext, EventHandler as SongbirdEventHandler, Songbird, TrackEvent,
};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::queue::{GuildQueue, NextJob, QueueRegistry, SpeechJob};

/// Extra wait after the idle timeout before the worker gives up
const IDLE_GRACE: Duration = Duration::from_secs(10);
/// Hard ceiling on a single clip's playback
const PLAYBACK_TIMEOUT: Duration = Duration::from_secs(60);
/// Backoff between re-queue attempts while the connection is missing
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
/// Poll interval while another clip is still playing
const PLAYING_POLL: Duration = Duration::from_millis(500);
/// Pause after an unexpected worker-iteration error
const LOOP_ERROR_PAUSE: Duration = Duration::from_secs(1);
/// Re-queue ceiling before a job is dropped (~5 minutes at the backoff)
const MAX_REQUEUE_ATTEMPTS: u32 = 150;

/// Manages voice connections and playback workers for all guilds
pub struct VoiceManager {
    songbird: Arc<Songbird>,
    registry: Arc<QueueRegistry>,
    idle_timeout: Duration,
}

impl VoiceManager {
    pub fn new(
        songbird: Arc<Songbird>,
        registry: Arc<QueueRegistry>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            songbird,
            registry,
            idle_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    /// Connect to (or move to) `channel_id` in `guild_id` and register the
    /// guild's queue. Joining the channel the bot already occupies is a
    /// no-op.
    pub async fn join_channel(&self, guild_id: u64, channel_id: u64) -> Result<()> {
        let guild = GuildId::new(guild_id);

        if let Some(call_lock) = self.songbird.get(guild) {
            let call = call_lock.lock().await;
            let already_there = call.current_connection().is_some()
                && call.current_channel().map(|c| c.0.get()) == Some(channel_id);
            if already_there {
                debug!(guild_id, channel_id, "Already connected to this channel");
                self.registry.get_or_create(guild_id);
                return Ok(());
            }
        }

        self.songbird
            .join(guild, serenity::model::id::ChannelId::new(channel_id))
            .await
            .map_err(|e| HablaError::connection(format!("failed to join channel: {e}")))?;

        self.registry.get_or_create(guild_id);
        info!(guild_id, channel_id, "Joined voice channel");
        Ok(())
    }

    /// Disconnect from `guild_id`'s voice channel and deregister the
    /// guild. Pending jobs are discarded; the worker observes the removal
    /// and exits. Safe to call while not connected.
    pub async fn leave_channel(&self, guild_id: u64) -> Result<()> {
        let guild = GuildId::new(guild_id);

        if self.songbird.get(guild).is_some() {
            if let Err(e) = self.songbird.remove(guild).await {
                warn!(guild_id, error = %e, "Error closing voice connection");
            }
            info!(guild_id, "Left voice channel");
        } else {
            debug!(guild_id, "Leave requested but not connected");
        }

        self.registry.remove(guild_id);
        Ok(())
    }

    /// Channel id of the active voice connection, if any
    pub async fn current_channel(&self, guild_id: u64) -> Option<u64> {
        let call_lock = self.songbird.get(GuildId::new(guild_id))?;
        let call = call_lock.lock().await;
        if call.current_connection().is_none() {
            return None;
        }
        call.current_channel().map(|c| c.0.get())
    }

    pub async fn is_connected(&self, guild_id: u64) -> bool {
        self.current_channel(guild_id).await.is_some()
    }

    /// Queue a clip for playback. Spawns the guild worker when none is
    /// running; never blocks the caller beyond the registry lock.
    pub fn enqueue(self: &Arc<Self>, guild_id: u64, job: SpeechJob) {
        let queue = self.registry.get_or_create(guild_id);
        let depth = queue.push(job);
        debug!(guild_id, depth, "Queued speech job");

        if queue.try_claim_worker() {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                manager.worker_loop(guild_id).await;
            });
        }
    }

    /// Long-lived consumer for one guild's queue
    async fn worker_loop(self: Arc<Self>, guild_id: u64) {
        info!(guild_id, "Playback worker started");

        loop {
            let Some(queue) = self.registry.get(guild_id) else {
                debug!(guild_id, "Guild deregistered, worker exiting");
                break;
            };

            match queue.next_job(self.idle_timeout, IDLE_GRACE).await {
                NextJob::Empty => continue,
                NextJob::IdleTimeout => {
                    if queue.release_worker_if_empty() {
                        info!(
                            guild_id,
                            idle_secs = self.idle_timeout.as_secs(),
                            "No jobs before idle timeout, worker exiting"
                        );
                        break;
                    }
                    // A job slipped in while releasing; keep serving
                    continue;
                }
                NextJob::Job(job) => {
                    let Some(call_lock) = self.songbird.get(GuildId::new(guild_id)) else {
                        self.requeue(&queue, job, guild_id).await;
                        continue;
                    };
                    let connected = call_lock.lock().await.current_connection().is_some();
                    if !connected {
                        self.requeue(&queue, job, guild_id).await;
                        continue;
                    }

                    while queue.is_playing() {
                        debug!(guild_id, "Previous clip still playing, waiting");
                        tokio::time::sleep(PLAYING_POLL).await;
                    }

                    if let Err(e) = self.play_job(&call_lock, &queue, job).await {
                        error!(guild_id, error = %e, "Playback failed");
                        tokio::time::sleep(LOOP_ERROR_PAUSE).await;
                    }
                }
            }
        }

        info!(guild_id, "Playback worker stopped");
    }

    /// Push a job back to the head of the queue after a missing
    /// connection, dropping it once the attempt ceiling is reached.
    async fn requeue(&self, queue: &GuildQueue, mut job: SpeechJob, guild_id: u64) {
        job.attempts += 1;
        if job.attempts > MAX_REQUEUE_ATTEMPTS {
            warn!(
                guild_id,
                source = %job.source,
                attempts = job.attempts,
                "Dropping job, voice connection never came back"
            );
        } else {
            warn!(
                guild_id,
                source = %job.source,
                attempt = job.attempts,
                "No voice connection, re-queueing job"
            );
            queue.push_front(job);
        }
        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }

    /// Play one clip to completion (or the playback ceiling)
    async fn play_job(
        &self,
        call_lock: &Arc<Mutex<Call>>,
        queue: &GuildQueue,
        job: SpeechJob,
    ) -> Result<()> {
        if job.audio.is_empty() {
            error!(source = %job.source, "Audio clip is empty, skipping");
            return Ok(());
        }

        info!(
            source = %job.source,
            audio_bytes = job.audio.len(),
            "Playing TTS clip"
        );

        let input: Input = job.audio.to_vec().into();
        let handle = {
            let mut call = call_lock.lock().await;
            call.play_input(input)
        };

        let (tx, rx) = oneshot::channel();
        let done = Arc::new(StdMutex::new(Some(tx)));
        let watched = handle
            .add_event(Event::Track(TrackEvent::End), PlaybackDone::new(&done))
            .and_then(|()| {
                handle.add_event(Event::Track(TrackEvent::Error), PlaybackDone::new(&done))
            });
        if let Err(e) = watched {
            // The track is already streaming; without a completion signal
            // it must not be left running behind the worker's back.
            let _ = handle.stop();
            return Err(HablaError::playback(format!(
                "failed to watch track completion: {e}"
            )));
        }

        queue.set_playing(true);
        match tokio::time::timeout(PLAYBACK_TIMEOUT, rx).await {
            Ok(_) => debug!(source = %job.source, "Finished playing clip"),
            Err(_) => {
                warn!(source = %job.source, "Playback hit the 60s ceiling, stopping track");
                let _ = handle.stop();
            }
        }
        queue.set_playing(false);

        Ok(())
    }
}

/// Fires the completion signal when the track ends or errors
struct PlaybackDone {
    tx: Arc<StdMutex<Option<oneshot::Sender<()>>>>,
}

impl PlaybackDone {
    fn new(tx: &Arc<StdMutex<Option<oneshot::Sender<()>>>>) -> Self {
        Self { tx: Arc::clone(tx) }
    }
}

#[async_trait::async_trait]
impl SongbirdEventHandler for PlaybackDone {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (state, _) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    error!(error = ?e, "Track playback error");
                }
            }
        }

        let sender = self
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn manager() -> Arc<VoiceManager> {
        Arc::new(VoiceManager::new(
            Songbird::serenity(),
            Arc::new(QueueRegistry::new()),
            Duration::from_secs(300),
        ))
    }

    fn job(source: &str) -> SpeechJob {
        SpeechJob::new(source, Bytes::from_static(b"audio"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_restores_head_position_and_counts_attempt() {
        let manager = manager();
        let queue = GuildQueue::default();
        queue.push(job("waiting-behind"));

        manager.requeue(&queue, job("lost-connection"), 1).await;

        let head = queue.pop().unwrap();
        assert_eq!(head.source, "lost-connection");
        assert_eq!(head.attempts, 1);
        assert_eq!(queue.pop().unwrap().source, "waiting-behind");
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_keeps_job_below_ceiling() {
        let manager = manager();
        let queue = GuildQueue::default();

        let mut stale = job("last-chance");
        stale.attempts = MAX_REQUEUE_ATTEMPTS - 1;
        manager.requeue(&queue, stale, 1).await;

        let kept = queue.pop().unwrap();
        assert_eq!(kept.source, "last-chance");
        assert_eq!(kept.attempts, MAX_REQUEUE_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_drops_job_at_ceiling() {
        let manager = manager();
        let queue = GuildQueue::default();

        let mut stale = job("abandoned-guild");
        stale.attempts = MAX_REQUEUE_ATTEMPTS;
        manager.requeue(&queue, stale, 1).await;

        assert!(queue.is_empty());
    }
}
