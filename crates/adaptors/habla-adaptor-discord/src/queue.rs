//! Per-guild speech job queues
//!
//! Each active guild owns a [`GuildQueue`]: a FIFO of synthesized clips, a
//! `Notify` the worker parks on, and the flags that enforce the one-worker,
//! one-playback invariants. The [`QueueRegistry`] maps guild ids to queues
//! and is the single source of truth for "does guild G have a pipeline".
//!
//! Guild ids are plain `u64` here so everything in this module is
//! constructible in tests without gateway types.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;

/// One synthesized clip waiting to be played
#[derive(Debug, Clone)]
pub struct SpeechJob {
    /// Display name of the user the clip speaks for
    pub source: String,
    /// Encoded audio payload
    pub audio: Bytes,
    /// Times this job was pushed back after a missing connection
    pub attempts: u32,
}

impl SpeechJob {
    pub fn new(source: impl Into<String>, audio: Bytes) -> Self {
        Self {
            source: source.into(),
            audio,
            attempts: 0,
        }
    }
}

/// Outcome of one wait on the queue
#[derive(Debug)]
pub enum NextJob {
    /// A job was dequeued
    Job(SpeechJob),
    /// Woken but the queue was empty (leave, or a racing consumer)
    Empty,
    /// Idle timeout plus grace elapsed with nothing queued
    IdleTimeout,
}

/// Per-guild pipeline state
#[derive(Debug, Default)]
pub struct GuildQueue {
    jobs: Mutex<VecDeque<SpeechJob>>,
    notify: Notify,
    worker_running: AtomicBool,
    playing: AtomicBool,
    bound_text_channel: Mutex<Option<u64>>,
}

impl GuildQueue {
    /// Append a job and wake the worker. Returns the new queue depth.
    pub fn push(&self, job: SpeechJob) -> usize {
        let depth = {
            let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
            jobs.push_back(job);
            jobs.len()
        };
        self.notify.notify_one();
        depth
    }

    /// Put a job back at the head of the queue (connection-loss re-queue)
    pub fn push_front(&self, job: SpeechJob) {
        {
            let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
            jobs.push_front(job);
        }
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<SpeechJob> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all pending jobs
    pub fn clear(&self) {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Wake every parked waiter (used on leave so the worker re-checks
    /// the registry)
    pub fn wake(&self) {
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Claim the worker slot. Only the caller observing false -> true
    /// spawns a worker task.
    pub fn try_claim_worker(&self) -> bool {
        self.worker_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn worker_active(&self) -> bool {
        self.worker_running.load(Ordering::Acquire)
    }

    /// Release the worker slot, but only while the queue is empty. Holding
    /// the jobs lock across the store means a concurrent `push` either
    /// lands before the check (slot stays claimed) or after the release
    /// (its `try_claim_worker` spawns a fresh worker). Returns true when
    /// released.
    pub fn release_worker_if_empty(&self) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if jobs.is_empty() {
            self.worker_running.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn bind_text_channel(&self, channel_id: u64) {
        *self
            .bound_text_channel
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(channel_id);
    }

    pub fn unbind_text_channel(&self) {
        *self
            .bound_text_channel
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn bound_text_channel(&self) -> Option<u64> {
        *self
            .bound_text_channel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for the next job.
    ///
    /// Pops immediately when a job is pending; otherwise parks on the
    /// notifier up to `idle`. On wake the queue is re-checked (an empty
    /// result means the caller should re-examine the registry). On idle
    /// expiry the worker gets one `grace`-long reprieve: only if the queue
    /// is still empty afterwards does this return [`NextJob::IdleTimeout`].
    pub async fn next_job(&self, idle: Duration, grace: Duration) -> NextJob {
        if let Some(job) = self.pop() {
            return NextJob::Job(job);
        }

        match tokio::time::timeout(idle, self.notify.notified()).await {
            Ok(()) => match self.pop() {
                Some(job) => NextJob::Job(job),
                None => NextJob::Empty,
            },
            Err(_) => {
                if let Some(job) = self.pop() {
                    return NextJob::Job(job);
                }
                tokio::time::sleep(grace).await;
                match self.pop() {
                    Some(job) => NextJob::Job(job),
                    None => NextJob::IdleTimeout,
                }
            }
        }
    }
}

/// All guild queues, keyed by guild id
#[derive(Debug, Default)]
pub struct QueueRegistry {
    guilds: Mutex<HashMap<u64, Arc<GuildQueue>>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: u64) -> Option<Arc<GuildQueue>> {
        self.guilds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&guild_id)
            .cloned()
    }

    /// Fetch the queue for `guild_id`, creating it atomically if absent
    pub fn get_or_create(&self, guild_id: u64) -> Arc<GuildQueue> {
        self.guilds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(guild_id)
            .or_default()
            .clone()
    }

    pub fn contains(&self, guild_id: u64) -> bool {
        self.guilds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&guild_id)
    }

    /// Deregister a guild. Pending jobs are discarded and any parked
    /// worker is woken so it observes the removal and exits.
    pub fn remove(&self, guild_id: u64) -> Option<Arc<GuildQueue>> {
        let queue = self
            .guilds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&guild_id)?;
        queue.clear();
        queue.wake();
        Some(queue)
    }

    pub fn guild_ids(&self) -> Vec<u64> {
        self.guilds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn job(source: &str) -> SpeechJob {
        SpeechJob::new(source, Bytes::from_static(b"audio"))
    }

    #[test]
    fn test_fifo_order() {
        let queue = GuildQueue::default();
        queue.push(job("a"));
        queue.push(job("b"));
        queue.push(job("c"));

        assert_eq!(queue.pop().unwrap().source, "a");
        assert_eq!(queue.pop().unwrap().source, "b");
        assert_eq!(queue.pop().unwrap().source, "c");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_push_front_takes_priority() {
        let queue = GuildQueue::default();
        queue.push(job("second"));
        queue.push_front(job("first"));
        assert_eq!(queue.pop().unwrap().source, "first");
        assert_eq!(queue.pop().unwrap().source, "second");
    }

    #[test]
    fn test_worker_claim_single_winner() {
        let queue = GuildQueue::default();
        assert!(queue.try_claim_worker());
        assert!(!queue.try_claim_worker());
        assert!(queue.worker_active());
    }

    #[test]
    fn test_release_only_when_empty() {
        let queue = GuildQueue::default();
        assert!(queue.try_claim_worker());

        queue.push(job("pending"));
        assert!(!queue.release_worker_if_empty());
        assert!(queue.worker_active());

        queue.pop();
        assert!(queue.release_worker_if_empty());
        assert!(!queue.worker_active());
        assert!(queue.try_claim_worker());
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_claim_one_worker() {
        let registry = Arc::new(QueueRegistry::new());
        let claims = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            let claims = Arc::clone(&claims);
            handles.push(tokio::spawn(async move {
                let queue = registry.get_or_create(42);
                queue.push(job(&format!("user-{i}")));
                if queue.try_claim_worker() {
                    claims.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(claims.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get(42).unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_next_job_returns_pending_immediately() {
        let queue = GuildQueue::default();
        queue.push(job("ready"));
        match queue
            .next_job(Duration::from_millis(10), Duration::from_millis(1))
            .await
        {
            NextJob::Job(j) => assert_eq!(j.source, "ready"),
            other => panic!("expected job, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_next_job_wakes_on_push() {
        let queue = Arc::new(GuildQueue::default());
        let producer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(job("late"));
        });

        match queue
            .next_job(Duration::from_secs(5), Duration::from_millis(1))
            .await
        {
            NextJob::Job(j) => assert_eq!(j.source, "late"),
            other => panic!("expected job, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_next_job_idle_timeout_when_empty() {
        let queue = GuildQueue::default();
        match queue
            .next_job(Duration::from_millis(20), Duration::from_millis(5))
            .await
        {
            NextJob::IdleTimeout => {}
            other => panic!("expected idle timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_grace_period_rescues_late_job() {
        let queue = Arc::new(GuildQueue::default());
        let producer = Arc::clone(&queue);
        // Lands after the idle window but inside the grace re-check
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            producer.push(job("rescued"));
        });

        match queue
            .next_job(Duration::from_millis(20), Duration::from_millis(100))
            .await
        {
            NextJob::Job(j) => assert_eq!(j.source, "rescued"),
            other => panic!("expected rescued job, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remove_wakes_parked_worker() {
        let registry = Arc::new(QueueRegistry::new());
        let queue = registry.get_or_create(7);

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .next_job(Duration::from_secs(5), Duration::from_millis(1))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.remove(7);

        match waiter.await.unwrap() {
            NextJob::Empty => {}
            other => panic!("expected empty wake, got {other:?}"),
        }
        assert!(!registry.contains(7));
    }

    #[test]
    fn test_binding_lifecycle() {
        let registry = QueueRegistry::new();
        let queue = registry.get_or_create(1);
        queue.bind_text_channel(555);
        assert_eq!(queue.bound_text_channel(), Some(555));

        queue.unbind_text_channel();
        assert_eq!(queue.bound_text_channel(), None);

        // Removal drops the binding with the entry
        queue.bind_text_channel(556);
        registry.remove(1);
        assert!(registry.get(1).is_none());
    }
}
