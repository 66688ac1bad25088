pub mod store;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::relay::types::Answer;
use store::CacheStore;
use types::{CacheEntry, TtlPolicy};

/// Source of "now" for TTL checks.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Request to the cache actor.
enum CacheCommand {
    Get {
        key: String,
        reply: oneshot::Sender<Option<Answer>>,
    },
    Put {
        key: String,
        value: Answer,
        reply: oneshot::Sender<()>,
    },
    Clear {
        reply: oneshot::Sender<Result<usize>>,
    },
}

/// Handle to the single task that owns the cache store. Every get/put/clear
/// is queued and applied one at a time, so read-modify-write cycles from
/// concurrent requests cannot interleave.
#[derive(Clone)]
pub struct CacheHandle {
    tx: mpsc::Sender<CacheCommand>,
}

impl CacheHandle {
    pub fn spawn<S: CacheStore>(store: S, policy: TtlPolicy) -> Self {
        Self::spawn_with_clock(store, policy, Arc::new(Utc::now))
    }

    pub fn spawn_with_clock<S: CacheStore>(store: S, policy: TtlPolicy, clock: Clock) -> Self {
        let (tx, mut rx) = mpsc::channel::<CacheCommand>(64);

        tokio::spawn(async move {
            debug!("cache actor started");
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    CacheCommand::Get { key, reply } => {
                        let value = match store.load(&key).await {
                            Ok(Some(entry)) if policy.is_fresh(&entry, clock()) => Some(entry.value),
                            Ok(_) => None,
                            Err(e) => {
                                warn!(key = %key, "cache read failed, treating as miss: {:#}", e);
                                None
                            }
                        };
                        let _ = reply.send(value);
                    }
                    CacheCommand::Put { key, value, reply } => {
                        let entry = CacheEntry::new(value, clock());
                        if let Err(e) = store.save(&key, &entry).await {
                            warn!(key = %key, "cache write failed: {:#}", e);
                        }
                        let _ = reply.send(());
                    }
                    CacheCommand::Clear { reply } => {
                        let _ = reply.send(store.clear().await);
                    }
                }
            }
            debug!("cache actor shutting down");
        });

        Self { tx }
    }

    /// Fresh cached answer for `key`. Any failure reads as a miss.
    pub async fn get(&self, key: &str) -> Option<Answer> {
        let (reply, rx) = oneshot::channel();
        let cmd = CacheCommand::Get {
            key: key.to_string(),
            reply,
        };
        if self.tx.send(cmd).await.is_err() {
            warn!("cache actor gone, treating as miss");
            return None;
        }
        rx.await.unwrap_or(None)
    }

    /// Overwrite `key` with `value`, stamped with the current time.
    pub async fn put(&self, key: &str, value: Answer) {
        let (reply, rx) = oneshot::channel();
        let cmd = CacheCommand::Put {
            key: key.to_string(),
            value,
            reply,
        };
        if self.tx.send(cmd).await.is_err() {
            warn!("cache actor gone, dropping write");
            return;
        }
        let _ = rx.await;
    }

    pub async fn clear(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CacheCommand::Clear { reply })
            .await
            .map_err(|_| anyhow::anyhow!("cache actor gone"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("cache actor reply channel closed"))?
    }
}
