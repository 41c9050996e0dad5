//! Pending action queue, mirrored to the local cache.
//!
//! Entries are replayed strictly in insertion order, one remote call at a
//! time. An applied entry is removed (and the cache rewritten) before the next
//! one starts; a failed entry keeps its place.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actions::{PendingAction, StepFailure};
use crate::cache::{CacheError, CacheKey, LocalCache};
use crate::types::{FailedAction, ReplayReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    /// Never attempted, or only interrupted by the network.
    Pending,
    /// Rejected at least once; kept for another attempt.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: Uuid,
    pub action: PendingAction,
    pub enqueued_at: DateTime<Utc>,
    /// Rejections so far. Network failures do not count.
    #[serde(default)]
    pub attempts: u32,
    /// Remote steps of `action` already applied.
    #[serde(default)]
    pub completed_steps: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueuedAction {
    pub fn status(&self) -> ActionStatus {
        if self.attempts > 0 {
            ActionStatus::Failed
        } else {
            ActionStatus::Pending
        }
    }

    fn failed(&self) -> FailedAction {
        FailedAction {
            id: self.id,
            action: self.action.name().to_string(),
            attempts: self.attempts,
            error: self.last_error.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingQueue {
    entries: Vec<QueuedAction>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the queue persisted by a previous session.
    pub async fn load(cache: &LocalCache) -> Result<Self, CacheError> {
        let entries = cache.load(CacheKey::PendingActions).await?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[QueuedAction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append to the in-memory queue and rewrite the cached copy.
    pub async fn enqueue(&mut self, action: PendingAction, cache: &LocalCache) -> QueuedAction {
        self.enqueue_partial(action, 0, cache).await
    }

    /// Enqueue an action whose first `completed_steps` remote steps already went through.
    pub async fn enqueue_partial(
        &mut self,
        action: PendingAction,
        completed_steps: u32,
        cache: &LocalCache,
    ) -> QueuedAction {
        let entry = QueuedAction {
            id: Uuid::now_v7(),
            action,
            enqueued_at: Utc::now(),
            attempts: 0,
            completed_steps,
            last_error: None,
        };

        tracing::debug!(
            action_id = %entry.id,
            action = entry.action.name(),
            queued = self.entries.len() + 1,
            "action queued"
        );

        self.entries.push(entry.clone());
        self.persist(cache).await;
        entry
    }

    /// Replay every entry in order through `apply`.
    ///
    /// - applied: removed immediately;
    /// - network failure: kept, attempt count unchanged;
    /// - rejection: kept with `attempts + 1`, or dropped (and logged) once
    ///   `max_attempts` is reached.
    ///
    /// Later entries are attempted whatever happened to earlier ones.
    pub async fn drain_in_order<F, Fut>(
        &mut self,
        cache: &LocalCache,
        max_attempts: u32,
        mut apply: F,
    ) -> ReplayReport
    where
        F: FnMut(QueuedAction) -> Fut,
        Fut: Future<Output = Result<(), StepFailure>>,
    {
        let mut report = ReplayReport::default();
        let mut index = 0;

        while index < self.entries.len() {
            let entry = self.entries[index].clone();

            match apply(entry.clone()).await {
                Ok(()) => {
                    self.entries.remove(index);
                    tracing::debug!(action_id = %entry.id, action = entry.action.name(), "replayed");
                    report.applied.push(entry.id);
                }
                Err(failure) => {
                    let slot = &mut self.entries[index];
                    slot.completed_steps = failure.completed_steps;
                    slot.last_error = Some(failure.error.to_string());

                    if failure.error.is_network() {
                        tracing::warn!(
                            action_id = %slot.id,
                            action = slot.action.name(),
                            error = %failure.error,
                            "replay interrupted by network; keeping action"
                        );
                        report.retained.push(slot.failed());
                        index += 1;
                    } else {
                        slot.attempts += 1;
                        if slot.attempts >= max_attempts {
                            let dropped = self.entries.remove(index);
                            tracing::error!(
                                action_id = %dropped.id,
                                action = dropped.action.name(),
                                attempts = dropped.attempts,
                                error = %failure.error,
                                payload = ?dropped.action,
                                "dropping action after repeated rejections"
                            );
                            report.dropped.push(dropped.failed());
                        } else {
                            tracing::warn!(
                                action_id = %slot.id,
                                action = slot.action.name(),
                                attempts = slot.attempts,
                                error = %failure.error,
                                "replay rejected; keeping action"
                            );
                            report.retained.push(slot.failed());
                            index += 1;
                        }
                    }
                }
            }

            self.persist(cache).await;
        }

        report
    }

    async fn persist(&self, cache: &LocalCache) {
        if let Err(err) = cache.save(CacheKey::PendingActions, &self.entries).await {
            tracing::error!("failed to persist pending actions: {err:?}");
        }
    }
}
