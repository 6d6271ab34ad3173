//! In-memory Job Store.
//!
//! [`JobStore`] is the single source of truth for the jobs visible to the
//! current session. It merges two sources:
//!
//! - REST snapshots via [`JobStore::replace_all`] (a consistency checkpoint)
//!   and creation acknowledgments via [`JobStore::insert_created`].
//! - Live push updates via [`JobStore::apply_live_event`] /
//!   [`JobStore::handle_live_message`].
//!
//! The store also owns the live subscription registry: it opens one
//! subscription per non-terminal job through its [`LiveChannel`] and
//! closes it as soon as the job reaches a terminal state. Nothing else
//! opens or closes subscriptions.
//!
//! Mutations never fail. Rejected input is reported as an [`Outcome`] to
//! the caller and as a [`StoreEvent`] to subscribers.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::job::{Job, JobId, JobStatus};
use crate::lifecycle::{accepts_progress, can_transition};
use crate::live::{LiveChannel, LiveHandle, LiveMessage, LiveMessageKind, LiveUpdate};
use crate::types::Timestamp;

/// Broadcast channel capacity for store change events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Outcomes and events
// ---------------------------------------------------------------------------

/// Result of applying one live update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// At least one field changed.
    Updated,
    /// The update was valid but changed nothing.
    Unchanged,
    /// No job with that id is in the store.
    UnknownJob,
    /// The update was rejected; the job is untouched.
    Discarded(DiscardReason),
}

/// Why a live update was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// The job already reached a terminal state.
    Terminal,
    /// The update would move the status backwards.
    StatusRegression,
    /// Progress lower than the last observed value.
    StaleProgress,
    /// Received before the latest refresh response for the job.
    PredatesRefresh,
    /// The frame could not be parsed.
    Malformed,
}

/// Change notification published by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// The whole job set was replaced by a refresh.
    Replaced { count: usize },
    /// A newly created job was added.
    Inserted { job_id: JobId },
    /// A job's lifecycle fields changed.
    Updated {
        job_id: JobId,
        status: JobStatus,
        progress: u8,
    },
    /// A job finished successfully and its output is available.
    Completed {
        job_id: JobId,
        output_location: Option<String>,
    },
    /// A live update was dropped.
    Discarded {
        job_id: JobId,
        reason: DiscardReason,
    },
}

/// Counters over the current job set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub total: usize,
    /// `COMPLETED` jobs.
    pub ready: usize,
    /// Jobs in a non-terminal state.
    pub in_progress: usize,
    /// `FAILED` or `CANCELLED` jobs.
    pub unsuccessful: usize,
}

impl LibraryStats {
    /// Count `jobs` by lifecycle.
    pub fn tally<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        jobs.into_iter().fold(Self::default(), |mut stats, job| {
            stats.total += 1;
            match job.status {
                JobStatus::Completed => stats.ready += 1,
                JobStatus::Failed | JobStatus::Cancelled => stats.unsuccessful += 1,
                _ => stats.in_progress += 1,
            }
            stats
        })
    }
}

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

/// Bookkeeping for one job.
#[derive(Debug, Clone)]
struct Entry {
    job: Job,
    /// Capture instant of the REST data this entry was last synced from.
    synced_at: Timestamp,
    /// Receipt instant of the last live update that changed the job.
    live_at: Option<Timestamp>,
}

/// Authoritative in-memory set of jobs plus their live subscriptions.
pub struct JobStore<C: LiveChannel> {
    /// Jobs in display order (backend order, newest creations first).
    jobs: IndexMap<JobId, Entry>,
    /// Open live subscriptions indexed by job id.
    subscriptions: HashMap<JobId, C::Handle>,
    channel: C,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl<C: LiveChannel> JobStore<C> {
    /// Create an empty store that opens subscriptions through `channel`.
    pub fn new(channel: C) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            jobs: IndexMap::new(),
            subscriptions: HashMap::new(),
            channel,
            event_tx,
        }
    }

    /// Subscribe to store change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    /// The channel subscriptions are opened through.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    // ---- reads ----

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id).map(|entry| &entry.job)
    }

    /// All jobs in display order.
    pub fn list(&self) -> Vec<&Job> {
        self.jobs.values().map(|entry| &entry.job).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Output location of a job that can be played back, i.e. a
    /// `COMPLETED` job with an output.
    pub fn playable(&self, id: &JobId) -> Option<&str> {
        self.get(id).and_then(Job::playable_output)
    }

    pub fn stats(&self) -> LibraryStats {
        LibraryStats::tally(self.jobs.values().map(|entry| &entry.job))
    }

    pub fn has_subscription(&self, id: &JobId) -> bool {
        self.subscriptions
            .get(id)
            .is_some_and(|handle| handle.is_active())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .values()
            .filter(|handle| handle.is_active())
            .count()
    }

    // ---- mutations ----

    /// Replace the job set with a REST snapshot captured at `captured_at`.
    ///
    /// Entries are matched by id only. For a job already present, live
    /// state received after `captured_at` wins over the snapshot, and a
    /// snapshot never moves a status backwards or changes a set output.
    /// Subscriptions are opened for non-terminal jobs and closed for
    /// terminal or vanished ones.
    pub fn replace_all(&mut self, jobs: Vec<Job>, captured_at: Timestamp) {
        let mut previous = std::mem::take(&mut self.jobs);
        let mut next = IndexMap::with_capacity(jobs.len());

        for incoming in jobs {
            if next.contains_key(&incoming.id) {
                tracing::warn!(job_id = %incoming.id, "Duplicate job in snapshot ignored");
                continue;
            }
            let entry = match previous.swap_remove(&incoming.id) {
                Some(existing) => merge_snapshot(existing, incoming, captured_at),
                None => Entry {
                    job: incoming,
                    synced_at: captured_at,
                    live_at: None,
                },
            };
            next.insert(entry.job.id.clone(), entry);
        }
        self.jobs = next;

        let vanished: Vec<JobId> = self
            .subscriptions
            .keys()
            .filter(|id| !self.jobs.contains_key(*id))
            .cloned()
            .collect();
        for id in &vanished {
            self.close_subscription(id);
        }

        let lifecycle: Vec<(JobId, bool)> = self
            .jobs
            .values()
            .map(|entry| (entry.job.id.clone(), entry.job.status.is_terminal()))
            .collect();
        for (id, terminal) in &lifecycle {
            if *terminal {
                self.close_subscription(id);
            } else {
                self.ensure_subscription(id);
            }
        }

        tracing::debug!(
            count = self.jobs.len(),
            dropped = vanished.len(),
            subscriptions = self.subscriptions.len(),
            "Job set replaced",
        );
        let _ = self.event_tx.send(StoreEvent::Replaced {
            count: self.jobs.len(),
        });
    }

    /// Add a job from a creation acknowledgment received at `acknowledged_at`.
    ///
    /// New jobs go first. If the id is already known, the acknowledgment is
    /// merged like a one-job snapshot.
    pub fn insert_created(&mut self, job: Job, acknowledged_at: Timestamp) {
        let id = job.id.clone();
        let entry = match self.jobs.shift_remove(&id) {
            Some(existing) => merge_snapshot(existing, job, acknowledged_at),
            None => Entry {
                job,
                synced_at: acknowledged_at,
                live_at: None,
            },
        };
        let terminal = entry.job.status.is_terminal();
        self.jobs.shift_insert(0, id.clone(), entry);

        if terminal {
            self.close_subscription(&id);
        } else {
            self.ensure_subscription(&id);
        }

        tracing::info!(job_id = %id, "Job added to store");
        let _ = self.event_tx.send(StoreEvent::Inserted { job_id: id });
    }

    /// Apply a live update to the job `id`.
    ///
    /// The whole update is rejected if the job is terminal, if it was
    /// received before the job's last refresh, if it moves the status
    /// backwards, or if it lowers the progress of a processing job.
    /// Progress is only taken when the resulting status is `PROCESSING`;
    /// an output location only when it is `COMPLETED` and none is set yet.
    pub fn apply_live_event(&mut self, id: &JobId, update: LiveUpdate) -> Outcome {
        let Some(entry) = self.jobs.get_mut(id) else {
            tracing::trace!(job_id = %id, "Live update for unknown job ignored");
            return Outcome::UnknownJob;
        };

        let current = entry.job.status;
        let target = update.status.unwrap_or(current);

        let rejection = if current.is_terminal() {
            Some(DiscardReason::Terminal)
        } else if update.received_at < entry.synced_at {
            Some(DiscardReason::PredatesRefresh)
        } else if !can_transition(current, target) {
            Some(DiscardReason::StatusRegression)
        } else {
            match update.progress {
                Some(p) if current == JobStatus::Processing
                    && target == JobStatus::Processing
                    && p < entry.job.progress =>
                {
                    Some(DiscardReason::StaleProgress)
                }
                _ => None,
            }
        };
        if let Some(reason) = rejection {
            return self.discard(id, reason);
        }

        let job = &mut entry.job;
        let mut changed = false;

        if target != job.status {
            job.status = target;
            changed = true;
        }
        if let Some(progress) = update.progress.filter(|_| accepts_progress(target)) {
            if progress != job.progress {
                job.progress = progress;
                changed = true;
            }
        }
        if target == JobStatus::Completed && job.output_location.is_none() {
            if let Some(output) = update.output_location {
                job.output_location = Some(output);
                changed = true;
            }
        }
        if changed {
            entry.live_at = Some(update.received_at);
        }

        let status = job.status;
        let progress = job.progress;
        let output_location = job.output_location.clone();

        if changed {
            tracing::debug!(job_id = %id, %status, progress, "Live update applied");
            let _ = self.event_tx.send(StoreEvent::Updated {
                job_id: id.clone(),
                status,
                progress,
            });
        }

        if status.is_terminal() {
            self.close_subscription(id);
            if changed && status == JobStatus::Completed {
                tracing::info!(job_id = %id, output = ?output_location, "Job completed");
                let _ = self.event_tx.send(StoreEvent::Completed {
                    job_id: id.clone(),
                    output_location,
                });
            }
        }

        if changed {
            Outcome::Updated
        } else {
            Outcome::Unchanged
        }
    }

    /// Feed one message from a live channel into the store.
    ///
    /// Frames are parsed and applied; malformed frames are dropped and
    /// reported. Returns the outcome for frames, `None` for lifecycle
    /// messages.
    pub fn handle_live_message(&mut self, message: LiveMessage) -> Option<Outcome> {
        let LiveMessage {
            job_id,
            received_at,
            kind,
        } = message;

        match kind {
            LiveMessageKind::Opened => {
                tracing::debug!(job_id = %job_id, "Live subscription connected");
                None
            }
            LiveMessageKind::Frame(text) => match LiveUpdate::parse(&text, received_at) {
                Ok(update) => Some(self.apply_live_event(&job_id, update)),
                Err(e) => {
                    tracing::warn!(
                        job_id = %job_id,
                        error = %e,
                        raw_message = %text,
                        "Failed to parse live update",
                    );
                    Some(self.discard(&job_id, DiscardReason::Malformed))
                }
            },
            LiveMessageKind::Error(error) => {
                tracing::warn!(job_id = %job_id, error = %error, "Live subscription error");
                None
            }
            LiveMessageKind::Closed => {
                // The subscription gave up on its own. Its task may not have
                // finished yet, so forget it regardless of `is_active` and
                // let the next refresh open a fresh one.
                if let Some(mut handle) = self.subscriptions.remove(&job_id) {
                    handle.close();
                }
                tracing::debug!(job_id = %job_id, "Live subscription closed");
                None
            }
        }
    }

    /// Close every open subscription. Idempotent.
    pub fn close_all(&mut self) {
        let count = self.subscriptions.len();
        for (_, mut handle) in self.subscriptions.drain() {
            handle.close();
        }
        if count > 0 {
            tracing::debug!(count, "Closed all live subscriptions");
        }
    }

    // ---- private helpers ----

    fn discard(&self, id: &JobId, reason: DiscardReason) -> Outcome {
        tracing::debug!(job_id = %id, ?reason, "Live update discarded");
        let _ = self.event_tx.send(StoreEvent::Discarded {
            job_id: id.clone(),
            reason,
        });
        Outcome::Discarded(reason)
    }

    /// Open a subscription for a non-terminal job unless one is active.
    fn ensure_subscription(&mut self, id: &JobId) {
        let Some(entry) = self.jobs.get(id) else {
            return;
        };
        if entry.job.status.is_terminal() || self.has_subscription(id) {
            return;
        }

        let handle = self.channel.open(id);
        if let Some(mut stale) = self.subscriptions.insert(id.clone(), handle) {
            stale.close();
        }
        tracing::debug!(job_id = %id, "Live subscription opened");
    }

    fn close_subscription(&mut self, id: &JobId) {
        if let Some(mut handle) = self.subscriptions.remove(id) {
            handle.close();
            tracing::debug!(job_id = %id, "Live subscription closed by store");
        }
    }
}

impl<C: LiveChannel> Drop for JobStore<C> {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Merge a snapshot record into an existing entry.
fn merge_snapshot(existing: Entry, incoming: Job, captured_at: Timestamp) -> Entry {
    let mut job = incoming;
    let kept = &existing.job;

    let live_is_newer = existing.live_at.is_some_and(|at| at > captured_at);
    let would_regress = (kept.status.is_terminal() && job.status != kept.status)
        || job.status.rank() < kept.status.rank();

    if live_is_newer || would_regress {
        if would_regress {
            tracing::debug!(
                job_id = %job.id,
                kept = %kept.status,
                snapshot = %job.status,
                "Snapshot status would regress; keeping current lifecycle",
            );
        }
        job.status = kept.status;
        job.progress = kept.progress;
        job.output_location = kept.output_location.clone();
    }
    if kept.output_location.is_some() {
        job.output_location = kept.output_location.clone();
    }

    Entry {
        job,
        synced_at: captured_at.max(existing.synced_at),
        live_at: existing.live_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn entry(job: Job, synced: i64, live: Option<i64>) -> Entry {
        Entry {
            job,
            synced_at: at(synced),
            live_at: live.map(at),
        }
    }

    #[test]
    fn newer_snapshot_wins() {
        let existing = entry(
            Job::new("a", "v", at(0)).with_status(JobStatus::Queued),
            0,
            Some(5),
        );
        let snapshot = Job::new("a", "v", at(0))
            .with_status(JobStatus::Processing)
            .with_progress(30);

        let merged = merge_snapshot(existing, snapshot, at(10));
        assert_eq!(merged.job.status, JobStatus::Processing);
        assert_eq!(merged.job.progress, 30);
        assert_eq!(merged.synced_at, at(10));
    }

    #[test]
    fn newer_live_state_wins_over_older_snapshot() {
        let existing = entry(
            Job::new("a", "v", at(0))
                .with_status(JobStatus::Processing)
                .with_progress(70),
            0,
            Some(20),
        );
        let snapshot = Job::new("a", "v", at(0))
            .with_status(JobStatus::Processing)
            .with_progress(40);

        let merged = merge_snapshot(existing, snapshot, at(10));
        assert_eq!(merged.job.progress, 70);
        assert_eq!(merged.live_at, Some(at(20)));
    }

    #[test]
    fn snapshot_never_reopens_terminal_job() {
        let existing = entry(
            Job::new("a", "v", at(0))
                .with_status(JobStatus::Completed)
                .with_output("/x.mp4"),
            0,
            Some(5),
        );
        let snapshot = Job::new("a", "v", at(0)).with_status(JobStatus::Processing);

        let merged = merge_snapshot(existing, snapshot, at(10));
        assert_eq!(merged.job.status, JobStatus::Completed);
        assert_eq!(merged.job.output_location.as_deref(), Some("/x.mp4"));
    }

    #[test]
    fn snapshot_keeps_existing_output() {
        let existing = entry(
            Job::new("a", "v", at(0))
                .with_status(JobStatus::Completed)
                .with_output("/first.mp4"),
            0,
            None,
        );
        let snapshot = Job::new("a", "v", at(0))
            .with_status(JobStatus::Completed)
            .with_output("/second.mp4");

        let merged = merge_snapshot(existing, snapshot, at(10));
        assert_eq!(merged.job.output_location.as_deref(), Some("/first.mp4"));
    }
}
