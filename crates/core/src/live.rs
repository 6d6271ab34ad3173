//! Live update frames and the channel seam used by the Job Store.
//!
//! The backend pushes flat JSON frames over a per-job connection:
//!
//! ```json
//! {"status": "PROCESSING", "progress": 55, "output_file": "/media/out.mp4"}
//! ```
//!
//! Every field is optional. [`LiveUpdate::parse`] turns one frame into a
//! typed partial update; a channel implementation delivers frames as an
//! ordered stream of [`LiveMessage`]s per job.

use serde_json::Value;

use crate::error::MalformedEvent;
use crate::job::{JobId, JobStatus};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// LiveUpdate
// ---------------------------------------------------------------------------

/// A partial update for one job. Absent fields leave the job unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub output_location: Option<String>,
    /// When the frame carrying this update was received.
    pub received_at: Timestamp,
}

impl LiveUpdate {
    /// An empty update received at `received_at`.
    pub fn new(received_at: Timestamp) -> Self {
        Self {
            status: None,
            progress: None,
            output_location: None,
            received_at,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_output(mut self, output_location: impl Into<String>) -> Self {
        self.output_location = Some(output_location.into());
        self
    }

    /// Parse a raw text frame.
    ///
    /// `null` fields count as absent. Fractional progress is truncated.
    pub fn parse(text: &str, received_at: Timestamp) -> Result<Self, MalformedEvent> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| MalformedEvent::InvalidJson(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(MalformedEvent::NotAnObject);
        };

        let status = match fields.get("status") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(
                s.parse::<JobStatus>()
                    .map_err(|_| MalformedEvent::UnknownStatus(s.clone()))?,
            ),
            Some(_) => return Err(MalformedEvent::WrongType { field: "status" }),
        };

        let progress = match fields.get("progress") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => {
                let raw = n
                    .as_f64()
                    .ok_or(MalformedEvent::WrongType { field: "progress" })?;
                if !(0.0..=100.0).contains(&raw) {
                    return Err(MalformedEvent::ProgressOutOfRange(raw));
                }
                Some(raw as u8)
            }
            Some(_) => return Err(MalformedEvent::WrongType { field: "progress" }),
        };

        let output_location = match fields.get("output_file") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(MalformedEvent::WrongType { field: "output_file" }),
        };

        Ok(Self {
            status,
            progress,
            output_location,
            received_at,
        })
    }
}

// ---------------------------------------------------------------------------
// LiveMessage
// ---------------------------------------------------------------------------

/// One item of a job's live event stream, in receipt order.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveMessage {
    pub job_id: JobId,
    pub received_at: Timestamp,
    pub kind: LiveMessageKind,
}

/// Connection lifecycle and payload events of a live subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessageKind {
    /// The connection was established (or re-established).
    Opened,
    /// A raw text frame, not yet parsed.
    Frame(String),
    /// The subscription ended and will not deliver anything else.
    Closed,
    /// A connection-level failure; the subscription may still recover.
    Error(String),
}

impl LiveMessage {
    pub fn new(job_id: JobId, received_at: Timestamp, kind: LiveMessageKind) -> Self {
        Self {
            job_id,
            received_at,
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Channel seam
// ---------------------------------------------------------------------------

/// Opens per-job live subscriptions.
///
/// Only the Job Store calls this; it keeps the returned handles in its
/// subscription registry.
pub trait LiveChannel {
    type Handle: LiveHandle;

    /// Start delivering live messages for `job_id`.
    fn open(&self, job_id: &JobId) -> Self::Handle;
}

/// Handle to one open subscription.
pub trait LiveHandle {
    /// Stop the subscription. Safe to call any number of times.
    fn close(&mut self);

    /// `false` once the subscription was closed or gave up on its own.
    fn is_active(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    #[test]
    fn parse_full_frame() {
        let now = Utc::now();
        let update =
            LiveUpdate::parse(r#"{"status":"COMPLETED","progress":100,"output_file":"/x.mp4"}"#, now)
                .unwrap();
        assert_eq!(update.status, Some(JobStatus::Completed));
        assert_eq!(update.progress, Some(100));
        assert_eq!(update.output_location.as_deref(), Some("/x.mp4"));
        assert_eq!(update.received_at, now);
    }

    #[test]
    fn parse_progress_only() {
        let update = LiveUpdate::parse(r#"{"progress":55}"#, Utc::now()).unwrap();
        assert!(update.status.is_none());
        assert_eq!(update.progress, Some(55));
    }

    #[test]
    fn parse_lowercase_status() {
        let update = LiveUpdate::parse(r#"{"status":"queued"}"#, Utc::now()).unwrap();
        assert_eq!(update.status, Some(JobStatus::Queued));
    }

    #[test]
    fn parse_truncates_fractional_progress() {
        let update = LiveUpdate::parse(r#"{"progress":41.9}"#, Utc::now()).unwrap();
        assert_eq!(update.progress, Some(41));
    }

    #[test]
    fn parse_null_fields_are_absent() {
        let update =
            LiveUpdate::parse(r#"{"status":null,"progress":null,"output_file":null}"#, Utc::now())
                .unwrap();
        assert_eq!(update.status, None);
        assert_eq!(update.progress, None);
        assert_eq!(update.output_location, None);
    }

    #[test]
    fn parse_unknown_status_is_malformed() {
        let err = LiveUpdate::parse(r#"{"status":"EXPLODED"}"#, Utc::now()).unwrap_err();
        assert_matches!(err, MalformedEvent::UnknownStatus(s) if s == "EXPLODED");
    }

    #[test]
    fn parse_string_progress_is_malformed() {
        let err = LiveUpdate::parse(r#"{"progress":"55"}"#, Utc::now()).unwrap_err();
        assert_matches!(err, MalformedEvent::WrongType { field: "progress" });
    }

    #[test]
    fn parse_out_of_range_progress_is_malformed() {
        assert_matches!(
            LiveUpdate::parse(r#"{"progress":140}"#, Utc::now()),
            Err(MalformedEvent::ProgressOutOfRange(_))
        );
        assert_matches!(
            LiveUpdate::parse(r#"{"progress":-1}"#, Utc::now()),
            Err(MalformedEvent::ProgressOutOfRange(_))
        );
    }

    #[test]
    fn parse_non_object_is_malformed() {
        assert_matches!(
            LiveUpdate::parse("[1,2,3]", Utc::now()),
            Err(MalformedEvent::NotAnObject)
        );
    }

    #[test]
    fn parse_garbage_is_malformed() {
        assert_matches!(
            LiveUpdate::parse("not json at all", Utc::now()),
            Err(MalformedEvent::InvalidJson(_))
        );
    }
}
