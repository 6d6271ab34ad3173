//! Conversion job model.
//!
//! A [`Job`] is one 2D-to-VR180 conversion task as the backend reports it.
//! The REST payload nests the source video under `video_details`; the
//! lifecycle fields (`status`, `progress`, `output_file`) are the same
//! ones the live channel pushes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::UnknownStatus;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Opaque backend-assigned job identifier.
///
/// The backend is free to send ids as JSON strings or integers; both
/// forms collapse into the same textual id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_opaque_id(deserializer).map(Self)
    }
}

/// Accept either a string or an integer id and return its textual form.
pub fn deserialize_opaque_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a conversion job.
///
/// `PENDING` and `QUEUED` are both entry states; `COMPLETED`, `FAILED` and
/// `CANCELLED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Position in the fixed lifecycle order. All terminal states share
    /// the highest rank.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Queued => 1,
            JobStatus::Processing => 2,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Wire name, e.g. `"PROCESSING"`.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl TryFrom<String> for JobStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// VideoDetails
// ---------------------------------------------------------------------------

/// Source video metadata embedded in job listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDetails {
    #[serde(deserialize_with = "deserialize_opaque_id")]
    pub id: String,
    #[serde(default)]
    pub original_file: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub filename: String,
    /// Size in bytes.
    #[serde(default)]
    pub filesize: Option<u64>,
    /// Length in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Server-rendered relative age, e.g. `"2 hours ago"`.
    #[serde(default)]
    pub time_ago: Option<String>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One conversion task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    /// Identifier of the uploaded source video.
    pub video_id: String,
    /// Source video metadata, when the backend includes it.
    pub video: Option<VideoDetails>,
    pub status: JobStatus,
    /// Percentage; only meaningful while `status` is `PROCESSING`.
    pub progress: u8,
    /// Produced artifact; only present once `COMPLETED`.
    pub output_location: Option<String>,
    pub created_at: Timestamp,
}

impl Job {
    /// A freshly created job: `PENDING`, no progress, no output.
    pub fn new(id: impl Into<JobId>, video_id: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            video_id: video_id.into(),
            video: None,
            status: JobStatus::Pending,
            progress: 0,
            output_location: None,
            created_at,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    pub fn with_output(mut self, output_location: impl Into<String>) -> Self {
        self.output_location = Some(output_location.into());
        self
    }

    pub fn with_video(mut self, video: VideoDetails) -> Self {
        self.video_id = video.id.clone();
        self.video = Some(video);
        self
    }

    /// Human-facing title: the source filename if known, else the job id.
    pub fn title(&self) -> &str {
        match &self.video {
            Some(v) if !v.filename.is_empty() => &v.filename,
            _ => self.id.as_str(),
        }
    }

    /// Output of a `COMPLETED` job, the only state with something to play.
    pub fn playable_output(&self) -> Option<&str> {
        if self.status != JobStatus::Completed {
            return None;
        }
        self.output_location.as_deref()
    }
}

/// Wire shape of a job as returned by the listing and creation endpoints.
///
/// Listings nest the source under `video_details`; the creation
/// acknowledgment only carries the bare `video` id.
#[derive(Debug, Deserialize)]
struct JobRecord {
    id: JobId,
    #[serde(default)]
    video_details: Option<VideoDetails>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    video: Option<String>,
    status: JobStatus,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    output_file: Option<String>,
    created_at: Timestamp,
}

fn deserialize_optional_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "deserialize_opaque_id")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(id)| id))
}

impl<'de> Deserialize<'de> for Job {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = JobRecord::deserialize(deserializer)?;

        let video_id = record
            .video_details
            .as_ref()
            .map(|v| v.id.clone())
            .or(record.video)
            .unwrap_or_default();

        let progress = record
            .progress
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0) as u8)
            .unwrap_or(0);

        // An output reference only means something for a completed job.
        let output_location = record
            .output_file
            .filter(|o| !o.is_empty() && record.status == JobStatus::Completed);

        Ok(Job {
            id: record.id,
            video_id,
            video: record.video_details,
            status: record.status,
            progress,
            output_location,
            created_at: record.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("processing".parse::<JobStatus>(), Ok(JobStatus::Processing));
        assert_eq!("Completed".parse::<JobStatus>(), Ok(JobStatus::Completed));
        assert_eq!(" QUEUED ".parse::<JobStatus>(), Ok(JobStatus::Queued));
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("RUNNING".parse::<JobStatus>().is_err());
        assert!("".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_states_share_top_rank() {
        for status in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(status.is_terminal());
            assert_eq!(status.rank(), 3);
        }
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Pending.rank() < JobStatus::Queued.rank());
    }

    #[test]
    fn deserialize_listing_entry() {
        let json = r#"{
            "id": 17,
            "video_details": {
                "id": "v-9",
                "original_file": "/media/uploads/beach.mp4",
                "thumbnail": "/media/thumbs/beach.jpg",
                "filename": "beach.mp4",
                "filesize": 5242880,
                "duration": 61.5,
                "time_ago": "2 hours ago"
            },
            "status": "processing",
            "progress": 42,
            "output_file": null,
            "created_at": "2024-01-16T10:00:00Z"
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.id.as_str(), "17");
        assert_eq!(job.video_id, "v-9");
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 42);
        assert!(job.output_location.is_none());
        assert_eq!(job.title(), "beach.mp4");
    }

    #[test]
    fn deserialize_creation_ack_without_details() {
        let json = r#"{"id":"j-1","video":5,"status":"PENDING","created_at":"2024-01-16T10:00:00Z"}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.video_id, "5");
        assert_eq!(job.progress, 0);
        assert!(job.video.is_none());
        assert_eq!(job.title(), "j-1");
    }

    #[test]
    fn output_dropped_unless_completed() {
        let json = r#"{"id":"j","video":"v","status":"FAILED","output_file":"/x.mp4","created_at":"2024-01-16T10:00:00Z"}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert!(job.output_location.is_none());
    }

    #[test]
    fn deserialize_rejects_unknown_status() {
        let json = r#"{"id":"j","video":"v","status":"EXPLODED","created_at":"2024-01-16T10:00:00Z"}"#;
        assert!(serde_json::from_str::<Job>(json).is_err());
    }
}
