//! Upload-then-create flow.
//!
//! Converting a video takes two backend calls: the file upload, then the
//! job creation referencing the uploaded video. Either step can fail on its
//! own; a failed creation leaves an orphan video on the backend, which is
//! reported but not cleaned up.

use std::path::{Path, PathBuf};

use vr180_core::media::{is_supported_video, SUPPORTED_EXTENSIONS};
use vr180_core::Job;

use crate::api::ApiClient;
use crate::error::GatewayError;

/// Bytes of a file moved to or from the backend so far. Unrelated to job
/// progress. `total` is 0 when the size is not known up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub sent: u64,
    pub total: u64,
}

impl TransferProgress {
    /// Rounded percentage; an empty file counts as fully sent.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = (self.sent as f64 * 100.0 / self.total as f64).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

/// Errors from [`upload_and_create`].
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The file extension is not an accepted video format.
    #[error("Unsupported file type: {}", .0.display())]
    UnsupportedFile(PathBuf),

    /// The upload step failed; nothing was created.
    #[error("Upload failed: {0}")]
    Upload(#[source] GatewayError),

    /// The video was uploaded but the job could not be created.
    #[error("Job creation failed for uploaded video {video_id}: {source}")]
    CreateJob {
        /// The uploaded video now without a job.
        video_id: String,
        #[source]
        source: GatewayError,
    },
}

impl UploadError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::UnsupportedFile(_) => format!(
                "Please choose a video file ({}).",
                SUPPORTED_EXTENSIONS
                    .iter()
                    .map(|ext| format!(".{ext}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            UploadError::Upload(e) => e.user_message(),
            UploadError::CreateJob { source, .. } => source.user_message(),
        }
    }

    /// The underlying gateway error, when the failure came from the backend.
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            UploadError::UnsupportedFile(_) => None,
            UploadError::Upload(e) | UploadError::CreateJob { source: e, .. } => Some(e),
        }
    }
}

/// Upload `path` and start a conversion job for it.
///
/// Returns the created job; the caller decides whether to add it to a
/// store.
pub async fn upload_and_create<F>(api: &ApiClient, path: &Path, on_progress: F) -> Result<Job, UploadError>
where
    F: Fn(TransferProgress) + Send + Sync + 'static,
{
    if !is_supported_video(path) {
        tracing::warn!(file = %path.display(), "Rejected unsupported file");
        return Err(UploadError::UnsupportedFile(path.to_path_buf()));
    }

    let video = api
        .upload_video(path, on_progress)
        .await
        .map_err(UploadError::Upload)?;

    match api.create_job(&video.id).await {
        Ok(job) => Ok(job),
        Err(source) => {
            tracing::error!(
                video_id = %video.id,
                error = %source,
                "Job creation failed after upload; video left without a job",
            );
            Err(UploadError::CreateJob {
                video_id: video.id,
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds() {
        let p = TransferProgress { sent: 1, total: 3 };
        assert_eq!(p.percent(), 33);
        let p = TransferProgress { sent: 2, total: 3 };
        assert_eq!(p.percent(), 67);
        let p = TransferProgress { sent: 3, total: 3 };
        assert_eq!(p.percent(), 100);
    }

    #[test]
    fn empty_file_is_complete() {
        assert_eq!(TransferProgress { sent: 0, total: 0 }.percent(), 100);
    }

    #[test]
    fn unsupported_file_message_lists_formats() {
        let err = UploadError::UnsupportedFile(PathBuf::from("notes.txt"));
        assert_eq!(
            err.user_message(),
            "Please choose a video file (.mp4, .avi, .mov, .mkv)."
        );
        assert!(err.gateway_error().is_none());
    }
}
