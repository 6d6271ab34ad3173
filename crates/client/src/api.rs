//! REST Gateway for the conversion backend.
//!
//! Wraps the backend's HTTP API (authentication, job listing, video upload,
//! job creation and output download) using [`reqwest`]. Authorized calls carry the stored
//! bearer token; a `401` triggers exactly one token refresh and one retry.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::TryStreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use vr180_core::forms::{LoginForm, RegisterForm};
use vr180_core::job::deserialize_opaque_id;
use vr180_core::media::video_mime_type;
use vr180_core::types::Timestamp;
use vr180_core::{Job, JobId, JobStatus};

use crate::config::ClientConfig;
use crate::error::{extract_detail, AuthFailure, GatewayError};
use crate::session::{AuthTokens, Session, User};
use crate::upload::TransferProgress;

/// Multipart field carrying the uploaded video.
const UPLOAD_FIELD: &str = "original_file";

/// HTTP client for the conversion backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    session: Session,
}

/// Jobs returned by a listing, stamped with the instant the response was
/// received.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub jobs: Vec<Job>,
    pub captured_at: Timestamp,
}

/// Acknowledgment of `vr_conv/upload-video/`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedVideo {
    #[serde(deserialize_with = "deserialize_opaque_id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(alias = "access")]
    token: String,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    detail: Option<String>,
}

/// Job creation acknowledgment. The backend may omit everything but the id.
#[derive(Debug, Deserialize)]
struct CreatedJob {
    id: JobId,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    created_at: Option<Timestamp>,
}

impl ApiClient {
    /// Create a client with its own connection pool.
    pub fn new(config: Arc<ClientConfig>, session: Session) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(http, config, session))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(http: reqwest::Client, config: Arc<ClientConfig>, session: Session) -> Self {
        Self {
            http,
            config,
            session,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// URL the user can open for a completed job's output.
    pub fn media_url(&self, output_location: &str) -> String {
        self.config.media_url(output_location)
    }

    // ---- authentication ----

    /// Sign in and persist the returned tokens.
    pub async fn login(&self, form: &LoginForm) -> Result<Option<User>, GatewayError> {
        let response = self
            .http
            .post(self.config.endpoint("auth/login"))
            .json(form)
            .send()
            .await?;
        let body: LoginResponse = Self::parse_response(response).await?;

        self.session.begin(&AuthTokens {
            access: body.token,
            refresh: body.refresh,
            user: body.user.clone(),
        })?;
        tracing::info!(email = %form.email, "Signed in");
        Ok(body.user)
    }

    /// Create an account. Returns the backend's confirmation text.
    pub async fn register(&self, form: &RegisterForm) -> Result<String, GatewayError> {
        let response = self
            .http
            .post(self.config.endpoint("auth/register"))
            .json(form)
            .send()
            .await?;
        let body: DetailResponse = Self::parse_response(response).await?;
        tracing::info!(email = %form.email, "Registered account");
        Ok(body
            .detail
            .unwrap_or_else(|| "Registration successful.".to_string()))
    }

    /// Sign out. The local session is ended whatever the backend answers.
    pub async fn logout(&self) -> Result<(), GatewayError> {
        let result = async {
            let response = self
                .send_authorized(|http| {
                    Ok(http
                        .post(self.config.endpoint("auth/logout"))
                        .json(&serde_json::json!({})))
                })
                .await?;
            Self::check_status(response).await
        }
        .await;

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Logout request failed");
        }
        self.end_session();
        result
    }

    /// Exchange the refresh token for a new access token and store it.
    ///
    /// A network failure leaves the session in place; any other failure
    /// ends it.
    pub async fn refresh_access_token(&self) -> Result<String, GatewayError> {
        let Some(refresh) = self.session.refresh_token()? else {
            tracing::warn!("No refresh token stored; ending session");
            self.end_session();
            return Err(GatewayError::Auth(AuthFailure::RefreshFailed));
        };

        let result = self
            .http
            .post(self.config.endpoint("auth/refresh/"))
            .json(&serde_json::json!({ "refresh": refresh }))
            .send()
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh request failed");
                return Err(e.into());
            }
        };

        match Self::parse_response::<RefreshResponse>(response).await {
            Ok(body) => {
                self.session.set_access_token(&body.access)?;
                tracing::debug!("Access token refreshed");
                Ok(body.access)
            }
            Err(GatewayError::Network(e)) => Err(GatewayError::Network(e)),
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh rejected; ending session");
                self.end_session();
                Err(GatewayError::Auth(AuthFailure::RefreshFailed))
            }
        }
    }

    // ---- jobs ----

    /// Fetch the user's jobs in backend order.
    pub async fn list_jobs(&self) -> Result<JobSnapshot, GatewayError> {
        let response = self
            .send_authorized(|http| Ok(http.get(self.config.endpoint("vr_conv/jobs/"))))
            .await?;
        let captured_at = Utc::now();
        let jobs: Vec<Job> = Self::parse_response(response).await?;
        tracing::debug!(count = jobs.len(), "Fetched jobs");
        Ok(JobSnapshot { jobs, captured_at })
    }

    /// Start a conversion job for an uploaded video.
    pub async fn create_job(&self, video_id: &str) -> Result<Job, GatewayError> {
        let body = serde_json::json!({ "video": video_id });
        let response = self
            .send_authorized(|http| {
                Ok(http
                    .post(self.config.endpoint("vr_conv/jobs/create/"))
                    .json(&body))
            })
            .await?;
        let created: CreatedJob = Self::parse_response(response).await?;

        let job = Job::new(
            created.id,
            video_id,
            created.created_at.unwrap_or_else(Utc::now),
        )
        .with_status(created.status.unwrap_or(JobStatus::Pending));
        tracing::info!(job_id = %job.id, video_id, status = %job.status, "Job created");
        Ok(job)
    }

    /// Upload a source video as a streamed multipart body.
    ///
    /// `on_progress` sees the number of file bytes handed to the
    /// connection so far. If the upload is retried after a token refresh
    /// the count starts over.
    pub async fn upload_video<F>(&self, path: &Path, on_progress: F) -> Result<UploadedVideo, GatewayError>
    where
        F: Fn(TransferProgress) + Send + Sync + 'static,
    {
        let total = std::fs::metadata(path)?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let mime = video_mime_type(path);
        let on_progress = Arc::new(on_progress);

        let response = self
            .send_authorized(|http| {
                let file = tokio::fs::File::from_std(std::fs::File::open(path)?);
                let on_progress = Arc::clone(&on_progress);
                let mut sent = 0u64;
                let stream = ReaderStream::new(file).inspect_ok(move |chunk| {
                    sent += chunk.len() as u64;
                    on_progress(TransferProgress { sent, total });
                });

                let part = reqwest::multipart::Part::stream_with_length(
                    reqwest::Body::wrap_stream(stream),
                    total,
                )
                .file_name(file_name.clone())
                .mime_str(mime)?;
                let form = reqwest::multipart::Form::new().part(UPLOAD_FIELD, part);

                Ok(http
                    .post(self.config.endpoint("vr_conv/upload-video/"))
                    .multipart(form))
            })
            .await?;

        let video: UploadedVideo = Self::parse_response(response).await?;
        tracing::info!(video_id = %video.id, file = %file_name, bytes = total, "Video uploaded");
        Ok(video)
    }

    /// Save a completed job's output to `dest`, streaming the body.
    ///
    /// Media is served without authentication. A partially written file is
    /// removed on failure. Returns the number of bytes written.
    pub async fn download_output<F>(
        &self,
        output_location: &str,
        dest: &Path,
        on_progress: F,
    ) -> Result<u64, GatewayError>
    where
        F: Fn(TransferProgress),
    {
        let url = self.media_url(output_location);
        let response = Self::ensure_success(self.http.get(&url).send().await?).await?;
        let total = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = std::pin::pin!(response.bytes_stream());
        let mut received = 0u64;

        let copied: Result<(), GatewayError> = async {
            while let Some(chunk) = body.try_next().await? {
                file.write_all(&chunk).await?;
                received += chunk.len() as u64;
                on_progress(TransferProgress {
                    sent: received,
                    total,
                });
            }
            file.flush().await?;
            Ok::<(), GatewayError>(())
        }
        .await;

        if let Err(e) = copied {
            drop(file);
            tracing::warn!(url = %url, file = %dest.display(), error = %e, "Download failed");
            if let Err(rm) = tokio::fs::remove_file(dest).await {
                tracing::debug!(error = %rm, "Could not remove partial download");
            }
            return Err(e);
        }

        tracing::info!(url = %url, file = %dest.display(), bytes = received, "Output downloaded");
        Ok(received)
    }

    // ---- private helpers ----

    /// Send a request with the stored bearer token, refreshing it once on
    /// `401`. `build` is called again for the retry, so it must produce a
    /// fresh request each time.
    async fn send_authorized<F>(&self, build: F) -> Result<reqwest::Response, GatewayError>
    where
        F: Fn(&reqwest::Client) -> Result<reqwest::RequestBuilder, GatewayError>,
    {
        let token = self
            .session
            .access_token()?
            .ok_or(GatewayError::Auth(AuthFailure::MissingToken))?;

        let response = build(&self.http)?.bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!("Access token rejected; refreshing");
        let token = self.refresh_access_token().await?;

        let response = build(&self.http)?.bearer_auth(&token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!("Request rejected after token refresh; ending session");
            self.end_session();
            return Err(GatewayError::Auth(AuthFailure::RefreshFailed));
        }
        Ok(response)
    }

    fn end_session(&self) {
        if let Err(e) = self.session.end() {
            tracing::error!(error = %e, "Failed to clear stored session");
        }
    }

    /// Ensure the response has a success status code. `401`/`403` become
    /// [`GatewayError::Auth`], anything else a [`GatewayError::Server`]
    /// carrying the backend's explanation.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(&body);
        tracing::debug!(status = status.as_u16(), body = %body, "Backend returned an error");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GatewayError::Auth(AuthFailure::Rejected(detail)));
        }
        Err(GatewayError::Server {
            status: status.as_u16(),
            detail,
        })
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), GatewayError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
