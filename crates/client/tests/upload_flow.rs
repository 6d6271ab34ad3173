//! Upload-then-create flow through the `Dashboard`.
//!
//! A failure at either step must leave the job list untouched; only a
//! fully acknowledged job is added.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use assert_matches::assert_matches;
use mockito::{Server, ServerGuard};
use vr180_client::reconnect::ReconnectConfig;
use vr180_client::session::AuthTokens;
use vr180_client::{ApiClient, ClientConfig, Dashboard, GatewayError, Session, UploadError};
use vr180_core::JobStatus;

fn dashboard(server: &ServerGuard) -> Dashboard {
    let mut config = ClientConfig::default();
    config.set_api_url(&format!("{}/api/", server.url())).unwrap();
    config.set_ws_url("ws://127.0.0.1:1/ws/").unwrap();

    let session = Session::in_memory();
    session
        .begin(&AuthTokens {
            access: "acc".into(),
            refresh: None,
            user: None,
        })
        .unwrap();

    let api = ApiClient::new(Arc::new(config), session).unwrap();
    Dashboard::with_reconnect(api, ReconnectConfig::default().with_max_attempts(0))
}

fn video_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".mov").tempfile().unwrap();
    file.write_all(b"not really a movie").unwrap();
    file.flush().unwrap();
    file
}

// ---------------------------------------------------------------------------
// Test: upload failure creates nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_failure_leaves_store_unchanged() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/vr_conv/upload-video/")
        .with_status(413)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail":"File too large"}"#)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/api/vr_conv/jobs/create/")
        .expect(0)
        .create_async()
        .await;

    let mut dashboard = dashboard(&server);
    let file = video_file();
    let err = dashboard.upload(file.path(), |_| {}).await.unwrap_err();

    create.assert_async().await;
    assert_matches!(&err, UploadError::Upload(GatewayError::Server { status: 413, .. }));
    assert_eq!(err.user_message(), "File too large");
    assert!(dashboard.store().is_empty());
}

// ---------------------------------------------------------------------------
// Test: creation failure reports the orphan video
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_failure_reports_orphan_video() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/vr_conv/upload-video/")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 17}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/api/vr_conv/jobs/create/")
        .with_status(500)
        .create_async()
        .await;

    let mut dashboard = dashboard(&server);
    let file = video_file();
    let err = dashboard.upload(file.path(), |_| {}).await.unwrap_err();

    assert_matches!(&err, UploadError::CreateJob { video_id, .. } if video_id == "17");
    assert_eq!(err.user_message(), "Something went wrong. Please try again.");
    assert!(dashboard.store().is_empty());
    assert!(dashboard.is_settled());
}

// ---------------------------------------------------------------------------
// Test: unsupported files never reach the backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsupported_file_is_rejected_locally() {
    let mut server = Server::new_async().await;
    let upload = server
        .mock("POST", "/api/vr_conv/upload-video/")
        .expect(0)
        .create_async()
        .await;

    let mut dashboard = dashboard(&server);
    let err = dashboard
        .upload(Path::new("holiday.gif"), |_| {})
        .await
        .unwrap_err();

    upload.assert_async().await;
    assert_matches!(err, UploadError::UnsupportedFile(_));
    assert!(dashboard.store().is_empty());
}

// ---------------------------------------------------------------------------
// Test: success adds a pending job at the top and subscribes to it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn success_adds_pending_job_first() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/vr_conv/jobs/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"id": 1, "video": 4, "status": "COMPLETED", "progress": 100,
                 "output_file": "/media/a.mp4", "created_at": "2026-01-01T10:00:00Z"}]"#,
        )
        .create_async()
        .await;
    server
        .mock("POST", "/api/vr_conv/upload-video/")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 17}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/api/vr_conv/jobs/create/")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 31, "video": 17, "status": "PENDING"}"#)
        .create_async()
        .await;

    let mut dashboard = dashboard(&server);
    assert_eq!(dashboard.refresh().await.unwrap(), 1);
    assert!(dashboard.is_settled());

    let file = video_file();
    let id = dashboard.upload(file.path(), |_| {}).await.unwrap();

    let jobs = dashboard.store().list();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, id);
    assert_eq!(jobs[0].status, JobStatus::Pending);
    assert_eq!(jobs[0].progress, 0);
    assert!(dashboard.store().has_subscription(&id));

    dashboard.shutdown();
    assert!(dashboard.is_settled());
}
