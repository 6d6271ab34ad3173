//! Network side of the VR180 conversion client.
//!
//! - [`api`]: REST gateway with bearer auth and a single token refresh.
//! - [`live`]: per-job WebSocket subscriptions feeding the job store.
//! - [`upload`]: the upload-then-create flow.
//! - [`dashboard`]: ties the gateway, store and live channel together.
//! - [`session`] / [`config`]: persisted tokens and environment settings.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod live;
pub mod reconnect;
pub mod session;
pub mod upload;

pub use api::{ApiClient, JobSnapshot, UploadedVideo};
pub use config::{ClientConfig, ConfigError};
pub use dashboard::Dashboard;
pub use error::{AuthFailure, GatewayError};
pub use live::{LiveSubscription, WsLiveChannel};
pub use session::{Session, User};
pub use upload::{upload_and_create, UploadError, TransferProgress};
