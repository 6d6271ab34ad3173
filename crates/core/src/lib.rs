//! Core domain for the VR180 conversion client.
//!
//! Pure logic with no network or disk I/O:
//!
//! - [`job`]: job model and status enumeration.
//! - [`lifecycle`]: the job lifecycle state machine.
//! - [`live`]: live update frames and the subscription seam.
//! - [`store`]: the in-memory [`JobStore`] that reconciles REST
//!   snapshots with live updates.
//! - [`media`] / [`forms`]: display helpers and input validation.

pub mod error;
pub mod forms;
pub mod job;
pub mod lifecycle;
pub mod live;
pub mod media;
pub mod store;
pub mod types;

pub use job::{Job, JobId, JobStatus, VideoDetails};
pub use live::{LiveChannel, LiveHandle, LiveMessage, LiveMessageKind, LiveUpdate};
pub use store::{DiscardReason, JobStore, LibraryStats, Outcome, StoreEvent};
