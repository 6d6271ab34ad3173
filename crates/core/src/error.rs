//! Local error types raised by the core crate.
//!
//! None of these cross the Job Store mutation boundary: the store turns
//! them into [`Outcome`](crate::store::Outcome)s and
//! [`StoreEvent`](crate::store::StoreEvent)s instead.

/// A live frame that could not be turned into a [`LiveUpdate`](crate::live::LiveUpdate).
///
/// Never shown to the user; the frame is dropped and reported.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedEvent {
    #[error("Frame is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Field `{field}` has the wrong type")]
    WrongType { field: &'static str },

    #[error("Progress {0} is outside 0..=100")]
    ProgressOutOfRange(f64),
}

/// A status string that is not part of the job lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown job status: {0}")]
pub struct UnknownStatus(pub String);
