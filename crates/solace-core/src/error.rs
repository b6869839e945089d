//! Error taxonomy for remote-backed state.
//!
//! Every failure of a remote call is recovered locally: an optimistic
//! mutation rolls back and the caller gets one of these values to show
//! as a notice. Nothing here is fatal to the view.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no local record with id {id}")]
    NotFound { id: String },

    #[error("record {id} already has a pending operation")]
    Busy { id: String },

    #[error("request failed: {0}")]
    TransportFailure(String),

    #[error("backend rejected the request with status {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    #[error("could not obtain an access token: {0}")]
    Unauthenticated(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("the view owning this collection is closed")]
    Detached,

    #[error("invalid input: {0}")]
    Invalid(String),
}

impl SyncError {
    pub fn not_found(id: impl ToString) -> Self {
        SyncError::NotFound { id: id.to_string() }
    }

    pub fn busy(id: impl ToString) -> Self {
        SyncError::Busy { id: id.to_string() }
    }

    /// True for failures that came back from (or on the way to) the
    /// backend. These are the ones that roll an optimistic value back.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            SyncError::TransportFailure(_)
                | SyncError::RemoteRejected { .. }
                | SyncError::Unauthenticated(_)
                | SyncError::MalformedPayload(_)
        )
    }

    /// Short message suitable for a toast or a status line.
    pub fn notice(&self) -> &'static str {
        match self {
            SyncError::NotFound { .. } => "That item no longer exists.",
            SyncError::Busy { .. } => "Still saving the previous change.",
            SyncError::TransportFailure(_) => "Could not reach the server. Change reverted.",
            SyncError::RemoteRejected { .. } => "The server refused the change. Change reverted.",
            SyncError::Unauthenticated(_) => "Your session expired. Sign in again.",
            SyncError::MalformedPayload(_) => "The server sent an unexpected response.",
            SyncError::Detached => "The view was closed.",
            SyncError::Invalid(_) => "Please check the form and try again.",
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::MalformedPayload(err.to_string())
        } else {
            SyncError::TransportFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::MalformedPayload(err.to_string())
    }
}
