use crate::domain::mail::SeqRange;

/// Cannot establish or authenticate a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("cannot connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("login rejected for {email}: {reason}")]
    Auth { email: String, reason: String },
}

impl ConnectionError {
    /// Whether retrying later could succeed. A rejected credential never heals.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectionError::Connect { .. })
    }
}

/// A single select or fetch failed; the next tick retries.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("select {mailbox} failed: {reason}")]
    Select { mailbox: String, reason: String },

    #[error("fetch {range} failed: {reason}")]
    Fetch { range: SeqRange, reason: String },

    #[error("logout failed: {0}")]
    Logout(String),

    #[error("reconnect failed: {0}")]
    Reconnect(ConnectionError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MimeError {
    #[error("missing content type")]
    MissingContentType,

    #[error("malformed content type {0:?}")]
    ContentType(String),

    #[error("multipart content type {0:?} has no boundary")]
    MissingBoundary(String),

    #[error("multipart body has no opening delimiter for boundary {0:?}")]
    NoOpeningDelimiter(String),

    #[error("multipart body is not terminated for boundary {0:?}")]
    Unterminated(String),

    #[error("multipart nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("malformed header block: {0}")]
    Header(String),
}
