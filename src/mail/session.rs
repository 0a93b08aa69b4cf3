use crate::domain::mail::{Account, MailboxSnapshot, RawMessage, SeqRange};
use crate::error::{ConnectionError, SessionError};

/// An authenticated mailbox session. Pollers only talk to the server through this.
pub trait MailSession {
    fn select_mailbox(&mut self, name: &str) -> Result<MailboxSnapshot, SessionError>;

    /// Full RFC 822 bodies for `range`. Order is whatever the server sends.
    fn fetch_range(&mut self, range: SeqRange) -> Result<Vec<RawMessage>, SessionError>;

    fn logout(&mut self) -> Result<(), SessionError>;
}

/// Opens and authenticates sessions for an account.
pub trait Connector: Send + Sync {
    type Session: MailSession;

    fn connect(&self, account: &Account) -> Result<Self::Session, ConnectionError>;
}
