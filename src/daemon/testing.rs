//! In-memory doubles for the session capability, ticker and sink.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::daemon::sink::Sink;
use crate::daemon::ticker::{Tick, Ticker};
use crate::domain::mail::{Account, ExtractedMail, MailboxSnapshot, RawMessage, SeqRange};
use crate::error::{ConnectionError, SessionError};
use crate::mail::session::{Connector, MailSession};

pub fn account(email: &str) -> Account {
    Account {
        email: email.to_string(),
        password: "secret".to_string(),
    }
}

pub fn multipart_mail(n: u32) -> Vec<u8> {
    format!(
        "Subject: message {n}\r\n\
         Content-Type: multipart/alternative; boundary=sep\r\n\
         \r\n\
         --sep\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         text {n}\r\n\
         --sep--\r\n"
    )
    .into_bytes()
}

pub fn malformed_mail() -> Vec<u8> {
    b"Subject: broken\r\nContent-Type: multipart/mixed\r\n\r\nno boundary\r\n".to_vec()
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub messages: Vec<Vec<u8>>,
    pub fetches: Vec<SeqRange>,
    pub selects: usize,
    pub connects: usize,
    pub logouts: usize,
    pub reject_logins: HashSet<String>,
    pub refuse_connections: usize,
    pub fail_selects: usize,
    pub fail_fetches: usize,
    pub reverse_order: bool,
}

/// A single shared mailbox that every account sees.
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    pub state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn with_messages(n: u32) -> Self {
        let server = Self::default();
        server.append(n);
        server
    }

    pub fn append(&self, n: u32) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            let seq = state.messages.len() as u32 + 1;
            state.messages.push(multipart_mail(seq));
        }
    }

    pub fn push_raw(&self, bytes: Vec<u8>) {
        self.state.lock().unwrap().messages.push(bytes);
    }

    pub fn truncate(&self, len: usize) {
        self.state.lock().unwrap().messages.truncate(len);
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ServerState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

impl Connector for FakeServer {
    type Session = FakeSession;

    fn connect(&self, account: &Account) -> Result<FakeSession, ConnectionError> {
        let mut state = self.state.lock().unwrap();
        if state.refuse_connections > 0 {
            state.refuse_connections -= 1;
            return Err(ConnectionError::Connect {
                address: "fake:993".into(),
                reason: "connection refused".into(),
            });
        }
        if state.reject_logins.contains(&account.email) {
            return Err(ConnectionError::Auth {
                email: account.email.clone(),
                reason: "NO [AUTHENTICATIONFAILED]".into(),
            });
        }
        state.connects += 1;
        Ok(FakeSession {
            server: self.clone(),
        })
    }
}

pub struct FakeSession {
    server: FakeServer,
}

impl MailSession for FakeSession {
    fn select_mailbox(&mut self, name: &str) -> Result<MailboxSnapshot, SessionError> {
        self.server.with(|state| {
            state.selects += 1;
            if state.fail_selects > 0 {
                state.fail_selects -= 1;
                return Err(SessionError::Select {
                    mailbox: name.to_string(),
                    reason: "server busy".into(),
                });
            }
            Ok(MailboxSnapshot {
                total: state.messages.len() as u32,
            })
        })
    }

    fn fetch_range(&mut self, range: SeqRange) -> Result<Vec<RawMessage>, SessionError> {
        self.server.with(|state| {
            state.fetches.push(range);
            if state.fail_fetches > 0 {
                state.fail_fetches -= 1;
                return Err(SessionError::Fetch {
                    range,
                    reason: "connection reset".into(),
                });
            }
            let mut out: Vec<RawMessage> = (range.low..=range.high)
                .filter_map(|seq| {
                    state.messages.get(seq as usize - 1).map(|bytes| RawMessage {
                        seq,
                        bytes: bytes.clone(),
                    })
                })
                .collect();
            if state.reverse_order {
                out.reverse();
            }
            Ok(out)
        })
    }

    fn logout(&mut self) -> Result<(), SessionError> {
        self.server.with(|state| state.logouts += 1);
        Ok(())
    }
}

/// Fires `ticks` times, then reports shutdown. `stop_after_chunks` simulates a
/// shutdown signal arriving mid-tick.
#[derive(Debug, Default)]
pub struct ScriptedTicker {
    pub ticks: usize,
    pub stop_after_chunks: Option<usize>,
    pub chunk_checks: std::cell::Cell<usize>,
}

impl ScriptedTicker {
    pub fn new(ticks: usize) -> Self {
        Self {
            ticks,
            ..Self::default()
        }
    }
}

impl Ticker for ScriptedTicker {
    fn wait(&mut self) -> Tick {
        if self.ticks == 0 {
            return Tick::Shutdown;
        }
        self.ticks -= 1;
        Tick::Fire
    }

    fn shutdown_requested(&self) -> bool {
        let checks = self.chunk_checks.get();
        self.chunk_checks.set(checks + 1);
        self.stop_after_chunks.is_some_and(|limit| checks >= limit)
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(String, ExtractedMail)>>,
}

impl RecordingSink {
    pub fn texts(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.text.clone())
            .collect()
    }

    pub fn count_for(&self, account: &str) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a == account)
            .count()
    }
}

impl Sink for RecordingSink {
    fn deliver(&self, account: &str, mail: &ExtractedMail) {
        self.delivered
            .lock()
            .unwrap()
            .push((account.to_string(), mail.clone()));
    }
}
