use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::daemon::sink::Sink;
use crate::daemon::ticker::{Tick, Ticker};
use crate::domain::mail::{Account, PollState, SeqRange};
use crate::error::{ConnectionError, SessionError};
use crate::mail::mime_text::{ExtractOptions, extract_mail};
use crate::mail::session::{Connector, MailSession};

/// Where the watermark starts on the first tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    /// Treat everything already in the mailbox as seen.
    #[default]
    Current,
    /// Process the whole mailbox on the first tick.
    Beginning,
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub mailbox: String,
    pub start_from: StartPosition,
    pub max_fetch_batch: u32,
    pub extract: ExtractOptions,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            mailbox: "INBOX".to_string(),
            start_from: StartPosition::Current,
            max_fetch_batch: 50,
            extract: ExtractOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Disconnected,
    Connected,
    Ready,
    Selecting,
    Idle,
    Fetching,
    Failed,
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub fetched: usize,
    pub delivered: usize,
    pub malformed: Vec<u32>,
    /// Shutdown arrived between fetch chunks.
    pub interrupted: bool,
    /// Transient failure; the next tick retries.
    pub error: Option<SessionError>,
}

/// Polls one account's mailbox and hands new messages to the sink.
pub struct Poller<C: Connector> {
    account: Account,
    connector: Arc<C>,
    sink: Arc<dyn Sink>,
    config: PollerConfig,
    session: Option<C::Session>,
    state: PollState,
    phase: PollerState,
}

impl<C: Connector> Poller<C> {
    pub fn new(
        account: Account,
        connector: Arc<C>,
        sink: Arc<dyn Sink>,
        config: PollerConfig,
    ) -> Self {
        Self {
            account,
            connector,
            sink,
            config,
            session: None,
            state: PollState::default(),
            phase: PollerState::Disconnected,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn phase(&self) -> PollerState {
        self.phase
    }

    /// Connect, then tick until the ticker reports shutdown.
    ///
    /// Returns the connection error that retired this account, if any. Select
    /// and fetch failures never end the loop.
    pub fn run<T: Ticker>(mut self, ticker: &mut T) -> Result<PollState, ConnectionError> {
        if let Err(e) = self.connect() {
            error!("{}: {e}", self.account.email);
            self.phase = PollerState::Failed;
            return Err(e);
        }
        info!("{}: polling {}", self.account.email, self.config.mailbox);

        while let Tick::Fire = ticker.wait() {
            let report = match self.tick(&*ticker) {
                Ok(report) => report,
                Err(e) => {
                    error!("{}: {e}", self.account.email);
                    self.phase = PollerState::Failed;
                    return Err(e);
                }
            };
            if report.interrupted {
                break;
            }
        }

        self.close();
        Ok(self.state)
    }

    /// One poll: select, compute the new range, fetch and extract it.
    ///
    /// Only a rejected login while reconnecting is an error; everything else is
    /// recorded in the report.
    pub fn tick(&mut self, ticker: &dyn Ticker) -> Result<TickReport, ConnectionError> {
        let mut report = TickReport::default();

        let mut session = match self.session.take() {
            Some(session) => session,
            None => match self.open_session() {
                Ok(session) => {
                    info!("{}: reconnected", self.account.email);
                    session
                }
                Err(e) if e.is_retryable() => {
                    warn!("{}: {e}; retrying next tick", self.account.email);
                    report.error = Some(SessionError::Reconnect(e));
                    return Ok(report);
                }
                Err(e) => return Err(e),
            },
        };
        self.phase = PollerState::Ready;

        match self.poll_session(&mut session, ticker, &mut report) {
            Ok(()) => {
                self.session = Some(session);
                self.phase = PollerState::Ready;
            }
            Err(e) => {
                warn!(
                    "{}: {e}; watermark stays at {}",
                    self.account.email, self.state.last_seen
                );
                // The connection may be broken; start over on the next tick.
                let _ = session.logout();
                self.phase = PollerState::Disconnected;
                report.error = Some(e);
            }
        }
        Ok(report)
    }

    fn poll_session(
        &mut self,
        session: &mut C::Session,
        ticker: &dyn Ticker,
        report: &mut TickReport,
    ) -> Result<(), SessionError> {
        debug!(
            "{}: polling, last seen seq {}",
            self.account.email, self.state.last_seen
        );
        self.phase = PollerState::Selecting;
        let snapshot = session.select_mailbox(&self.config.mailbox)?;

        if !self.state.initialized {
            let start = match self.config.start_from {
                StartPosition::Current => snapshot.total,
                StartPosition::Beginning => 0,
            };
            self.state.advance_to(start);
            info!(
                "{}: {} holds {} messages, starting after seq {}",
                self.account.email, self.config.mailbox, snapshot.total, start
            );
        }

        let Some(range) = SeqRange::after(self.state.last_seen, snapshot.total) else {
            self.phase = PollerState::Idle;
            return Ok(());
        };

        self.phase = PollerState::Fetching;
        for chunk in range.chunks(self.config.max_fetch_batch) {
            if ticker.shutdown_requested() {
                report.interrupted = true;
                break;
            }
            debug!("{}: fetching {chunk}", self.account.email);
            let messages = session.fetch_range(chunk)?;
            report.fetched += messages.len();

            for raw in messages {
                if !chunk.contains(raw.seq) {
                    warn!(
                        "{}: server returned seq {} outside {chunk}, ignoring",
                        self.account.email, raw.seq
                    );
                    continue;
                }
                match extract_mail(&raw, self.config.extract) {
                    Ok(mail) => {
                        self.sink.deliver(&self.account.email, &mail);
                        report.delivered += 1;
                    }
                    Err(e) => {
                        warn!("{}: skipping seq {}: {e}", self.account.email, raw.seq);
                        report.malformed.push(raw.seq);
                    }
                }
                self.state.observe(raw.seq);
            }
        }
        Ok(())
    }

    fn connect(&mut self) -> Result<(), ConnectionError> {
        let session = self.open_session()?;
        self.session = Some(session);
        Ok(())
    }

    fn open_session(&mut self) -> Result<C::Session, ConnectionError> {
        let session = self.connector.connect(&self.account)?;
        self.phase = PollerState::Connected;
        Ok(session)
    }

    fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            match session.logout() {
                Ok(()) => debug!("{}: logged out", self.account.email),
                Err(e) => warn!("{}: {e}", self.account.email),
            }
        }
        self.phase = PollerState::Disconnected;
    }
}
