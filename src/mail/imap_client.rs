use log::debug;
use native_tls::{TlsConnector, TlsStream};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::domain::mail::{Account, MailboxSnapshot, RawMessage, SeqRange};
use crate::error::{ConnectionError, SessionError};
use crate::mail::session::{Connector, MailSession};

const DEFAULT_IMAPS_PORT: u16 = 993;
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to an IMAP server over implicit TLS.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    pub host: String,
    pub port: u16,
    /// Bounds the TCP connect and every socket read and write.
    pub timeout: Duration,
}

impl ImapConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accepts `host` or `host:port`; the port defaults to 993.
    pub fn from_address(address: &str) -> Result<Self, ConnectionError> {
        let address = address.trim();
        let bad = |reason: &str| ConnectionError::Connect {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| bad("invalid port"))?;
                (host, port)
            }
            None => (address, DEFAULT_IMAPS_PORT),
        };
        if host.is_empty() {
            return Err(bad("missing host"));
        }
        Ok(Self::new(host, port))
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect_error(&self, reason: impl std::fmt::Display) -> ConnectionError {
        ConnectionError::Connect {
            address: self.address(),
            reason: reason.to_string(),
        }
    }

    fn open_stream(&self) -> Result<TlsStream<TcpStream>, ConnectionError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.connect_error(e))?
            .next()
            .ok_or_else(|| self.connect_error("host did not resolve"))?;
        let tcp =
            TcpStream::connect_timeout(&addr, self.timeout).map_err(|e| self.connect_error(e))?;
        tcp.set_read_timeout(Some(self.timeout))
            .map_err(|e| self.connect_error(e))?;
        tcp.set_write_timeout(Some(self.timeout))
            .map_err(|e| self.connect_error(e))?;

        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| self.connect_error(e))?;
        tls.connect(&self.host, tcp)
            .map_err(|e| self.connect_error(e))
    }
}

impl Connector for ImapConnector {
    type Session = ImapSession;

    fn connect(&self, account: &Account) -> Result<ImapSession, ConnectionError> {
        let mut client = imap::Client::new(self.open_stream()?);
        client
            .read_greeting()
            .map_err(|e| self.connect_error(e))?;
        debug!("{}: connected to {}", account.email, self.address());

        let session = client
            .login(&account.email, &account.password)
            .map_err(|(e, _client)| ConnectionError::Auth {
                email: account.email.clone(),
                reason: e.to_string(),
            })?;
        debug!("{}: login ok", account.email);

        Ok(ImapSession { inner: session })
    }
}

pub struct ImapSession {
    inner: imap::Session<TlsStream<TcpStream>>,
}

impl MailSession for ImapSession {
    fn select_mailbox(&mut self, name: &str) -> Result<MailboxSnapshot, SessionError> {
        let mailbox = self.inner.select(name).map_err(|e| SessionError::Select {
            mailbox: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(MailboxSnapshot {
            total: mailbox.exists,
        })
    }

    fn fetch_range(&mut self, range: SeqRange) -> Result<Vec<RawMessage>, SessionError> {
        let fetches = self
            .inner
            .fetch(range.to_string(), "RFC822")
            .map_err(|e| SessionError::Fetch {
                range,
                reason: e.to_string(),
            })?;

        let mut out = Vec::with_capacity(fetches.len());
        for f in fetches.iter() {
            // Unsolicited FETCH responses (flag updates) carry no body.
            let Some(body) = f.body() else {
                debug!("seq {} returned without a body, skipping", f.message);
                continue;
            };
            out.push(RawMessage {
                seq: f.message,
                bytes: body.to_vec(),
            });
        }
        Ok(out)
    }

    fn logout(&mut self) -> Result<(), SessionError> {
        self.inner
            .logout()
            .map_err(|e| SessionError::Logout(e.to_string()))
    }
}
