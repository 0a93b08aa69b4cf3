use std::io::Write;
use std::sync::Mutex;

use log::{info, warn};

use crate::domain::mail::ExtractedMail;

/// Receives every successfully extracted message. Shared by all account threads.
pub trait Sink: Send + Sync {
    fn deliver(&self, account: &str, mail: &ExtractedMail);
}

/// Writes Date, From, To, Subject and the text content to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn deliver(&self, account: &str, mail: &ExtractedMail) {
        let field = |name: &str| mail.header.get(name).unwrap_or_default().to_string();
        info!("{account}: Date: {}", field("Date"));
        info!("{account}: From: {}", field("From"));
        info!("{account}: To: {}", field("To"));
        info!("{account}: Subject: {}", field("Subject"));
        info!("{account}: TextContent: {}", mail.text);
    }
}

/// One JSON object per message, one message per line.
pub struct JsonSink<W: Write + Send> {
    out: Mutex<W>,
}

impl JsonSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(serde::Serialize)]
struct JsonRecord<'a> {
    account: &'a str,
    #[serde(flatten)]
    mail: &'a ExtractedMail,
}

impl<W: Write + Send> Sink for JsonSink<W> {
    fn deliver(&self, account: &str, mail: &ExtractedMail) {
        let line = match serde_json::to_string(&JsonRecord { account, mail }) {
            Ok(line) => line,
            Err(e) => {
                warn!("{account}: cannot encode seq {}: {e}", mail.seq);
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!("{account}: cannot write seq {}: {e}", mail.seq);
        }
    }
}
