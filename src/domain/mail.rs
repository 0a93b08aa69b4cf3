use std::fmt;

use serde::{Deserialize, Serialize};

/// IMAP message sequence number (1-based position in a mailbox).
pub type SeqNum = u32;

#[derive(Clone, Deserialize, Serialize)]
pub struct Account {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-account watermark. Only the owning poller touches it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollState {
    pub last_seen: SeqNum,
    pub initialized: bool,
}

impl PollState {
    /// Record a processed message; out-of-order sequence numbers never move the
    /// watermark backwards.
    pub fn observe(&mut self, seq: SeqNum) {
        self.last_seen = self.last_seen.max(seq);
    }

    pub fn advance_to(&mut self, seq: SeqNum) {
        self.observe(seq);
        self.initialized = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxSnapshot {
    pub total: u32,
}

/// Inclusive sequence range `low:high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    pub low: SeqNum,
    pub high: SeqNum,
}

impl SeqRange {
    /// The messages above the watermark, or `None` when caught up.
    pub fn after(last_seen: SeqNum, total: u32) -> Option<Self> {
        if total <= last_seen {
            return None;
        }
        Some(Self {
            low: last_seen + 1,
            high: total,
        })
    }

    pub fn contains(&self, seq: SeqNum) -> bool {
        (self.low..=self.high).contains(&seq)
    }

    /// Split into ascending sub-ranges of at most `max` messages.
    pub fn chunks(&self, max: u32) -> Vec<SeqRange> {
        let max = max.max(1);
        let mut out = Vec::new();
        let mut low = self.low;
        loop {
            let high = low.saturating_add(max - 1).min(self.high);
            out.push(SeqRange { low, high });
            if high >= self.high {
                break;
            }
            low = high + 1;
        }
        out
    }
}

impl fmt::Display for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}

#[derive(Debug, Clone)]
pub struct RawMessage {
    pub seq: SeqNum,
    pub bytes: Vec<u8>,
}

/// Header fields in message order. Lookups ignore case and repeated fields keep
/// every value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HeaderMap {
    fields: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedMail {
    pub seq: SeqNum,
    pub header: HeaderMap,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_after_watermark_is_half_open() {
        let range = SeqRange::after(10, 15).unwrap();
        assert_eq!(range, SeqRange { low: 11, high: 15 });
        assert_eq!(range.to_string(), "11:15");
        assert!(!range.contains(10));
        assert!(range.contains(15));
    }

    #[test]
    fn range_after_is_none_when_caught_up() {
        assert_eq!(SeqRange::after(0, 0), None);
        assert_eq!(SeqRange::after(7, 7), None);
        assert_eq!(SeqRange::after(9, 4), None);
    }

    #[test]
    fn chunks_cover_range_in_order() {
        let range = SeqRange { low: 3, high: 12 };
        let chunks = range.chunks(4);
        assert_eq!(
            chunks,
            vec![
                SeqRange { low: 3, high: 6 },
                SeqRange { low: 7, high: 10 },
                SeqRange { low: 11, high: 12 },
            ]
        );
        assert_eq!(range.chunks(100), vec![range]);
    }

    #[test]
    fn watermark_never_decreases() {
        let mut state = PollState::default();
        state.observe(5);
        state.observe(3);
        assert_eq!(state.last_seen, 5);
        state.advance_to(2);
        assert_eq!(state.last_seen, 5);
        assert!(state.initialized);
    }

    #[test]
    fn header_lookup_ignores_case_and_keeps_duplicates() {
        let mut header = HeaderMap::new();
        header.push("Received", "from a");
        header.push("Subject", "hello");
        header.push("received", "from b");
        assert_eq!(header.get("SUBJECT"), Some("hello"));
        assert_eq!(header.get("Received"), Some("from a"));
        assert_eq!(header.get_all("RECEIVED"), vec!["from a", "from b"]);
        assert_eq!(header.get("To"), None);
    }

    #[test]
    fn account_debug_hides_password() {
        let account = Account {
            email: "a@example.com".into(),
            password: "hunter2".into(),
        };
        let shown = format!("{account:?}");
        assert!(shown.contains("a@example.com"));
        assert!(!shown.contains("hunter2"));
    }
}
