use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::daemon::poller::{PollerConfig, StartPosition};
use crate::domain::mail::Account;
use crate::mail::mime_text::ExtractOptions;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub imap: ImapSettings,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub credentials: Vec<Account>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImapSettings {
    /// `host:port`, port defaults to 993.
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub mailbox: String,
    pub start_from: StartPosition,
    pub max_fetch_batch: u32,
    pub single_part_text: bool,
    /// Socket connect/read/write timeout; a stalled server fails the tick.
    pub io_timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            mailbox: "INBOX".to_string(),
            start_from: StartPosition::Current,
            max_fetch_batch: 50,
            single_part_text: false,
            io_timeout_secs: 30,
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            mailbox: self.mailbox.clone(),
            start_from: self.start_from,
            max_fetch_batch: self.max_fetch_batch,
            extract: ExtractOptions {
                single_part_text: self.single_part_text,
            },
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.imap.address.trim().is_empty() {
            bail!("imap.address is empty");
        }
        if self.credentials.is_empty() {
            bail!("no [[credentials]] configured");
        }
        if let Some(c) = self.credentials.iter().find(|c| c.email.trim().is_empty()) {
            bail!("credential with empty email: {c:?}");
        }
        if self.poll.interval_secs == 0 {
            bail!("poll.interval_secs must be greater than 0");
        }
        if self.poll.io_timeout_secs == 0 {
            bail!("poll.io_timeout_secs must be greater than 0");
        }
        if self.poll.max_fetch_batch == 0 {
            bail!("poll.max_fetch_batch must be greater than 0");
        }
        if self.poll.mailbox.trim().is_empty() {
            bail!("poll.mailbox is empty");
        }
        Ok(())
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow!("no config dir available"))?
        .join("imap_poller"))
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

/// Load and validate the config at `path` (or the default location).
///
/// A missing file is replaced by a template and reported as an error so the
/// user can fill it in.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    if !path.exists() {
        write_template(&path)?;
        bail!(
            "Created template config at {}; edit it and run again",
            path.display()
        );
    }
    let s = fs::read_to_string(&path)?;
    let cfg: Config =
        toml::from_str(&s).map_err(|e| anyhow!("invalid config {}: {e}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

fn write_template(path: &Path) -> Result<()> {
    let sample = Config {
        imap: ImapSettings {
            address: "imap.example.com:993".to_string(),
        },
        poll: PollSettings::default(),
        credentials: vec![Account {
            email: "you@example.com".to_string(),
            password: "app-password".to_string(),
        }],
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(&sample)?)?;
    Ok(())
}
