use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use imap_poller::config::load_config;
use imap_poller::daemon::sink::{JsonSink, LogSink, Sink};
use imap_poller::daemon::{DaemonConfig, run_daemon};

#[derive(Parser)]
#[command(name = "imap_poller")]
#[command(about = "Poll IMAP mailboxes and extract the text of new mail", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/imap_poller/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll every configured account until interrupted
    Run {
        /// Seconds between polls; overrides poll.interval_secs
        #[arg(long)]
        interval: Option<u64>,

        /// Print one JSON object per message on stdout instead of logging it
        #[arg(long)]
        json: bool,
    },

    /// Validate the config and list the configured accounts
    Check,
}

fn main() -> Result<()> {
    // Delivered mail is logged at info level.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg =
        load_config(cli.config.as_deref()).map_err(|e| anyhow!("Configuration error: {e}"))?;

    match cli.cmd {
        Command::Check => {
            println!("server: {}", cfg.imap.address);
            println!("mailbox: {}", cfg.poll.mailbox);
            for c in &cfg.credentials {
                println!("account: {}", c.email);
            }
            Ok(())
        }

        Command::Run { interval, json } => {
            let interval = match interval {
                Some(0) => return Err(anyhow!("--interval must be greater than 0")),
                Some(secs) => Duration::from_secs(secs),
                None => cfg.poll.interval(),
            };
            let sink: Arc<dyn Sink> = if json {
                Arc::new(JsonSink::stdout())
            } else {
                Arc::new(LogSink)
            };

            let summary = run_daemon(
                &cfg,
                sink,
                DaemonConfig {
                    interval,
                    poller: cfg.poll.poller_config(),
                },
            )?;

            if summary.stopped.is_empty() && !summary.retired.is_empty() {
                return Err(anyhow!(
                    "all {} account(s) failed to poll",
                    summary.retired.len()
                ));
            }
            Ok(())
        }
    }
}
