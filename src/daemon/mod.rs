pub mod poller;
pub mod sink;
pub mod ticker;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use log::{error, info, warn};
use std::{sync::Arc, sync::mpsc, thread, time::Duration};

use crate::config::Config;
use crate::daemon::poller::{Poller, PollerConfig};
use crate::daemon::sink::Sink;
use crate::daemon::ticker::{IntervalTicker, Shutdown, Ticker};
use crate::domain::mail::{Account, PollState};
use crate::error::ConnectionError;
use crate::mail::imap_client::ImapConnector;
use crate::mail::session::Connector;

pub struct DaemonConfig {
    pub interval: Duration,
    pub poller: PollerConfig,
}

/// How each account ended.
#[derive(Debug, Default)]
pub struct DaemonSummary {
    pub stopped: Vec<(String, PollState)>,
    pub retired: Vec<(String, String)>,
}

struct AccountExit {
    email: String,
    result: Result<PollState, ConnectionError>,
}

/// Poll every configured credential over IMAP until interrupted.
pub fn run_daemon(
    cfg: &Config,
    sink: Arc<dyn Sink>,
    daemon: DaemonConfig,
) -> Result<DaemonSummary> {
    let connector = Arc::new(
        ImapConnector::from_address(&cfg.imap.address)?.with_timeout(cfg.poll.io_timeout()),
    );

    let shutdown = Shutdown::new();
    let s2 = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("interrupt received, stopping pollers");
        s2.trigger();
    })?;

    let interval = daemon.interval;
    Ok(supervise(
        &cfg.credentials,
        connector,
        sink,
        daemon.poller,
        || IntervalTicker::new(interval, shutdown.clone()),
    ))
}

/// Run every account on its own thread and wait for all of them.
///
/// A poller that ends with a connection error is retired and reported; the
/// others keep running until their ticker stops them.
pub fn supervise<C, F, T>(
    accounts: &[Account],
    connector: Arc<C>,
    sink: Arc<dyn Sink>,
    poller: PollerConfig,
    make_ticker: F,
) -> DaemonSummary
where
    C: Connector + 'static,
    F: Fn() -> T,
    T: Ticker + Send + 'static,
{
    let mut summary = DaemonSummary::default();
    let (tx, rx) = mpsc::channel::<AccountExit>();
    let mut handles = Vec::new();

    for account in accounts {
        let email = account.email.clone();
        let account = account.clone();
        let connector = connector.clone();
        let sink = sink.clone();
        let config = poller.clone();
        let tx = tx.clone();
        let mut ticker = make_ticker();

        let spawned = thread::Builder::new()
            .name(format!("poll-{email}"))
            .spawn(move || {
                let email = account.email.clone();
                let result = Poller::new(account, connector, sink, config).run(&mut ticker);
                let _ = tx.send(AccountExit { email, result });
            });
        match spawned {
            Ok(handle) => handles.push((email, handle)),
            Err(e) => {
                error!("{email}: cannot start poller thread: {e}");
                summary.retired.push((email, e.to_string()));
            }
        }
    }
    drop(tx);
    info!("supervising {} account(s)", handles.len());

    for exit in rx {
        match exit.result {
            Ok(state) => {
                info!("{}: stopped after seq {}", exit.email, state.last_seen);
                summary.stopped.push((exit.email, state));
            }
            Err(e) => {
                error!("{}: retired: {e}", exit.email);
                summary.retired.push((exit.email, e.to_string()));
            }
        }
    }

    for (email, handle) in handles {
        if handle.join().is_err() {
            warn!("{email}: poller thread panicked");
            summary.retired.push((email, "poller thread panicked".to_string()));
        }
    }

    summary
}
