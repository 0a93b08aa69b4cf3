use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Process-wide stop signal shared by the supervisor and every poller.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap_or_else(|e| e.into_inner());
        *stopped = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep up to `timeout`, returning early (with `true`) once triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Fire,
    Shutdown,
}

/// Source of poll ticks. Injected into pollers so tests can drive them without
/// wall-clock time.
pub trait Ticker {
    /// Block until the next tick is due or shutdown is requested.
    fn wait(&mut self) -> Tick;

    /// Checked between fetch chunks of a long tick.
    fn shutdown_requested(&self) -> bool;
}

/// Fixed-period ticker. The first tick fires immediately; ticks missed while a
/// previous tick was running are dropped, not queued.
pub struct IntervalTicker {
    interval: Duration,
    shutdown: Shutdown,
    next: Option<Instant>,
}

impl IntervalTicker {
    pub fn new(interval: Duration, shutdown: Shutdown) -> Self {
        Self {
            interval,
            shutdown,
            next: None,
        }
    }
}

impl Ticker for IntervalTicker {
    fn wait(&mut self) -> Tick {
        let now = Instant::now();
        let due = self.next.unwrap_or(now);

        if due > now && self.shutdown.wait_timeout(due - now) {
            return Tick::Shutdown;
        }
        if self.shutdown.is_triggered() {
            return Tick::Shutdown;
        }

        let mut next = due + self.interval;
        let now = Instant::now();
        if next <= now {
            next = now + self.interval;
        }
        self.next = Some(next);
        Tick::Fire
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.is_triggered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn first_tick_fires_immediately() {
        let mut ticker = IntervalTicker::new(Duration::from_secs(3600), Shutdown::new());
        let started = Instant::now();
        assert_eq!(ticker.wait(), Tick::Fire);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn shutdown_interrupts_a_pending_tick() {
        let shutdown = Shutdown::new();
        let mut ticker = IntervalTicker::new(Duration::from_secs(3600), shutdown.clone());
        assert_eq!(ticker.wait(), Tick::Fire);

        let trigger = shutdown.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.trigger();
        });

        let started = Instant::now();
        assert_eq!(ticker.wait(), Tick::Shutdown);
        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(ticker.shutdown_requested());
        handle.join().unwrap();
    }

    #[test]
    fn ticks_follow_the_interval() {
        let mut ticker = IntervalTicker::new(Duration::from_millis(30), Shutdown::new());
        let started = Instant::now();
        for _ in 0..3 {
            assert_eq!(ticker.wait(), Tick::Fire);
        }
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn wait_timeout_reports_trigger_state() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.wait_timeout(Duration::from_millis(5)));
        shutdown.trigger();
        assert!(shutdown.wait_timeout(Duration::from_secs(60)));
    }
}
