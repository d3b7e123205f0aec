//! Poll-based reader protocol.
//!
//! Every reader (the display surface, the admin view, the file monitor)
//! follows the same contract: fetch state on a fixed cadence, compare a
//! change token against the last-seen one, act only on change, back off to a
//! slower recovery probe after consecutive failures, and resume on the first
//! successful probe. Readers never write, never assume they are the only
//! observer, and keep their last-known-good view across failures.
//!
//! The state machine is separated from timing so it can be tested by feeding
//! it fetch outcomes directly; [`run_poller`] is the async driver that adds
//! the clock.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Timing and threshold knobs for a poller.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Regular polling interval.
    pub interval: Duration,

    /// Slower probe interval while offline.
    pub recovery_interval: Duration,

    /// Consecutive failures before switching to recovery probing.
    pub offline_threshold: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            recovery_interval: Duration::from_secs(30),
            offline_threshold: 3,
        }
    }
}

/// Reader lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// No baseline observed yet.
    Idle,

    /// Regular cadence, comparing tokens.
    Polling,

    /// Too many consecutive failures; probing slowly for recovery.
    Offline,
}

/// What one observed fetch outcome means for the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent<T> {
    /// First successful fetch; token recorded, nothing to apply.
    Baseline(T),

    /// Token differs from the last-seen one; apply the new view.
    Changed(T),

    /// Token unchanged; do nothing. The overwhelmingly common case.
    Unchanged,

    /// A fetch failed but the threshold is not reached; keep the
    /// last-known-good view.
    FetchFailed { failures: u32 },

    /// Consecutive failures reached the threshold; switch to the
    /// recovery-probe cadence.
    WentOffline,

    /// First success after being offline; regular cadence resumes.
    /// `changed` is true if the token moved while we were away.
    Recovered { changed: bool },
}

/// Sans-IO poller state machine, generic over the change-token type.
#[derive(Debug)]
pub struct Poller<T> {
    config: PollConfig,
    state: PollState,
    last_token: Option<T>,
    failures: u32,
}

impl<T: PartialEq + Clone> Poller<T> {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            state: PollState::Idle,
            last_token: None,
            failures: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn last_token(&self) -> Option<&T> {
        self.last_token.as_ref()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// How long to wait before the next fetch.
    pub fn next_delay(&self) -> Duration {
        match self.state {
            PollState::Offline => self.config.recovery_interval,
            _ => self.config.interval,
        }
    }

    /// Feed one fetch outcome into the machine.
    pub fn observe(&mut self, outcome: Result<T, ()>) -> PollEvent<T> {
        match outcome {
            Ok(token) => self.observe_success(token),
            Err(()) => self.observe_failure(),
        }
    }

    fn observe_success(&mut self, token: T) -> PollEvent<T> {
        self.failures = 0;
        let was_offline = self.state == PollState::Offline;
        self.state = PollState::Polling;

        // No baseline yet means this is the first view ever observed,
        // even if the reader went offline before reaching one.
        if self.last_token.is_none() {
            self.last_token = Some(token.clone());
            return PollEvent::Baseline(token);
        }

        let changed = self.last_token.as_ref() != Some(&token);
        if changed {
            self.last_token = Some(token.clone());
        }

        if was_offline {
            PollEvent::Recovered { changed }
        } else if changed {
            PollEvent::Changed(token)
        } else {
            PollEvent::Unchanged
        }
    }

    fn observe_failure(&mut self) -> PollEvent<T> {
        if self.state == PollState::Offline {
            // Probe failed; stay offline, keep probing slowly.
            return PollEvent::FetchFailed {
                failures: self.failures,
            };
        }

        self.failures += 1;
        if self.failures >= self.config.offline_threshold {
            self.state = PollState::Offline;
            PollEvent::WentOffline
        } else {
            PollEvent::FetchFailed {
                failures: self.failures,
            }
        }
    }
}

/// Drive a poller forever: fetch, observe, sleep, repeat.
///
/// `fetch` produces the current change token; `handle` receives every event.
/// There is no terminal state: a reader stops by dropping this future.
pub async fn run_poller<T, F, Fut, H>(config: PollConfig, mut fetch: F, mut handle: H)
where
    T: PartialEq + Clone,
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
    H: FnMut(&PollEvent<T>),
{
    let mut poller = Poller::new(config);

    loop {
        let outcome = match fetch().await {
            Ok(token) => Ok(token),
            Err(e) => {
                debug!(error = %e, "poll fetch failed");
                Err(())
            }
        };

        let event = poller.observe(outcome);
        if let PollEvent::WentOffline = event {
            warn!("poll target offline, switching to recovery probes");
        }
        handle(&event);

        tokio::time::sleep(poller.next_delay()).await;
    }
}
