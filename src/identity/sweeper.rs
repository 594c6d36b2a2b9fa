//! Periodic proactive expiry of sessions.
//!
//! One ticker task lives for the whole service. Every tick spawns its own bounded
//! unit of work so a slow sweep never holds the ticker back; the unit gets a
//! deadline just short of the interval so consecutive sweeps do not pile up.
//! A failing sweep is logged and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::session::SessionStore;
use super::steps::StepGate;
use crate::config::MAX_DURATION;
use crate::error::AuthResult;

const TICK_MARGIN: Duration = Duration::from_millis(100);

pub struct ExpirySweeper {
    store: Arc<dyn SessionStore>,
    interval: Duration,
}

impl ExpirySweeper {
    /// The interval is clamped to `1ms..=MAX_DURATION` so the ticker can always be armed.
    pub fn new(store: Arc<dyn SessionStore>, interval: Duration) -> Self {
        Self { store, interval: interval.clamp(Duration::from_millis(1), MAX_DURATION) }
    }

    pub fn interval(&self) -> Duration { self.interval }

    /// Time one tick may spend before it is cut off.
    pub fn tick_budget(&self) -> Duration {
        if self.interval > TICK_MARGIN * 2 { self.interval - TICK_MARGIN } else { self.interval / 2 }
    }

    /// Start the ticker. It stops when `shutdown` is cancelled; in-flight sweeps
    /// observe the same token at their next step boundary.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let budget = self.tick_budget();
        debug!(target: "turnstile::sweep", interval_ms = self.interval.as_millis() as u64, "sweeper started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(target: "turnstile::sweep", "sweeper shutting down");
                    break;
                }
                tick = ticker.tick() => {
                    let store = self.store.clone();
                    let gate = StepGate::with_token(shutdown.child_token()).with_deadline(tick + budget);
                    let at = Utc::now();
                    tokio::spawn(async move {
                        match sweep_expired(store.as_ref(), at, &gate) {
                            Ok(0) => {}
                            Ok(removed) => debug!(target: "turnstile::sweep", removed, "expired sessions revoked"),
                            Err(e) => error!(target: "turnstile::sweep", error = %e, "session sweep failed; retrying next tick"),
                        }
                    });
                }
            }
        }
    }
}

/// Revoke every session that expired at or before `at`. Returns how many were removed.
pub fn sweep_expired(store: &dyn SessionStore, at: DateTime<Utc>, gate: &StepGate) -> AuthResult<usize> {
    if store.count() == 0 {
        return Ok(0);
    }
    let mut removed = 0usize;
    store.for_each(&mut |s| {
        if !s.is_expired_at(at) {
            return Ok(());
        }
        gate.run(|| store.revoke(s.id()))?;
        removed += 1;
        Ok(())
    })?;
    Ok(removed)
}

#[cfg(test)]
#[path = "sweeper_tests.rs"]
mod sweeper_tests;
