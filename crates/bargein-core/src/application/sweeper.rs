//! Background session sweeper
//!
//! Periodically expires sessions whose client stopped sending heartbeats.
//! Expired sessions get their interrupt flag raised so any producer still
//! polling for them stops.

use crate::domain::interrupt::InterruptCoordinator;
use crate::domain::session::{SessionRegistry, SweepReport};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Run one sweep pass and raise flags for whatever expired
pub(crate) async fn expire_stale(
    registry: &SessionRegistry,
    interrupts: &InterruptCoordinator,
    now: DateTime<Utc>,
    timeout: Duration,
) -> SweepReport {
    let report = registry.sweep(now, timeout).await;
    for session in &report.expired {
        info!(
            session_id = %session.id,
            identity = %session.identity,
            idle_secs = session.idle_for(report.swept_at).num_seconds(),
            "Session expired"
        );
        interrupts.flags().raise(&session.identity, session.id);
        interrupts.flags().release(session.id);
    }

    // Identity flags outlive their session only while it is still in history
    for (identity, session_id) in interrupts.flags().released() {
        if registry.get(session_id).await.is_none() && interrupts.flags().forget(&identity, session_id) {
            debug!(identity = %identity, session_id = %session_id, "Dropped flag of evicted session");
        }
    }
    report
}

/// Periodic sweep task
#[derive(Debug)]
pub struct Sweeper {
    registry: Arc<SessionRegistry>,
    interrupts: Arc<InterruptCoordinator>,
    timeout: Duration,
    interval: Duration,
    cancel: CancellationToken,
}

impl Sweeper {
    pub fn new(
        registry: Arc<SessionRegistry>,
        interrupts: Arc<InterruptCoordinator>,
        timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            interrupts,
            timeout,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the sweeper when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops this sweeper
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the sweep loop on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        // First tick completes immediately
        ticker.tick().await;

        debug!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.timeout.as_secs(),
            "Sweeper started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    expire_stale(&self.registry, &self.interrupts, Utc::now(), self.timeout).await;
                }
            }
        }

        debug!("Sweeper stopped");
    }
}
