//! Coordination facade
//!
//! The entry point external callers use. Composes the identity provider,
//! session registry and interrupt coordinator, and adds the one rule none of
//! them enforces alone: a client starting a new session first has its old
//! session interrupted, fully, before the new one becomes visible.
//!
//! # Example
//!
//! ```ignore
//! use bargein_core::prelude::*;
//! use bargein_core::infrastructure::identity::FileIdentityStore;
//!
//! let store = Arc::new(FileIdentityStore::at_default_location()?);
//! let coordinator = Coordinator::new(Config::load()?, Arc::new(IdentityProvider::for_host(store)));
//! coordinator.register_module("audio", Arc::new(audio_adapter));
//! coordinator.spawn_sweeper();
//!
//! let session = coordinator.create_session_for_self(SessionContext::new()).await?;
//! while !coordinator.should_interrupt_session(session.id) {
//!     // produce one chunk
//! }
//!
//! let summary = coordinator.shutdown("process exit").await;
//! println!("{}", summary.summary());
//! ```

use super::sweeper::{Sweeper, expire_stale};
use crate::config::Config;
use crate::domain::identity::{Identity, IdentityProvider};
use crate::domain::interrupt::{
    InterruptAllSummary, InterruptCoordinator, InterruptObserver, InterruptResult,
    InterruptSettings, InterruptStats, Interruptible, ModuleStats,
};
use crate::domain::session::{
    Session, SessionContext, SessionId, SessionInfo, SessionRegistry, SessionStatus, SweepReport,
};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snapshot of coordinator state for operators
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStats {
    pub live_sessions: usize,
    pub active_sessions: usize,
    pub interrupting_sessions: usize,
    pub max_sessions: usize,
    pub sessions_created: u64,
    pub sessions_superseded: u64,
    pub interrupts: InterruptStats,
    pub modules: BTreeMap<String, ModuleStats>,
    pub last_sweep: Option<DateTime<Utc>>,
    pub identity_degraded: bool,
    pub shutting_down: bool,
}

type Gate = Arc<tokio::sync::Mutex<()>>;
type Gates = Mutex<HashMap<Identity, Gate>>;

/// A claim on an identity's gate; the last holder removes it from the map
struct GateLease<'a> {
    gates: &'a Gates,
    identity: &'a Identity,
    gate: Gate,
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock();
        // Only the map and this lease hold it
        if Arc::strong_count(&self.gate) == 2 {
            gates.remove(self.identity);
        }
    }
}

#[derive(Debug)]
pub struct Coordinator {
    config: Config,
    identity: Arc<IdentityProvider>,
    registry: Arc<SessionRegistry>,
    interrupts: Arc<InterruptCoordinator>,
    /// Per-identity turn for `create_session`
    gates: Gates,
    shutting_down: AtomicBool,
    sweeper_token: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    sessions_created: AtomicU64,
    sessions_superseded: AtomicU64,
}

impl Coordinator {
    /// Create a coordinator with its own registry and interrupt coordinator
    pub fn new(config: Config, identity: Arc<IdentityProvider>) -> Self {
        let registry = Arc::new(SessionRegistry::from_config(&config));
        let interrupts = Arc::new(InterruptCoordinator::new(
            registry.clone(),
            InterruptSettings::from_config(&config),
        ));

        Self {
            config,
            identity,
            registry,
            interrupts,
            gates: Mutex::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
            sweeper_token: CancellationToken::new(),
            sweeper: Mutex::new(None),
            sessions_created: AtomicU64::new(0),
            sessions_superseded: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity_provider(&self) -> &IdentityProvider {
        &self.identity
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn interrupts(&self) -> &InterruptCoordinator {
        &self.interrupts
    }

    // ========== Modules and observers ==========

    pub fn register_module(&self, name: impl Into<String>, handle: Arc<dyn Interruptible>) {
        self.interrupts.register_module(name, handle);
    }

    pub fn unregister_module(&self, name: &str) -> bool {
        self.interrupts.unregister_module(name)
    }

    pub fn register_observer(&self, observer: Arc<dyn InterruptObserver>) -> Result<()> {
        self.interrupts.register_observer(observer)
    }

    pub fn register_callback<F>(&self, name: impl Into<String>, callback: F) -> Result<()>
    where
        F: Fn(&InterruptResult) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.interrupts.register_callback(name, callback)
    }

    // ========== Sessions ==========

    /// Start a new session for `identity`, superseding any live one
    ///
    /// The old session is interrupted (bounded by the acknowledgment timeout)
    /// and reaches a terminal status before the new session is admitted.
    pub async fn create_session(&self, identity: Identity, context: SessionContext) -> Result<Session> {
        self.ensure_running()?;

        let lease = self.lease_gate(&identity);
        let _turn = lease.gate.lock().await;
        self.create_in_turn(&identity, context).await
    }

    /// Start a new session for this process's own identity
    pub async fn create_session_for_self(&self, context: SessionContext) -> Result<Session> {
        let identity = self.identity.get_identity().await;
        self.create_session(identity, context).await
    }

    async fn create_in_turn(&self, identity: &Identity, context: SessionContext) -> Result<Session> {
        // Shutdown may have started while waiting for the turn
        self.ensure_running()?;

        if let Some(existing) = self.registry.active_for(identity).await {
            info!(
                session_id = %existing.id,
                identity = %identity,
                "Superseding session"
            );
            let result = self.interrupts.interrupt(identity).await?;
            if !result.success {
                warn!(session_id = %existing.id, "Superseded session did not finalize cleanly");
            }
            self.sessions_superseded.fetch_add(1, Ordering::Relaxed);

            // Shutdown may have started while the old session was interrupted
            self.ensure_running()?;
        }

        let session = self.registry.create(identity.clone(), context).await?;
        self.interrupts.track(identity, session.id);

        // Shutdown's interrupt_all may already have passed this identity
        if self.is_shutting_down() {
            debug!(session_id = %session.id, "Shutdown began during create, interrupting new session");
            if let Err(e) = self.interrupts.interrupt_session(session.id).await {
                warn!(session_id = %session.id, error = %e, "Failed to interrupt session created during shutdown");
            }
            return Err(Error::ShuttingDown);
        }

        // An interrupt may have finished between create and track
        let still_active = self
            .registry
            .get(session.id)
            .await
            .is_some_and(|s| s.is_active());
        if !still_active {
            debug!(session_id = %session.id, "Session ended before it was tracked");
            self.interrupts.flags().raise(identity, session.id);
            self.interrupts.flags().release(session.id);
        }

        self.sessions_created.fetch_add(1, Ordering::Relaxed);
        Ok(session)
    }

    fn lease_gate<'a>(&'a self, identity: &'a Identity) -> GateLease<'a> {
        let gate = self.gates.lock().entry(identity.clone()).or_default().clone();
        GateLease {
            gates: &self.gates,
            identity,
            gate,
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }

    /// Record client activity; false when the session is no longer live
    pub async fn heartbeat(&self, session_id: SessionId) -> bool {
        self.registry.heartbeat(session_id).await
    }

    /// Finish a session normally
    ///
    /// Completing a session that is being (or was) interrupted returns its
    /// current state rather than an error: the client simply lost the race.
    pub async fn complete_session(&self, session_id: SessionId) -> Result<Session> {
        match self.registry.complete(session_id).await {
            Ok(session) => {
                self.interrupts.flags().release(session_id);
                Ok(session)
            }
            Err(Error::InvalidTransition { from, .. })
                if matches!(from, SessionStatus::Interrupting | SessionStatus::Interrupted) =>
            {
                debug!(session_id = %session_id, status = %from, "Completion lost to interrupt");
                self.registry
                    .get(session_id)
                    .await
                    .ok_or(Error::SessionNotFound(session_id))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_session(&self, session_id: SessionId) -> Option<Session> {
        self.registry.get(session_id).await
    }

    pub async fn active_for(&self, identity: &Identity) -> Option<Session> {
        self.registry.active_for(identity).await
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.registry.list().await
    }

    // ========== Interrupts ==========

    pub async fn interrupt_session(&self, session_id: SessionId) -> Result<InterruptResult> {
        self.interrupts.interrupt_session(session_id).await
    }

    pub async fn interrupt_identity(&self, identity: &Identity) -> Result<InterruptResult> {
        self.interrupts.interrupt(identity).await
    }

    pub async fn interrupt_all(&self, reason: &str) -> InterruptAllSummary {
        self.interrupts.interrupt_all(reason).await
    }

    /// Cheap, non-blocking check for producers
    pub fn should_interrupt(&self, identity: &Identity) -> bool {
        self.interrupts.should_interrupt(identity)
    }

    pub fn should_interrupt_session(&self, session_id: SessionId) -> bool {
        self.interrupts.should_interrupt_session(session_id)
    }

    // ========== Sweep ==========

    /// Expire sessions idle longer than the heartbeat timeout
    pub async fn sweep_now(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        expire_stale(
            &self.registry,
            &self.interrupts,
            now,
            self.config.heartbeat_timeout(),
        )
        .await
    }

    /// Start the background sweeper; returns false if one is already running
    pub fn spawn_sweeper(&self) -> bool {
        let mut slot = self.sweeper.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        if self.sweeper_token.is_cancelled() {
            return false;
        }

        let sweeper = Sweeper::new(
            self.registry.clone(),
            self.interrupts.clone(),
            self.config.heartbeat_timeout(),
            self.config.sweep_interval(),
        )
        .with_cancellation(self.sweeper_token.child_token());
        *slot = Some(sweeper.spawn());
        info!(
            interval_secs = self.config.sweep.interval_secs,
            "Background sweeper started"
        );
        true
    }

    // ========== Lifecycle ==========

    /// Stop accepting sessions and interrupt everything still live
    ///
    /// Bounded by the acknowledgment timeout; never waits on a module forever.
    pub async fn shutdown(&self, reason: &str) -> InterruptAllSummary {
        if !self.shutting_down.swap(true, Ordering::AcqRel) {
            info!(reason = %reason, "Coordinator shutting down");
        }
        self.interrupts.raise_global();

        self.sweeper_token.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweeper task ended abnormally");
            }
        }

        let summary = self.interrupts.interrupt_all(reason).await;
        // Supersede interrupts already running are not in the summary
        self.interrupts.settle().await;

        if summary.has_warnings() {
            warn!(summary = %summary.summary(), "Shutdown completed with warnings");
        } else {
            info!(summary = %summary.summary(), "Shutdown completed");
        }
        summary
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub async fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            live_sessions: self.registry.live_count().await,
            active_sessions: self.registry.count_by_status(SessionStatus::Active).await,
            interrupting_sessions: self
                .registry
                .count_by_status(SessionStatus::Interrupting)
                .await,
            max_sessions: self.registry.max_sessions(),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_superseded: self.sessions_superseded.load(Ordering::Relaxed),
            interrupts: self.interrupts.stats(),
            modules: self.interrupts.module_stats(),
            last_sweep: self.registry.last_sweep().await,
            identity_degraded: self.identity.is_degraded(),
            shutting_down: self.is_shutting_down(),
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.sweeper_token.cancel();
    }
}
