//! Interrupt coordinator
//!
//! Runs the coercive cancellation protocol for an identity:
//!
//! 1. Mark the live session `Interrupting`
//! 2. Raise its cooperative flag
//! 3. Ask every registered module to stop, concurrently
//! 4. Wait for each acknowledgment up to the configured bound
//! 5. Mark the session `Interrupted` whatever the modules did
//! 6. Notify observers
//!
//! Concurrent calls for the same identity share one episode: the first caller
//! runs it, later callers wait for and receive its result.

use super::flags::InterruptFlags;
use super::module::{Interruptible, ModuleHealth, ModuleStats};
use super::observer::{CallbackObserver, InterruptObserver, notify_all};
use super::result::{InterruptAllSummary, InterruptOutcome, InterruptResult};
use crate::config::Config;
use crate::domain::identity::Identity;
use crate::domain::session::{SessionId, SessionRegistry, SessionStatus};
use crate::error::{Error, Result};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Interrupt tuning, usually taken from [`Config`]
#[derive(Debug, Clone)]
pub struct InterruptSettings {
    pub ack_timeout: Duration,
    pub max_observers: usize,
    pub unhealthy_after: u32,
    pub reprobe_interval: Duration,
}

impl InterruptSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ack_timeout: config.ack_timeout(),
            max_observers: config.interrupt.max_observers,
            unhealthy_after: config.interrupt.unhealthy_after,
            reprobe_interval: config.reprobe_interval(),
        }
    }
}

impl Default for InterruptSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Counters across all interrupts handled by a coordinator
#[derive(Debug, Clone, Default, Serialize)]
pub struct InterruptStats {
    /// Interrupts that ran the protocol
    pub interrupted: u64,
    /// Calls that found nothing to interrupt
    pub no_ops: u64,
    /// Calls that joined an episode already in flight
    pub joined: u64,
    pub in_flight: usize,
}

struct ModuleEntry {
    handle: Arc<dyn Interruptible>,
    /// Changes on re-registration so late outcomes don't touch the new handle's stats
    generation: u64,
    stats: ModuleStats,
}

enum ModuleOutcome {
    Acknowledged,
    TimedOut,
    Failed(String),
}

#[derive(Default)]
struct Broadcast {
    acknowledged: Vec<String>,
    timed_out: Vec<String>,
    failed: Vec<String>,
    skipped: Vec<String>,
}

type InFlight = Mutex<HashMap<Identity, watch::Receiver<Option<InterruptResult>>>>;

/// Removes the in-flight entry even if the leader is cancelled
struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
    identity: &'a Identity,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(self.identity);
    }
}

pub struct InterruptCoordinator {
    registry: Arc<SessionRegistry>,
    settings: InterruptSettings,
    modules: RwLock<BTreeMap<String, ModuleEntry>>,
    observers: RwLock<Vec<Arc<dyn InterruptObserver>>>,
    flags: InterruptFlags,
    in_flight: InFlight,
    next_generation: AtomicU64,
    interrupted_total: AtomicU64,
    no_op_total: AtomicU64,
    joined_total: AtomicU64,
}

impl std::fmt::Debug for InterruptCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptCoordinator")
            .field("settings", &self.settings)
            .field("modules", &self.module_names())
            .field("observers", &self.observers.read().len())
            .finish_non_exhaustive()
    }
}

impl InterruptCoordinator {
    pub fn new(registry: Arc<SessionRegistry>, settings: InterruptSettings) -> Self {
        Self {
            registry,
            settings,
            modules: RwLock::new(BTreeMap::new()),
            observers: RwLock::new(Vec::new()),
            flags: InterruptFlags::new(),
            in_flight: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            interrupted_total: AtomicU64::new(0),
            no_op_total: AtomicU64::new(0),
            joined_total: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &InterruptSettings {
        &self.settings
    }

    pub fn flags(&self) -> &InterruptFlags {
        &self.flags
    }

    // ========== Registration ==========

    /// Add a module to the interruptible set, replacing any module with the same name
    pub fn register_module(&self, name: impl Into<String>, handle: Arc<dyn Interruptible>) {
        let name = name.into();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let previous = self.modules.write().insert(
            name.clone(),
            ModuleEntry {
                handle,
                generation,
                stats: ModuleStats::default(),
            },
        );

        if previous.is_some() {
            info!(module = %name, "Module re-registered, health reset");
        } else {
            debug!(module = %name, "Module registered");
        }
    }

    /// Remove a module; returns whether it was registered
    pub fn unregister_module(&self, name: &str) -> bool {
        self.modules.write().remove(name).is_some()
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.read().keys().cloned().collect()
    }

    /// Register an observer notified after each completed interrupt
    pub fn register_observer(&self, observer: Arc<dyn InterruptObserver>) -> Result<()> {
        let mut observers = self.observers.write();
        if observers.len() >= self.settings.max_observers {
            return Err(Error::ObserverLimit(self.settings.max_observers));
        }
        debug!(observer = %observer.name(), "Observer registered");
        observers.push(observer);
        Ok(())
    }

    /// Register a plain callback as an observer
    pub fn register_callback<F>(&self, name: impl Into<String>, callback: F) -> Result<()>
    where
        F: Fn(&InterruptResult) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_observer(Arc::new(CallbackObserver::new(name, callback)))
    }

    // ========== Cooperative channel ==========

    /// Track a new session so it starts with a clean flag
    pub fn track(&self, identity: &Identity, session_id: SessionId) {
        self.flags.arm(identity, session_id);
    }

    /// Whether producers for `identity` should stop; never blocks on I/O or awaits
    pub fn should_interrupt(&self, identity: &Identity) -> bool {
        self.flags.should_interrupt(identity)
    }

    pub fn should_interrupt_session(&self, session_id: SessionId) -> bool {
        self.flags.should_interrupt_session(session_id)
    }

    /// Make every predicate report true from now on
    pub fn raise_global(&self) {
        warn!("Global interrupt flag raised");
        self.flags.raise_global();
    }

    // ========== Coercive channel ==========

    /// Interrupt whatever session `identity` currently owns
    pub async fn interrupt(self: &Arc<Self>, identity: &Identity) -> Result<InterruptResult> {
        self.interrupt_matching(identity, None).await
    }

    /// Interrupt a specific session
    ///
    /// Unknown ids are `SessionNotFound`; sessions that already ended are a no-op.
    pub async fn interrupt_session(self: &Arc<Self>, session_id: SessionId) -> Result<InterruptResult> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or(Error::SessionNotFound(session_id))?;

        if session.status.is_terminal() {
            let mut result = InterruptResult::no_op(session.identity, Duration::ZERO);
            result.session_id = Some(session_id);
            self.no_op_total.fetch_add(1, Ordering::Relaxed);
            return Ok(result);
        }

        self.interrupt_matching(&session.identity, Some(session_id)).await
    }

    /// Interrupt every identity that has an Active session
    ///
    /// Per-identity errors and module timeouts are collected; the sweep over
    /// the remaining identities always continues.
    pub async fn interrupt_all(self: &Arc<Self>, reason: &str) -> InterruptAllSummary {
        let started = Instant::now();
        let identities = self.registry.active_identities().await;
        info!(reason = %reason, sessions = identities.len(), "Interrupting all sessions");

        let results = join_all(identities.iter().map(|identity| self.interrupt(identity))).await;

        let mut summary = InterruptAllSummary {
            reason: reason.to_string(),
            ..Default::default()
        };
        for (identity, result) in identities.iter().zip(results) {
            match result {
                Ok(result) => {
                    if result.interrupted_session() {
                        summary.interrupted += 1;
                    }
                    summary.timed_out_modules.extend(result.timed_out_modules);
                    summary.failed_modules.extend(result.failed_modules);
                }
                Err(e) => {
                    warn!(identity = %identity, error = %e, "Interrupt failed during interrupt_all");
                    summary.failures.push(format!("{}: {}", identity, e));
                }
            }
        }
        summary.elapsed = started.elapsed();

        info!(
            reason = %reason,
            interrupted = summary.interrupted,
            timed_out = summary.timed_out_modules.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Interrupt-all completed"
        );
        summary
    }

    async fn interrupt_matching(
        self: &Arc<Self>,
        identity: &Identity,
        expected: Option<SessionId>,
    ) -> Result<InterruptResult> {
        let leader = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(identity) {
                Some(rx) => Err(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(identity.clone(), rx);
                    Ok(tx)
                }
            }
        };

        let tx = match leader {
            Ok(tx) => tx,
            Err(rx) => return self.join(identity, rx).await,
        };

        // The episode owns its task: dropping this caller never leaves the
        // session stuck in Interrupting
        let this = Arc::clone(self);
        let owned = identity.clone();
        let episode = tokio::spawn(async move {
            let guard = InFlightGuard {
                in_flight: &this.in_flight,
                identity: &owned,
            };
            let result = this.run(&owned, expected).await;
            drop(guard);

            if let Ok(result) = &result {
                tx.send_replace(Some(result.clone()));
            }
            result
        });

        episode.await.map_err(|e| {
            Error::Other(format!("Interrupt task for '{}' failed: {}", identity, e))
        })?
    }

    /// Wait until every interrupt in flight right now has finished
    pub async fn settle(&self) {
        let pending: Vec<_> = self.in_flight.lock().values().cloned().collect();
        for mut rx in pending {
            // An abandoned episode counts as finished
            let _ = rx.wait_for(Option::is_some).await;
        }
    }

    async fn join(
        &self,
        identity: &Identity,
        mut rx: watch::Receiver<Option<InterruptResult>>,
    ) -> Result<InterruptResult> {
        debug!(identity = %identity, "Joining in-flight interrupt");
        self.joined_total.fetch_add(1, Ordering::Relaxed);

        let result = rx
            .wait_for(Option::is_some)
            .await
            .map(|value| (*value).clone())
            .ok()
            .flatten()
            .ok_or_else(|| {
                Error::Other(format!("In-flight interrupt for '{}' was abandoned", identity))
            })?;

        Ok(InterruptResult {
            outcome: InterruptOutcome::Joined,
            ..result
        })
    }

    async fn run(&self, identity: &Identity, expected: Option<SessionId>) -> Result<InterruptResult> {
        let started = Instant::now();

        let session = self
            .registry
            .active_for(identity)
            .await
            .filter(|s| expected.is_none_or(|id| id == s.id));
        let Some(session) = session else {
            return Ok(self.no_op(identity, started));
        };

        match self.registry.mark(session.id, SessionStatus::Interrupting).await {
            Ok(_) => {}
            // Completed or expired between lookup and mark
            Err(Error::SessionNotFound(_)) | Err(Error::InvalidTransition { .. }) => {
                debug!(session_id = %session.id, "Session ended before interrupt began");
                return Ok(self.no_op(identity, started));
            }
            Err(e) => return Err(e),
        }
        self.flags.raise(identity, session.id);

        info!(session_id = %session.id, identity = %identity, "Interrupting session");

        let broadcast = self.broadcast().await;

        let success = match self.registry.mark(session.id, SessionStatus::Interrupted).await {
            Ok(_) => true,
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Failed to finalize interrupted session");
                false
            }
        };
        self.flags.release(session.id);

        let result = InterruptResult {
            identity: identity.clone(),
            session_id: Some(session.id),
            outcome: InterruptOutcome::Interrupted,
            success,
            acknowledged_modules: broadcast.acknowledged,
            timed_out_modules: broadcast.timed_out,
            failed_modules: broadcast.failed,
            skipped_modules: broadcast.skipped,
            elapsed: started.elapsed(),
        };
        self.interrupted_total.fetch_add(1, Ordering::Relaxed);

        info!(
            session_id = %session.id,
            identity = %identity,
            acknowledged = result.acknowledged_modules.len(),
            timed_out = result.timed_out_modules.len(),
            failed = result.failed_modules.len(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Session interrupted"
        );

        let observers = self.observers.read().clone();
        notify_all(&observers, &result);

        Ok(result)
    }

    fn no_op(&self, identity: &Identity, started: Instant) -> InterruptResult {
        debug!(identity = %identity, "No active session to interrupt");
        self.no_op_total.fetch_add(1, Ordering::Relaxed);
        InterruptResult::no_op(identity.clone(), started.elapsed())
    }

    /// Stop every eligible module concurrently, each bounded by the ack timeout
    async fn broadcast(&self) -> Broadcast {
        let mut broadcast = Broadcast::default();
        let now = Instant::now();

        let selected: Vec<(String, u64, Arc<dyn Interruptible>)> = {
            let mut modules = self.modules.write();
            let mut selected = Vec::with_capacity(modules.len());
            for (name, entry) in modules.iter_mut() {
                if entry.stats.should_skip(now, self.settings.reprobe_interval) {
                    entry.stats.skipped += 1;
                    broadcast.skipped.push(name.clone());
                    continue;
                }
                if entry.stats.health == ModuleHealth::Unhealthy {
                    debug!(module = %name, "Re-probing unhealthy module");
                }
                entry.stats.invocations += 1;
                selected.push((name.clone(), entry.generation, entry.handle.clone()));
            }
            selected
        };

        let ack_timeout = self.settings.ack_timeout;
        let outcomes = join_all(selected.into_iter().map(|(name, generation, handle)| async move {
            let started = Instant::now();
            let mut task = tokio::spawn(async move { handle.stop().await });
            let outcome = match tokio::time::timeout(ack_timeout, &mut task).await {
                Ok(Ok(Ok(()))) => ModuleOutcome::Acknowledged,
                Ok(Ok(Err(e))) => ModuleOutcome::Failed(e.to_string()),
                Ok(Err(e)) if e.is_panic() => ModuleOutcome::Failed("stop handler panicked".to_string()),
                Ok(Err(e)) => ModuleOutcome::Failed(e.to_string()),
                Err(_) => {
                    task.abort();
                    ModuleOutcome::TimedOut
                }
            };
            (name, generation, outcome, started.elapsed())
        }))
        .await;

        let now = Instant::now();
        let mut modules = self.modules.write();
        for (name, generation, outcome, elapsed) in outcomes {
            let entry = modules
                .get_mut(&name)
                .filter(|entry| entry.generation == generation);

            match outcome {
                ModuleOutcome::Acknowledged => {
                    if let Some(entry) = entry {
                        entry.stats.record_ack(elapsed);
                    }
                    broadcast.acknowledged.push(name);
                }
                ModuleOutcome::TimedOut => {
                    let err = Error::ModuleAcknowledgmentTimeout {
                        module: name.clone(),
                        waited_ms: ack_timeout.as_millis() as u64,
                    };
                    warn!(code = err.code(), error = %err, "Module force-cleaned");
                    if let Some(entry) = entry {
                        if entry
                            .stats
                            .record_timeout(elapsed, self.settings.unhealthy_after, now)
                        {
                            warn!(
                                module = %name,
                                reprobe_secs = self.settings.reprobe_interval.as_secs(),
                                "Module marked unhealthy, skipping until re-probe"
                            );
                        }
                    }
                    broadcast.timed_out.push(name);
                }
                ModuleOutcome::Failed(message) => {
                    let err = Error::ModuleFailed {
                        module: name.clone(),
                        message,
                    };
                    warn!(code = err.code(), error = %err, "Module stop failed");
                    if let Some(entry) = entry {
                        entry.stats.record_failure(elapsed);
                    }
                    broadcast.failed.push(name);
                }
            }
        }

        broadcast
    }

    // ========== Introspection ==========

    /// Per-module acknowledgment statistics
    pub fn module_stats(&self) -> BTreeMap<String, ModuleStats> {
        self.modules
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.stats.clone()))
            .collect()
    }

    pub fn stats(&self) -> InterruptStats {
        InterruptStats {
            interrupted: self.interrupted_total.load(Ordering::Relaxed),
            no_ops: self.no_op_total.load(Ordering::Relaxed),
            joined: self.joined_total.load(Ordering::Relaxed),
            in_flight: self.in_flight.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::interrupt::module::FnModule;
    use crate::domain::session::SessionContext;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    fn hw(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    fn setup(ack_timeout: Duration) -> (Arc<SessionRegistry>, Arc<InterruptCoordinator>) {
        let registry = Arc::new(SessionRegistry::new(16, 16));
        let settings = InterruptSettings {
            ack_timeout,
            max_observers: 2,
            unhealthy_after: 2,
            reprobe_interval: Duration::from_secs(60),
        };
        let coordinator = Arc::new(InterruptCoordinator::new(registry.clone(), settings));
        (registry, coordinator)
    }

    fn counting_module(counter: Arc<AtomicUsize>, delay: Duration) -> Arc<dyn Interruptible> {
        Arc::new(FnModule::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }))
    }

    #[tokio::test]
    async fn test_interrupt_without_session_is_no_op() {
        let (_registry, coordinator) = setup(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));
        coordinator.register_module("text", counting_module(calls.clone(), Duration::ZERO));

        let result = coordinator.interrupt(&hw("HW1")).await.expect("interrupt failed");

        assert_eq!(result.outcome, InterruptOutcome::NoActiveSession);
        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.stats().no_ops, 1);
    }

    #[tokio::test]
    async fn test_interrupt_runs_protocol() {
        let (registry, coordinator) = setup(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));
        coordinator.register_module("text", counting_module(calls.clone(), Duration::ZERO));
        coordinator.register_module("audio", counting_module(calls.clone(), Duration::ZERO));

        let session = registry.create(hw("HW1"), SessionContext::new()).await.unwrap();
        coordinator.track(&session.identity, session.id);
        assert!(!coordinator.should_interrupt(&hw("HW1")));

        let result = coordinator.interrupt(&hw("HW1")).await.expect("interrupt failed");

        assert_eq!(result.outcome, InterruptOutcome::Interrupted);
        assert_eq!(result.session_id, Some(session.id));
        assert!(result.success);
        assert_eq!(result.acknowledged_modules, vec!["audio", "text"]);
        assert!(result.timed_out_modules.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(
            registry.get(session.id).await.unwrap().status,
            SessionStatus::Interrupted
        );
        assert!(registry.active_for(&hw("HW1")).await.is_none());
        assert!(coordinator.should_interrupt(&hw("HW1")));
        assert!(coordinator.should_interrupt_session(session.id));
    }

    #[tokio::test]
    async fn test_flag_is_visible_while_modules_run() {
        let (registry, coordinator) = setup(Duration::from_secs(5));
        let session = registry.create(hw("HW1"), SessionContext::new()).await.unwrap();
        coordinator.track(&session.identity, session.id);

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let probe = coordinator.clone();
        let identity = session.identity.clone();
        coordinator.register_module(
            "probe",
            Arc::new(FnModule::new(move || {
                let probe = probe.clone();
                let seen_tx = seen_tx.clone();
                let identity = identity.clone();
                async move {
                    let _ = seen_tx.send(probe.should_interrupt(&identity));
                    Ok(())
                }
            })),
        );

        coordinator.interrupt(&hw("HW1")).await.unwrap();
        assert_eq!(seen_rx.recv().await, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_module_times_out_and_session_still_interrupted() {
        let (registry, coordinator) = setup(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));
        coordinator.register_module("audio", counting_module(calls.clone(), Duration::from_secs(30)));
        coordinator.register_module("text", counting_module(calls.clone(), Duration::ZERO));

        let session = registry.create(hw("HW1"), SessionContext::new()).await.unwrap();
        let result = coordinator.interrupt(&hw("HW1")).await.unwrap();

        assert_eq!(result.timed_out_modules, vec!["audio"]);
        assert_eq!(result.acknowledged_modules, vec!["text"]);
        assert!(result.success);
        assert!(result.elapsed >= Duration::from_secs(5));
        assert!(result.elapsed < Duration::from_secs(6));
        assert_eq!(
            registry.get(session.id).await.unwrap().status,
            SessionStatus::Interrupted
        );

        let stats = coordinator.module_stats();
        assert_eq!(stats["audio"].timed_out, 1);
        assert_eq!(stats["text"].acknowledged, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_interrupts_invoke_modules_once() {
        let (registry, coordinator) = setup(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));
        coordinator.register_module("text", counting_module(calls.clone(), Duration::from_millis(200)));

        let session = registry.create(hw("HW1"), SessionContext::new()).await.unwrap();
        let id = hw("HW1");
        let (first, second) = tokio::join!(coordinator.interrupt(&id), coordinator.interrupt(&id));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let outcomes = [first.outcome, second.outcome];
        assert!(outcomes.contains(&InterruptOutcome::Interrupted));
        assert!(outcomes.contains(&InterruptOutcome::Joined));
        assert_eq!(first.session_id, Some(session.id));
        assert_eq!(second.session_id, Some(session.id));

        let stats = coordinator.stats();
        assert_eq!(stats.interrupted, 1);
        assert_eq!(stats.joined, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_does_not_strand_session() {
        let (registry, coordinator) = setup(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));
        coordinator.register_module("audio", counting_module(calls.clone(), Duration::from_secs(2)));

        let session = registry.create(hw("HW1"), SessionContext::new()).await.unwrap();
        coordinator.track(&session.identity, session.id);

        let attempt =
            tokio::time::timeout(Duration::from_millis(100), coordinator.interrupt(&hw("HW1"))).await;
        assert!(attempt.is_err());
        assert_eq!(
            registry.get(session.id).await.unwrap().status,
            SessionStatus::Interrupting
        );

        coordinator.settle().await;

        assert_eq!(
            registry.get(session.id).await.unwrap().status,
            SessionStatus::Interrupted
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.stats().in_flight, 0);
        assert_eq!(coordinator.stats().interrupted, 1);
        assert!(coordinator.should_interrupt_session(session.id));
        assert_eq!(coordinator.module_stats()["audio"].acknowledged, 1);
    }

    #[tokio::test]
    async fn test_failing_module_is_reported_not_fatal() {
        let (registry, coordinator) = setup(Duration::from_secs(5));
        coordinator.register_module(
            "transport",
            Arc::new(FnModule::new(|| async {
                Err(Error::Other("socket already closed".to_string()))
            })),
        );

        registry.create(hw("HW1"), SessionContext::new()).await.unwrap();
        let result = coordinator.interrupt(&hw("HW1")).await.unwrap();

        assert!(result.success);
        assert_eq!(result.failed_modules, vec!["transport"]);
        assert!(!result.fully_acknowledged());
        assert_eq!(coordinator.module_stats()["transport"].failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_module_is_skipped_then_reprobed() {
        let (registry, coordinator) = setup(Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));
        coordinator.register_module("audio", counting_module(calls.clone(), Duration::from_secs(10)));

        for round in 0..2 {
            let identity = hw(&format!("round-{round}"));
            registry.create(identity.clone(), SessionContext::new()).await.unwrap();
            let result = coordinator.interrupt(&identity).await.unwrap();
            assert_eq!(result.timed_out_modules, vec!["audio"]);
        }
        assert_eq!(coordinator.module_stats()["audio"].health, ModuleHealth::Unhealthy);

        registry.create(hw("skipped"), SessionContext::new()).await.unwrap();
        let result = coordinator.interrupt(&hw("skipped")).await.unwrap();
        assert_eq!(result.skipped_modules, vec!["audio"]);
        assert!(result.timed_out_modules.is_empty());
        assert!(result.elapsed < Duration::from_secs(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        registry.create(hw("probe"), SessionContext::new()).await.unwrap();
        let result = coordinator.interrupt(&hw("probe")).await.unwrap();
        assert_eq!(result.timed_out_modules, vec!["audio"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stats = &coordinator.module_stats()["audio"];
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.invocations, 3);
    }

    #[tokio::test]
    async fn test_reregistration_replaces_handle() {
        let (registry, coordinator) = setup(Duration::from_secs(5));
        let old_calls = Arc::new(AtomicUsize::new(0));
        let new_calls = Arc::new(AtomicUsize::new(0));
        coordinator.register_module("text", counting_module(old_calls.clone(), Duration::ZERO));
        coordinator.register_module("text", counting_module(new_calls.clone(), Duration::ZERO));
        assert_eq!(coordinator.module_names(), vec!["text"]);

        registry.create(hw("HW1"), SessionContext::new()).await.unwrap();
        coordinator.interrupt(&hw("HW1")).await.unwrap();

        assert_eq!(old_calls.load(Ordering::SeqCst), 0);
        assert_eq!(new_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_observers_notified_and_isolated() {
        let (registry, coordinator) = setup(Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();

        coordinator
            .register_callback("broken", |_result| anyhow::bail!("telemetry sink down"))
            .unwrap();
        coordinator
            .register_callback("recorder", move |result| {
                tx.send(result.session_id)?;
                Ok(())
            })
            .unwrap();
        let err = coordinator
            .register_callback("one-too-many", |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::ObserverLimit(2)));

        let session = registry.create(hw("HW1"), SessionContext::new()).await.unwrap();
        let result = coordinator.interrupt(&hw("HW1")).await.unwrap();
        assert!(result.success);

        let notified = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("observer not notified");
        assert_eq!(notified, Some(Some(session.id)));
    }

    #[tokio::test]
    async fn test_interrupt_session_by_id() {
        let (registry, coordinator) = setup(Duration::from_secs(5));
        let session = registry.create(hw("HW1"), SessionContext::new()).await.unwrap();

        let result = coordinator.interrupt_session(session.id).await.unwrap();
        assert_eq!(result.outcome, InterruptOutcome::Interrupted);

        let again = coordinator.interrupt_session(session.id).await.unwrap();
        assert_eq!(again.outcome, InterruptOutcome::NoActiveSession);
        assert_eq!(again.session_id, Some(session.id));

        let missing = coordinator.interrupt_session(SessionId::new()).await.unwrap_err();
        assert!(matches!(missing, Error::SessionNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_all_counts_identities_despite_timeouts() {
        let (registry, coordinator) = setup(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));
        coordinator.register_module("audio", counting_module(calls.clone(), Duration::from_secs(30)));

        for name in ["A", "B", "C"] {
            registry.create(hw(name), SessionContext::new()).await.unwrap();
        }
        let done = registry.create(hw("D"), SessionContext::new()).await.unwrap();
        registry.complete(done.id).await.unwrap();

        let summary = coordinator.interrupt_all("shutdown").await;

        assert_eq!(summary.interrupted, 3);
        assert!(summary.timed_out_modules.contains("audio"));
        assert!(summary.failures.is_empty());
        assert!(summary.elapsed < Duration::from_secs(6));
        assert_eq!(registry.live_count().await, 0);
    }
}
