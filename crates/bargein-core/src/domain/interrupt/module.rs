//! Interruptible modules
//!
//! A module is anything that produces work on behalf of a session and can be
//! told to stop: a text generator, an audio synthesizer, an outbound stream.
//! The coordinator only ever sees the narrow [`Interruptible`] capability;
//! adapters wrap real modules.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Capability to stop in-flight work
///
/// `stop` should perform best-effort cleanup and return promptly. The
/// coordinator bounds how long it waits; a module that overruns is reported
/// as timed out and its stop task is aborted.
#[async_trait]
pub trait Interruptible: Send + Sync {
    async fn stop(&self) -> Result<()>;
}

/// Adapter for an async closure
pub struct FnModule<F> {
    f: F,
}

impl<F, Fut> FnModule<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Interruptible for FnModule<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn stop(&self) -> Result<()> {
        (self.f)().await
    }
}

/// Adapter for a synchronous cleanup function, run on the blocking pool
pub struct BlockingModule<F> {
    f: Arc<F>,
}

impl<F> BlockingModule<F>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl<F> Interruptible for BlockingModule<F>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    async fn stop(&self) -> Result<()> {
        let f = self.f.clone();
        tokio::task::spawn_blocking(move || f())
            .await
            .map_err(|e| Error::Other(format!("Task join error: {}", e)))?
    }
}

/// Whether a module is currently invoked on interrupts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleHealth {
    Healthy,
    /// Skipped until the re-probe interval elapses
    Unhealthy,
}

impl fmt::Display for ModuleHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Per-module acknowledgment statistics
#[derive(Debug, Clone, Serialize)]
pub struct ModuleStats {
    pub invocations: u64,
    pub acknowledged: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub skipped: u64,
    pub consecutive_timeouts: u32,
    pub last_elapsed: Option<Duration>,
    pub health: ModuleHealth,
    #[serde(skip)]
    pub unhealthy_since: Option<Instant>,
}

impl Default for ModuleStats {
    fn default() -> Self {
        Self {
            invocations: 0,
            acknowledged: 0,
            timed_out: 0,
            failed: 0,
            skipped: 0,
            consecutive_timeouts: 0,
            last_elapsed: None,
            health: ModuleHealth::Healthy,
            unhealthy_since: None,
        }
    }
}

impl ModuleStats {
    /// Whether the module should be skipped at `now`
    pub(crate) fn should_skip(&self, now: Instant, reprobe_interval: Duration) -> bool {
        match (self.health, self.unhealthy_since) {
            (ModuleHealth::Unhealthy, Some(since)) => now.duration_since(since) < reprobe_interval,
            _ => false,
        }
    }

    pub(crate) fn record_ack(&mut self, elapsed: Duration) {
        self.acknowledged += 1;
        self.consecutive_timeouts = 0;
        self.last_elapsed = Some(elapsed);
        self.health = ModuleHealth::Healthy;
        self.unhealthy_since = None;
    }

    pub(crate) fn record_failure(&mut self, elapsed: Duration) {
        self.failed += 1;
        self.last_elapsed = Some(elapsed);
    }

    /// Returns true when this timeout made the module unhealthy
    pub(crate) fn record_timeout(&mut self, elapsed: Duration, unhealthy_after: u32, now: Instant) -> bool {
        self.timed_out += 1;
        self.consecutive_timeouts += 1;
        self.last_elapsed = Some(elapsed);
        if self.consecutive_timeouts >= unhealthy_after {
            let newly = self.health == ModuleHealth::Healthy;
            self.health = ModuleHealth::Unhealthy;
            self.unhealthy_since = Some(now);
            return newly;
        }
        false
    }
}
