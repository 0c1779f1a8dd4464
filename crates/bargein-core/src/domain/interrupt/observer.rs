//! Interrupt observers
//!
//! Observers are notified after an interrupt completes, mostly for telemetry.
//! Each notification runs as its own task; a failing or panicking observer is
//! logged and never affects the interrupt or the other observers.

use super::result::InterruptResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait InterruptObserver: Send + Sync {
    /// Called once per completed interrupt
    async fn on_interrupt(&self, result: &InterruptResult) -> anyhow::Result<()>;

    /// Name used in logs
    fn name(&self) -> &str {
        "observer"
    }
}

/// Observer backed by a plain closure
pub struct CallbackObserver<F> {
    name: String,
    f: F,
}

impl<F> CallbackObserver<F>
where
    F: Fn(&InterruptResult) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> InterruptObserver for CallbackObserver<F>
where
    F: Fn(&InterruptResult) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_interrupt(&self, result: &InterruptResult) -> anyhow::Result<()> {
        (self.f)(result)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Notify every observer on its own task
pub(crate) fn notify_all(observers: &[Arc<dyn InterruptObserver>], result: &InterruptResult) {
    for observer in observers {
        let observer = observer.clone();
        let result = result.clone();
        let name = observer.name().to_string();

        let task = tokio::spawn(async move { observer.on_interrupt(&result).await });
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(observer = %name, error = %e, "Interrupt observer failed"),
                Err(e) if e.is_panic() => warn!(observer = %name, "Interrupt observer panicked"),
                Err(e) => warn!(observer = %name, error = %e, "Interrupt observer cancelled"),
            }
        });
    }
}
