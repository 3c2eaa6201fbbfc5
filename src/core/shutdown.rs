//! Centralized graceful shutdown (spec.md §5 cancellation, §9 "stop token").

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

const SHUTDOWN_TASK_TIMEOUT_SECS: u64 = 30;

/// A single abort signal drives cleanup for every account's Subscription
/// Manager. Cloning shares the same underlying signal and task registry.
#[derive(Clone)]
pub struct ShutdownService {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Default for ShutdownService {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownService {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a background task handle to be awaited during shutdown.
    pub async fn register(&self, handle: JoinHandle<()>) {
        self.handles.lock().await.push(handle);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Trigger shutdown and wait (bounded) for every registered task to
    /// finish its best-effort cleanup (spec.md §5: revoke token, close
    /// socket, stop watchdog; in-flight inbound tasks run to completion).
    pub async fn shutdown(&self) {
        self.trigger();
        self.await_tasks().await;
    }

    /// Wait (bounded) for every registered task to finish, without
    /// (re-)triggering the signal. Used after a caller has already observed
    /// the trigger via `wait()`, so the flag is set but the registered
    /// subscription tasks still need time to unwind.
    pub async fn await_tasks(&self) {
        tracing::debug!("initiating graceful shutdown");

        let handles = std::mem::take(&mut *self.handles.lock().await);
        let count = handles.len();
        tracing::debug!(count, "waiting for registered tasks to stop");

        let timeout = Duration::from_secs(SHUTDOWN_TASK_TIMEOUT_SECS);
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!(timeout_secs = timeout.as_secs(), "timed out waiting for tasks");
        }

        tracing::debug!("shutdown complete");
    }

    pub fn wait(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            let _ = rx.wait_for(|&v| v).await;
        }
    }

    /// Install Ctrl-C/SIGTERM handlers that trigger shutdown.
    pub fn install_signal_handlers(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                let _ = tokio::signal::ctrl_c().await;
            };

            #[cfg(unix)]
            let terminate = async {
                if let Ok(mut sig) =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                {
                    sig.recv().await;
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
                _ = terminate => tracing::info!("received SIGTERM, shutting down"),
            }

            service.trigger();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_triggered_initially() {
        let s = ShutdownService::new();
        assert!(!s.is_triggered());
    }

    #[tokio::test]
    async fn trigger_sets_flag() {
        let s = ShutdownService::new();
        s.trigger();
        assert!(s.is_triggered());
    }

    #[tokio::test]
    async fn subscriber_observes_trigger() {
        let s = ShutdownService::new();
        let rx = s.subscribe();
        assert!(!*rx.borrow());
        s.trigger();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn shutdown_awaits_registered_tasks() {
        let s = ShutdownService::new();
        let ran = Arc::new(tokio::sync::Mutex::new(false));
        let ran_clone = ran.clone();
        let mut rx = s.subscribe();
        let handle = tokio::spawn(async move {
            let _ = rx.changed().await;
            *ran_clone.lock().await = true;
        });
        s.register(handle).await;

        s.shutdown().await;
        assert!(*ran.lock().await);
    }

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let s = ShutdownService::new();
        let fut = s.wait();
        let handle = tokio::spawn(fut);
        tokio::task::yield_now().await;
        s.trigger();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
