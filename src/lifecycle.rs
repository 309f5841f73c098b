//! Process lifecycle: both HTTP surfaces, the delayed admin shutdown, and
//! the final release of every index handle.

use std::{
    future::IntoFuture,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};

use crate::{
    engine::Engine,
    error::Result,
    registry::{CloseSummary, IndexRegistry},
    server::{admin_router, api_router},
    service::Service,
};

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared shutdown signal. Cloning yields another handle to the same
/// signal.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    inner: Arc<TriggerInner>,
}

#[derive(Debug)]
struct TriggerInner {
    fired: watch::Sender<bool>,
    scheduled: AtomicBool,
    grace: Duration,
}

impl ShutdownTrigger {
    pub fn new(grace: Duration) -> Self {
        let (fired, _) = watch::channel(false);
        Self {
            inner: Arc::new(TriggerInner {
                fired,
                scheduled: AtomicBool::new(false),
                grace,
            }),
        }
    }

    pub fn grace(&self) -> Duration {
        self.inner.grace
    }

    /// Fire the signal after the grace delay. Only the first call starts a
    /// timer. Returns the grace delay. Must be called inside a runtime.
    pub fn schedule(&self) -> Duration {
        let grace = self.inner.grace;
        if self.inner.scheduled.swap(true, Ordering::SeqCst) {
            return grace;
        }

        info!(grace_secs = grace.as_secs_f64(), "shutdown scheduled");
        let trigger = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            trigger.trigger_now();
        });
        grace
    }

    /// Fire the signal immediately.
    pub fn trigger_now(&self) {
        if !self.inner.fired.send_replace(true) {
            info!("shutdown signalled, draining requests");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.fired.borrow()
    }

    /// Resolves once the signal has fired.
    pub async fn wait(&self) {
        let mut rx = self.inner.fired.subscribe();
        // The sender lives in `self`, so this only ends when it fires.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub admin_listen: SocketAddr,
    pub shutdown_grace: Duration,
    /// How long in-flight connections may keep running after the signal
    /// fires before they are abandoned.
    pub drain_timeout: Duration,
}

/// Owns the registry for the lifetime of the process.
pub struct Lifecycle<E: Engine> {
    registry: Arc<IndexRegistry<E>>,
    config: ServerConfig,
    trigger: ShutdownTrigger,
}

impl<E: Engine> Lifecycle<E> {
    pub fn new(registry: IndexRegistry<E>, config: ServerConfig) -> Self {
        let trigger = ShutdownTrigger::new(config.shutdown_grace);
        Self {
            registry: Arc::new(registry),
            config,
            trigger,
        }
    }

    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Bind both listeners from the config and serve until shutdown.
    pub async fn run(self) -> Result<CloseSummary> {
        let api = TcpListener::bind(self.config.listen).await?;
        let admin = TcpListener::bind(self.config.admin_listen).await?;
        self.serve(api, admin).await
    }

    /// Serve both surfaces on already-bound listeners. Returns once both
    /// have drained, or the drain timeout has passed, and every index
    /// handle has been closed.
    pub async fn serve(
        self,
        api: TcpListener,
        admin: TcpListener,
    ) -> Result<CloseSummary> {
        info!(
            api = %api.local_addr()?,
            admin = %admin.local_addr()?,
            "listening"
        );

        let interrupt = tokio::spawn(forward_ctrl_c(self.trigger.clone()));

        let service = Service::new(Arc::clone(&self.registry));
        let api_server = axum::serve(api, api_router(service))
            .with_graceful_shutdown(signalled(self.trigger.clone()));
        let admin_server = axum::serve(admin, admin_router(self.trigger()))
            .with_graceful_shutdown(signalled(self.trigger.clone()));

        let servers = std::pin::pin!(async {
            tokio::join!(api_server.into_future(), admin_server.into_future())
        });
        let deadline =
            drain_deadline(self.trigger.clone(), self.config.drain_timeout);
        let drained = tokio::select! {
            results = servers => Some(results),
            () = deadline => None,
        };
        interrupt.abort();
        if drained.is_none() {
            warn!(
                timeout_secs = self.config.drain_timeout.as_secs_f64(),
                "drain timed out, abandoning open connections"
            );
        }

        let registry = self.registry;
        let summary =
            tokio::task::spawn_blocking(move || registry.close_all()).await?;

        if let Some((api_result, admin_result)) = drained {
            api_result?;
            admin_result?;
        }
        info!("shutdown complete");
        Ok(summary)
    }
}

async fn signalled(trigger: ShutdownTrigger) {
    trigger.wait().await;
}

/// Resolves `drain` after the signal fires.
async fn drain_deadline(trigger: ShutdownTrigger, drain: Duration) {
    trigger.wait().await;
    tokio::time::sleep(drain).await;
}

async fn forward_ctrl_c(trigger: ShutdownTrigger) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received Ctrl+C");
            trigger.trigger_now();
        }
        Err(e) => warn!(error = %e, "could not listen for Ctrl+C"),
    }
}
