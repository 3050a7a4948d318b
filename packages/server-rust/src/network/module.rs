//! HTTP server for the notification router.
//!
//! Binding is separate from serving so callers learn the real port first
//! and can grab the shutdown controller before the server runs.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    health_handler, liveness_handler, process_email_handler, readiness_handler,
    task_status_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::app::Application;

/// Owns the listener and the shutdown controller for one server instance.
///
/// `new()` binds nothing, `start()` binds, `serve()` runs until shutdown and
/// then drains.
pub struct NetworkModule {
    config: NetworkConfig,
    app: Application,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
    start_time: Instant,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, app: Application) -> Self {
        Self {
            config,
            app,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    /// Triggering this controller stops `serve()` like the shutdown future.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// `POST /process_email`, `GET /tasks/{task_id}` and the three health
    /// routes, wrapped in the transport layers.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            app: self.app.clone(),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: self.start_time,
        };

        Router::new()
            .route("/process_email", post(process_email_handler))
            .route("/tasks/{task_id}", get(task_status_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Bind the listener and return the bound port (the OS picks one when
    /// the configured port is 0).
    ///
    /// # Errors
    ///
    /// The address is invalid or already in use.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Accept requests until `shutdown` resolves or the controller fires,
    /// then refuse new submissions and wait up to `drain_timeout` for the
    /// accepted ones.
    ///
    /// # Errors
    ///
    /// `start()` was not called, the TLS files cannot be loaded, or the
    /// server hit a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();
        let ctrl = self.shutdown;
        let config = self.config;

        // Subscribe before going Ready so an early trigger is not missed.
        let signal = shutdown_signal(Arc::clone(&ctrl), ctrl.shutdown_receiver(), shutdown);
        ctrl.set_ready();

        match &config.tls {
            Some(tls) => serve_tls(listener, router, tls, signal).await?,
            None => serve_plain(listener, router, signal).await?,
        }

        drain(&ctrl, config.drain_timeout).await;
        Ok(())
    }
}

/// First of the external future and a controller trigger; either way the
/// server is Draining when this returns.
async fn shutdown_signal(
    ctrl: Arc<ShutdownController>,
    mut rx: watch::Receiver<bool>,
    external: impl Future<Output = ()> + Send + 'static,
) {
    tokio::select! {
        () = external => {}
        _ = rx.changed() => {}
    }
    ctrl.trigger_shutdown();
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("serving http");
    axum::serve(listener, router)
        .with_graceful_shutdown(signal)
        .await?;
    Ok(())
}

/// rustls via `axum-server`, reusing the listener bound in `start()`.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot load TLS certificate or key: {e}"))?;

    let addr = listener.local_addr()?;
    let handle = axum_server::Handle::new();
    let stopper = handle.clone();
    tokio::spawn(async move {
        signal.await;
        stopper.graceful_shutdown(None);
    });

    info!(%addr, "serving https");
    axum_server::from_tcp_rustls(listener.into_std()?, rustls)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

async fn drain(ctrl: &ShutdownController, timeout: Duration) {
    ctrl.trigger_shutdown();

    let in_flight = ctrl.in_flight_count();
    if in_flight > 0 {
        info!(in_flight, "waiting for in-flight submissions");
    }
    if ctrl.wait_for_drain(timeout).await {
        info!("server drained");
    } else {
        warn!(
            remaining = ctrl.in_flight_count(),
            timeout_secs = timeout.as_secs(),
            "drain timed out"
        );
    }
}
