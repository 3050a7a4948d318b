//! `newsroute-server`: routes newsletter notifications to per-source handlers.
//!
//! ```bash
//! newsroute-server --port 5000 --rules rules.json --log-format json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use newsroute_core::ClassificationTable;
use newsroute_server::network::DEFAULT_PORT;
use newsroute_server::observability::{init_logging, LogFormat};
use newsroute_server::{
    AcknowledgeHandler, ApplicationBuilder, NetworkConfig, NetworkModule, ServerConfig, TlsConfig,
};
use tracing::{info, warn};

/// Newsletter notification router.
#[derive(Debug, Parser)]
#[command(name = "newsroute-server")]
#[command(about = "Validates, classifies and dispatches newsletter notifications")]
#[command(version)]
struct Args {
    /// Bind address.
    #[arg(long, env = "NEWSROUTE_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "NEWSROUTE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// JSON classification table replacing the built-in newsletter rules.
    #[arg(long, env = "NEWSROUTE_RULES")]
    rules: Option<PathBuf>,

    #[arg(long, env = "NEWSROUTE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Upper bound on a synchronous handler call. 0 disables the bound.
    #[arg(long, env = "NEWSROUTE_HANDLER_TIMEOUT_MS", default_value_t = 30_000)]
    handler_timeout_ms: u64,

    /// Concurrent operations before requests are shed with 503.
    #[arg(
        long,
        env = "NEWSROUTE_MAX_CONCURRENT",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_concurrent: u32,

    #[arg(long, env = "NEWSROUTE_BROKER_WORKERS", default_value_t = 4)]
    broker_workers: usize,

    /// Queue length per broker worker.
    #[arg(long, env = "NEWSROUTE_BROKER_QUEUE_CAPACITY", default_value_t = 256)]
    broker_queue_capacity: usize,

    /// Retention for finished task results. Unset keeps them forever.
    #[arg(long, env = "NEWSROUTE_RESULT_TTL_MS")]
    result_ttl_ms: Option<u64>,

    /// Allowed CORS origins, comma separated.
    #[arg(long, env = "NEWSROUTE_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    #[arg(long, env = "NEWSROUTE_MAX_BODY_BYTES", default_value_t = 2 * 1024 * 1024)]
    max_body_bytes: usize,

    /// Seconds to wait for in-flight submissions on shutdown.
    #[arg(long, env = "NEWSROUTE_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    drain_timeout_secs: u64,

    #[arg(long, env = "NEWSROUTE_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    #[arg(long, env = "NEWSROUTE_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            handler_timeout_ms: (self.handler_timeout_ms > 0).then_some(self.handler_timeout_ms),
            max_concurrent_operations: self.max_concurrent,
            broker_workers: self.broker_workers,
            broker_queue_capacity: self.broker_queue_capacity,
            result_ttl_ms: self.result_ttl_ms,
            ..ServerConfig::default()
        }
    }

    fn network_config(&self) -> NetworkConfig {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => None,
        };
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls,
            cors_origins: self.cors_origins.clone(),
            max_body_bytes: self.max_body_bytes,
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    fn load_table(&self) -> anyhow::Result<ClassificationTable> {
        let Some(path) = &self.rules else {
            return Ok(ClassificationTable::default_newsletters());
        };
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("reading rules file {}", path.display()))?;
        ClassificationTable::from_json(&document)
            .with_context(|| format!("parsing rules file {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    let table = args.load_table()?;
    let ids: Vec<String> = table.handler_ids().map(|id| id.as_str().to_string()).collect();

    let mut builder = ApplicationBuilder::new(table).config(args.server_config());
    for id in &ids {
        builder = builder.handler(id, Arc::new(AcknowledgeHandler::new(id.as_str())))?;
    }
    let app = builder.build()?;
    app.start().await?;
    info!(rules = ids.len(), "newsroute application started");

    let mut network = NetworkModule::new(args.network_config(), app.clone());
    network.start().await?;
    network
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    app.stop(false).await?;
    info!("newsroute server stopped");
    Ok(())
}
