//! Listener and transport settings.

use std::path::PathBuf;
use std::time::Duration;

/// `POST /process_email` is served here unless overridden.
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub host: String,
    /// 0 lets the OS pick a free port.
    pub port: u16,
    /// Serve HTTPS when set.
    pub tls: Option<TlsConfig>,
    /// Origins allowed by CORS; `"*"` allows all.
    pub cors_origins: Vec<String>,
    /// Whole-request deadline enforced by the transport (408). Must outlast
    /// the per-operation handler timeout.
    pub request_timeout: Duration,
    /// Larger bodies are refused with 413 before reaching the validator.
    pub max_body_bytes: usize,
    /// Upper bound on waiting for accepted submissions during shutdown.
    pub drain_timeout: Duration,
}

impl NetworkConfig {
    /// `host:port` as handed to the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tls: None,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(60),
            max_body_bytes: 2 * 1024 * 1024,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// PEM certificate chain and private key. Both are required.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}
