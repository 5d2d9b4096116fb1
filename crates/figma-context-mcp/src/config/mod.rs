//! Configuration loading and resolution.

use std::path::PathBuf;
use std::time::Duration;

use figma_context::FigmaAuth;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3333;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Resolve Figma credentials. An OAuth token wins over an API key.
pub fn resolve_auth(api_key: Option<&str>, oauth_token: Option<&str>) -> Option<FigmaAuth> {
    let oauth_token = non_empty(oauth_token).or_else(|| env_non_empty("FIGMA_OAUTH_TOKEN"));
    if let Some(token) = oauth_token {
        return Some(FigmaAuth::oauth(token));
    }

    non_empty(api_key)
        .or_else(|| env_non_empty("FIGMA_API_KEY"))
        .map(FigmaAuth::api_key)
}

/// Resolve the HTTP listen port.
pub fn resolve_port(explicit: Option<u16>) -> u16 {
    if let Some(port) = explicit {
        return port;
    }

    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Resolve the HTTP listen host.
pub fn resolve_host(explicit: Option<&str>) -> String {
    if let Some(host) = non_empty(explicit) {
        return host;
    }

    env_non_empty("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string())
}

/// Directory that `download_figma_images` paths are resolved against.
pub fn resolve_download_root(explicit: Option<&str>) -> PathBuf {
    if let Some(dir) = non_empty(explicit) {
        return PathBuf::from(dir);
    }

    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Settings for the HTTP-facing server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for draining sessions and stopping the listener.
    pub shutdown_timeout: Duration,
    /// Capacity of each session's server-to-client push channel.
    pub outbound_buffer: usize,
    /// Interval between SSE keep-alive comments. Also bounds how long a
    /// vanished client goes unnoticed.
    pub keep_alive: Duration,
}

impl ServerConfig {
    pub fn resolve(host: Option<&str>, port: Option<u16>) -> Self {
        Self {
            host: resolve_host(host),
            port: resolve_port(port),
            ..Self::default()
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}
