//! Server configuration.

use std::path::PathBuf;

/// Configuration for the transit server.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `3000`; `0` auto-assigns).
    pub port: u16,
    /// Directory served for any path that isn't an API route.
    pub public_dir: PathBuf,
    /// JSON file holding pickup requests.
    pub data_file: PathBuf,
    /// Per-client outbound queue length before messages are dropped.
    pub max_send_queue: usize,
    /// Ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Drop clients that haven't answered a ping for this long.
    pub client_timeout_secs: u64,
    /// How often dead clients are swept, in seconds.
    pub cleanup_interval_secs: u64,
    /// Start with the demo routes/schedules/locations instead of empty state.
    pub seed: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            public_dir: PathBuf::from("public"),
            data_file: PathBuf::from("pickupRequests.json"),
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            cleanup_interval_secs: 60,
            seed: true,
        }
    }
}

impl ServerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `PORT`, `TRANSIT_HOST`, `TRANSIT_PUBLIC_DIR` and `TRANSIT_DATA_FILE`.
    /// Invalid values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = read_env_u16("PORT") {
            self.port = v;
        }
        if let Some(v) = read_env_string("TRANSIT_HOST") {
            self.host = v;
        }
        if let Some(v) = read_env_string("TRANSIT_PUBLIC_DIR") {
            self.public_dir = PathBuf::from(v);
        }
        if let Some(v) = read_env_string("TRANSIT_DATA_FILE") {
            self.data_file = PathBuf::from(v);
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn read_env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn read_env_u16(key: &str) -> Option<u16> {
    parse_port(&std::env::var(key).ok()?)
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse().ok()
}
