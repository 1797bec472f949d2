use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Memory,
    Cluster,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub context_path: String,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub upgrade_timeout: Duration,
    /// How long a GET with nothing to deliver is parked before a noop answer.
    pub poll_timeout: Duration,
    pub ack_timeout: Duration,
    pub max_payload_bytes: usize,
    pub allow_upgrades: bool,
    pub store: StoreBackend,
    pub node_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 9092,
            context_path: "/socket.io".to_string(),
            ping_interval: Duration::from_millis(25_000),
            ping_timeout: Duration::from_millis(60_000),
            upgrade_timeout: Duration::from_millis(10_000),
            poll_timeout: Duration::from_millis(25_000),
            ack_timeout: Duration::from_millis(30_000),
            max_payload_bytes: 1_000_000,
            allow_upgrades: true,
            store: StoreBackend::Memory,
            node_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let store = match std::env::var("PULSE_STORE")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "cluster" => StoreBackend::Cluster,
            _ => StoreBackend::Memory,
        };

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            context_path: std::env::var("PULSE_CONTEXT_PATH")
                .ok()
                .map(|p| normalize_context_path(&p))
                .unwrap_or(defaults.context_path),
            ping_interval: millis_var("PULSE_PING_INTERVAL_MS").unwrap_or(defaults.ping_interval),
            ping_timeout: millis_var("PULSE_PING_TIMEOUT_MS").unwrap_or(defaults.ping_timeout),
            upgrade_timeout: millis_var("PULSE_UPGRADE_TIMEOUT_MS")
                .unwrap_or(defaults.upgrade_timeout),
            poll_timeout: millis_var("PULSE_POLL_TIMEOUT_MS").unwrap_or(defaults.poll_timeout),
            ack_timeout: millis_var("PULSE_ACK_TIMEOUT_MS").unwrap_or(defaults.ack_timeout),
            max_payload_bytes: std::env::var("PULSE_MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_payload_bytes),
            allow_upgrades: std::env::var("PULSE_ALLOW_UPGRADES")
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or(defaults.allow_upgrades),
            store,
            node_id: std::env::var("PULSE_NODE_ID")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.node_id),
        }
    }

    /// Deadline for hearing from a client again: one interval plus the grace period.
    pub fn heartbeat_deadline(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }
}

/// `socket.io`, `/socket.io/` and `/socket.io` all mean `/socket.io`.
pub fn normalize_context_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn millis_var(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}
