//! Session configuration and the local credential store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_WINDOW_CAPACITY;
use crate::error::{Result, TelemetryError};

/// Sensor nodes of plant 1, in the order their snapshots are folded.
pub const DEFAULT_DEVICE_IDS: [&str; 4] = [
    "plant_1_reactor_temp_node_1",
    "plant_1_buffer_node_1",
    "plant_1_heat_output_node_1",
    "plant_1_exhaust_node_1",
];

pub const DEFAULT_BASE_URL: &str = "http://localhost:4000";

/// Path of the push feed relative to the backend root.
pub const FEED_PATH: &str = "/ws/plant";

/// Everything a telemetry session needs to know about its environment.
///
/// Every field has a default, so a config file only lists what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    pub base_url: String,
    /// Explicit feed endpoint; derived from `base_url` when absent.
    pub feed_url: Option<String>,
    pub device_ids: Vec<String>,
    pub window_capacity: usize,
    pub fetch_timeout_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// When set, bootstrap also merges this many trailing minutes of history.
    pub history_seed_minutes: Option<u64>,
    pub token_path: Option<PathBuf>,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            feed_url: None,
            device_ids: DEFAULT_DEVICE_IDS.iter().map(|s| s.to_string()).collect(),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            fetch_timeout_ms: 10_000,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 30_000,
            history_seed_minutes: None,
            token_path: None,
        }
    }
}

impl PlantConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| TelemetryError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(TelemetryError::Config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.window_capacity == 0 {
            return Err(TelemetryError::Config(
                "window_capacity must be at least 1".to_string(),
            ));
        }
        if self.reconnect_initial_ms == 0 || self.reconnect_initial_ms > self.reconnect_max_ms {
            return Err(TelemetryError::Config(format!(
                "reconnect backoff must satisfy 0 < initial ({}) <= max ({})",
                self.reconnect_initial_ms, self.reconnect_max_ms
            )));
        }
        Ok(())
    }

    /// Configured feed URL, or the one derived from `base_url`.
    pub fn feed_url(&self) -> String {
        self.feed_url
            .clone()
            .unwrap_or_else(|| feed_url_from_base(&self.base_url))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    /// Token file location: `token_path`, else `~/.plantwatch/token`.
    pub fn token_path(&self) -> PathBuf {
        self.token_path.clone().unwrap_or_else(default_token_path)
    }
}

/// `http://host` → `ws://host/ws/plant`, `https://host` → `wss://host/ws/plant`.
pub fn feed_url_from_base(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}{FEED_PATH}")
}

fn default_token_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".plantwatch").join("token"))
        .unwrap_or_else(|| PathBuf::from(".plantwatch-token"))
}

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

/// The bearer token persisted between runs. The token is the only local state.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored token. A missing or blank file means no credential.
    pub fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                let token = text.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n", token.trim()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Forget the stored token. Clearing an absent file is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
