//! Configuration loading, resolution, and persistence.
//!
//! Handles the TOML config file (~/.config/sayg/config.toml) with
//! type-prefixed actor sections (`[webserver.<id>]`) plus the `[scoring]`
//! and `[storage]` tables.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub use sayg::SaygConfig;

/// Build a global ID from a type prefix and index: `"webserver.0"`.
pub fn global_id(prefix: &str, index: &str) -> String {
    format!("{prefix}.{index}")
}

/// Generate a short unique ID (8 hex chars from system time). Used for
/// WebSocket source IDs (`ws.{hex}`) and request correlation.
pub fn generate_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:08x}", (ts ^ (seq as u64).rotate_left(17)) as u32)
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Returns `~/.config/sayg/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sayg")
        .join("config.toml")
}

/// Returns `<data dir>/sayg/matches`.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sayg")
        .join("matches")
}

/// Where the match store lives for `config`.
pub fn store_path(config: &SaygConfig) -> PathBuf {
    config
        .storage
        .path
        .clone()
        .unwrap_or_else(default_store_path)
}

// ---------------------------------------------------------------------------
// Persistence I/O
// ---------------------------------------------------------------------------

/// Load persisted config from disk. If the file does not exist, creates it
/// with defaults and returns that. A file that cannot be parsed is left
/// untouched and defaults are used.
pub fn load(path: &Path) -> SaygConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<SaygConfig>(&contents) {
            Ok(config) => {
                tracing::info!("loaded config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("failed to parse {}: {e}", path.display());
                SaygConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let defaults = SaygConfig::default();
            tracing::info!("no config file found, creating {}", path.display());
            save_to(path, &defaults);
            defaults
        }
        Err(e) => {
            tracing::warn!("failed to read {}: {e}", path.display());
            SaygConfig::default()
        }
    }
}

/// Write config to a specific path. Creates parent dirs if needed. Never panics.
pub fn save_to(path: &Path, config: &SaygConfig) {
    if let Some(dir) = path.parent()
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        tracing::warn!("failed to create config dir {}: {e}", dir.display());
        return;
    }
    match toml::to_string_pretty(config) {
        Ok(contents) => {
            if let Err(e) = std::fs::write(path, contents) {
                tracing::warn!("failed to write {}: {e}", path.display());
            }
        }
        Err(e) => {
            tracing::warn!("failed to serialize config: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Cached config
// ---------------------------------------------------------------------------

/// Configuration cached behind a lock and backed by a TOML file.
pub struct SystemConfig {
    path: PathBuf,
    inner: RwLock<SaygConfig>,
}

impl SystemConfig {
    /// Load config from disk (or create defaults) and cache it.
    pub fn new(path: PathBuf) -> Self {
        let config = load(&path);
        Self {
            path,
            inner: RwLock::new(config),
        }
    }

    pub fn snapshot(&self) -> SaygConfig {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Mutate the cached config in place, then persist to disk.
    pub fn update(&self, f: impl FnOnce(&mut SaygConfig)) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
        save_to(&self.path, &guard);
    }
}
