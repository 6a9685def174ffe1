use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    /// Region code reported for presentations first seen by this node.
    pub region_code: String,
    /// Idle window after which empty presentations are dropped; 0 keeps them forever.
    pub idle_reap_seconds: u64,
    pub reap_interval_seconds: u64,
    pub session_queue_capacity: usize,
    pub max_frame_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8787".into(),
            database_url: "sqlite://./data/pace.db".into(),
            region_code: "local".into(),
            idle_reap_seconds: 3600,
            reap_interval_seconds: 60,
            session_queue_capacity: presentation::DEFAULT_SESSION_QUEUE_CAPACITY,
            max_frame_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    database_url: Option<String>,
    region_code: Option<String>,
    idle_reap_seconds: Option<u64>,
    reap_interval_seconds: Option<u64>,
    session_queue_capacity: Option<usize>,
    max_frame_bytes: Option<usize>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new("server.toml"), |key| std::env::var(key).ok())
}

/// Defaults, then `path` if it exists, then environment variables.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(error) => warn!(path = %path.display(), %error, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__REGION_CODE") {
        settings.region_code = v;
    }

    if let Some(parsed) = parse_env(&env, "APP__IDLE_REAP_SECONDS") {
        settings.idle_reap_seconds = parsed;
    }
    if let Some(parsed) = parse_env(&env, "APP__REAP_INTERVAL_SECONDS") {
        settings.reap_interval_seconds = parsed;
    }
    if let Some(parsed) = parse_env(&env, "APP__SESSION_QUEUE_CAPACITY") {
        settings.session_queue_capacity = parsed;
    }
    if let Some(parsed) = parse_env(&env, "APP__MAX_FRAME_BYTES") {
        settings.max_frame_bytes = parsed;
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.bind_addr {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.region_code {
        settings.region_code = v;
    }
    if let Some(v) = file_cfg.idle_reap_seconds {
        settings.idle_reap_seconds = v;
    }
    if let Some(v) = file_cfg.reap_interval_seconds {
        settings.reap_interval_seconds = v;
    }
    if let Some(v) = file_cfg.session_queue_capacity {
        settings.session_queue_capacity = v;
    }
    if let Some(v) = file_cfg.max_frame_bytes {
        settings.max_frame_bytes = v;
    }
}

fn parse_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
