use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use staffdesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Effective configuration values, each annotated with where it came from.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let lines = [
        "effective config (source precedence: env > file > default):".to_string(),
        render_line(
            "database.url",
            &redact_database_url(&config.database.url),
            source("database.url", &["STAFFDESK_DATABASE_URL"]),
        ),
        render_line(
            "database.max_connections",
            &config.database.max_connections.to_string(),
            source("database.max_connections", &["STAFFDESK_DATABASE_MAX_CONNECTIONS"]),
        ),
        render_line(
            "database.timeout_secs",
            &config.database.timeout_secs.to_string(),
            source("database.timeout_secs", &["STAFFDESK_DATABASE_TIMEOUT_SECS"]),
        ),
        render_line(
            "approvals.read_timeout_ms",
            &config.approvals.read_timeout_ms.to_string(),
            source("approvals.read_timeout_ms", &["STAFFDESK_APPROVALS_READ_TIMEOUT_MS"]),
        ),
        render_line(
            "logging.level",
            &config.logging.level,
            source("logging.level", &["STAFFDESK_LOGGING_LEVEL", "STAFFDESK_LOG_LEVEL"]),
        ),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            source("logging.format", &["STAFFDESK_LOGGING_FORMAT", "STAFFDESK_LOG_FORMAT"]),
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("staffdesk.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/staffdesk.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Query parameters are not echoed back.
pub(crate) fn redact_database_url(url: &str) -> String {
    match url.split_once('?') {
        Some((path, _)) => format!("{path}?<redacted>"),
        None => url.to_string(),
    }
}
