use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub body_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/payroll.db".into(),
            body_limit_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    database_url: Option<String>,
    body_limit_bytes: Option<usize>,
}

/// Defaults, then `server.toml` in the working directory, then the
/// environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    apply_file(&mut settings, Path::new(SETTINGS_FILE));
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, path: &Path) {
    let Ok(raw) = fs::read_to_string(path) else {
        return;
    };
    let file_cfg = match toml::from_str::<FileSettings>(&raw) {
        Ok(file_cfg) => file_cfg,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "ignoring malformed settings file");
            return;
        }
    };

    if let Some(v) = file_cfg.bind_addr {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.body_limit_bytes {
        settings.body_limit_bytes = v;
    }
}

/// Later keys win: the `APP__` form overrides the short one.
fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    for key in ["SERVER_BIND", "APP__BIND_ADDR"] {
        if let Some(v) = lookup(key) {
            settings.server_bind = v;
        }
    }
    for key in ["DATABASE_URL", "APP__DATABASE_URL"] {
        if let Some(v) = lookup(key) {
            settings.database_url = v;
        }
    }
    if let Some(v) = lookup("APP__BODY_LIMIT_BYTES") {
        match v.parse::<usize>() {
            Ok(parsed) => settings.body_limit_bytes = parsed,
            Err(_) => tracing::warn!(value = %v, "ignoring non-numeric APP__BODY_LIMIT_BYTES"),
        }
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
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

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
