use std::{fs, path::Path};

use serde::Deserialize;

pub const SETTINGS_FILE: &str = "payroll.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8080/api".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base: Option<String>,
}

/// Defaults, then `payroll.toml`, then the environment. The `--api-base`
/// flag is applied by the caller.
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
    match toml::from_str::<FileSettings>(&raw) {
        Ok(FileSettings {
            api_base: Some(api_base),
        }) => settings.api_base = api_base,
        Ok(_) => {}
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "ignoring malformed settings file")
        }
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    for key in ["PAYROLL_API_BASE", "APP__API_BASE"] {
        if let Some(v) = lookup(key).filter(|v| !v.trim().is_empty()) {
            settings.api_base = v;
        }
    }
}
