use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::response::rate_limit::{RATE_LIMIT, RATE_WINDOW_MS};

pub const DEFAULT_API_URL: &str = "http://localhost:8787";
pub const DEFAULT_MODEL: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub model: String,
    /// Gap between the selection and the popup.
    pub popup_margin_px: f64,
    pub corner_margin_px: f64,
    pub rate_limit: usize,
    pub rate_window_ms: u64,
    pub request_timeout_secs: u64,
    pub speech_timeout_secs: u64,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.into(),
            model: DEFAULT_MODEL.into(),
            popup_margin_px: 8.0,
            corner_margin_px: 1.0,
            rate_limit: RATE_LIMIT,
            rate_window_ms: RATE_WINDOW_MS,
            request_timeout_secs: 60,
            speech_timeout_secs: 30,
            debug: false,
        }
    }
}

impl Settings {
    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn speech_timeout(&self) -> Duration {
        Duration::from_secs(self.speech_timeout_secs)
    }

    /// `INKLING_API_URL`, `INKLING_MODEL` and `INKLING_DEBUG` win over the file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("INKLING_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(model) = lookup("INKLING_MODEL").filter(|v| !v.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        if let Some(debug) = lookup("INKLING_DEBUG") {
            self.debug = debug == "1" || debug.eq_ignore_ascii_case("true");
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data: Settings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Settings::default()
        };
        data.apply_env();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> Result<Settings> {
        let guard = self
            .data
            .read()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        Ok(guard.clone())
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let mut data: Settings = serde_json::from_str(&contents)?;
        data.apply_env();
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("inkling-{}-{}.json", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"model":"fast"}"#).unwrap();
        assert_eq!(settings.model, "fast");
        assert_eq!(settings.popup_margin_px, 8.0);
        assert_eq!(settings.rate_limit, 5);
        assert_eq!(settings.rate_window(), Duration::from_secs(60));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut settings = Settings::default();
        settings.apply_overrides(|key| match key {
            "INKLING_MODEL" => Some("large".into()),
            "INKLING_DEBUG" => Some("TRUE".into()),
            "INKLING_API_URL" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(settings.model, "large");
        assert!(settings.debug);
        assert_eq!(settings.api_base_url, DEFAULT_API_URL);
    }

    #[test]
    fn update_persists_and_reload_reads_back() {
        let path = temp_path("roundtrip");
        let store = SettingsStore::new(path.clone()).unwrap();
        let mut settings = store.get().unwrap();
        settings.popup_margin_px = 12.0;
        store.update(settings).unwrap();

        let reopened = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reopened.get().unwrap().popup_margin_px, 12.0);
        reopened.reload().unwrap();
        assert_eq!(reopened.get().unwrap().popup_margin_px, 12.0);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let path = temp_path("corrupt");
        fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.get().unwrap().corner_margin_px, 1.0);
        let _ = fs::remove_file(path);
    }
}
