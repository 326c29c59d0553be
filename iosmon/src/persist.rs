//! Recently used endpoints and the theme preference.
//! Stored under XDG config dir: $XDG_CONFIG_HOME/iosmon/history.json
//! (fallback ~/.config/iosmon/history.json)

use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use url::Url;

use crate::error::UrlError;

pub const MAX_HISTORY: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryItem {
    pub url: String,
    /// Unix millis.
    pub last_used: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

impl ThemeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Some(ThemeMode::System),
            "light" => Some(ThemeMode::Light),
            "dark" => Some(ThemeMode::Dark),
            _ => None,
        }
    }

    /// A terminal gives us no reliable preference signal; `system` renders dark.
    pub fn is_dark(self) -> bool {
        !matches!(self, ThemeMode::Light)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub history: Vec<HistoryItem>,
    #[serde(default)]
    pub theme: ThemeMode,
}

impl Settings {
    /// Move `url` to the front (inserting if new) and trim to [`MAX_HISTORY`].
    pub fn remember(&mut self, url: &str, now_ms: i64) {
        let url = format_ws_url(url);
        let item = match self.history.iter().position(|h| h.url == url) {
            Some(i) => {
                let mut item = self.history.remove(i);
                item.last_used = now_ms;
                item
            }
            None => HistoryItem {
                url,
                last_used: now_ms,
                label: None,
            },
        };
        self.history.insert(0, item);
        self.history.truncate(MAX_HISTORY);
    }

    pub fn forget(&mut self, url: &str) -> bool {
        let url = format_ws_url(url);
        let before = self.history.len();
        self.history.retain(|h| h.url != url);
        self.history.len() != before
    }

    pub fn most_recent(&self) -> Option<&str> {
        self.history.first().map(|h| h.url.as_str())
    }
}

/// Prefix `ws://` when the user typed a bare `host:port`.
pub fn format_ws_url(input: &str) -> String {
    let s = input.trim();
    if s.starts_with("ws://") || s.starts_with("wss://") {
        s.to_string()
    } else {
        format!("ws://{s}")
    }
}

/// Normalize and validate a user-entered endpoint.
pub fn validate_ws_url(input: &str) -> Result<String, UrlError> {
    if input.trim().is_empty() {
        return Err(UrlError::Empty);
    }
    if let Some((scheme, _)) = input.trim().split_once("://") {
        if scheme != "ws" && scheme != "wss" {
            return Err(UrlError::Scheme(scheme.to_string()));
        }
    }
    let formatted = format_ws_url(input);
    let parsed = Url::parse(&formatted).map_err(|_| UrlError::Invalid(input.trim().to_string()))?;
    match parsed.host_str() {
        Some(h) if !h.is_empty() => Ok(formatted),
        _ => Err(UrlError::Invalid(input.trim().to_string())),
    }
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("iosmon")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("iosmon")
    }
}

pub fn settings_path() -> PathBuf {
    config_dir().join("history.json")
}

pub fn load_settings() -> Settings {
    match fs::read_to_string(settings_path()) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => Settings::default(),
    }
}

pub fn save_settings(s: &Settings) -> std::io::Result<()> {
    let path = settings_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(s)?;
    fs::write(path, data)
}
