use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::graph_utils::interaction::GraphViewConfig;
use crate::graph_utils::layout::LayoutParams;

const APP_DIR: &str = "Research-Buddy";
const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "VITE_GEMINI_API_KEY"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub model_name: String,
    pub api_base_url: String,
    // If None, the key is read from the environment at request time
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    // If None, model requests never time out
    pub request_timeout_secs: Option<u64>,
    // If None, use OS temporary directory for exports
    pub export_override: Option<PathBuf>,
    pub layout: LayoutParams,
    pub graph_view: GraphViewConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_name: Self::default_model(),
            api_base_url: Self::default_base_url(),
            api_key: None,
            // Low temperature for factual extraction
            temperature: Some(0.2),
            request_timeout_secs: None,
            export_override: None,
            layout: LayoutParams::default(),
            graph_view: GraphViewConfig::default(),
        }
    }
}

impl AppSettings {
    fn config_dir() -> PathBuf {
        // Cross-platform user config dir
        #[cfg(target_os = "macos")]
        {
            // ~/Library/Application Support/Research-Buddy
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join("Library").join("Application Support").join(APP_DIR);
        }
        #[cfg(target_os = "windows")]
        {
            // %APPDATA%\Research-Buddy
            if let Ok(appdata) = std::env::var("APPDATA") {
                return PathBuf::from(appdata).join(APP_DIR);
            }
            return PathBuf::from(APP_DIR);
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_CONFIG_HOME/Research-Buddy or ~/.config/Research-Buddy
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                return PathBuf::from(xdg).join(APP_DIR);
            }
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join(".config").join(APP_DIR);
        }
    }

    pub(crate) fn default_model() -> String { "gemini-2.5-flash".to_string() }
    pub(crate) fn default_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }

    /// Return the directory where the settings file (settings.json) is stored.
    pub fn settings_dir() -> PathBuf {
        Self::config_dir()
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_dir().join("settings.json");
        if path.exists() {
            return Self::load_from(&path);
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut f = fs::File::open(path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        let v: Self = serde_json::from_str(&s)?;
        Ok(v)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;
        self.save_to(&dir.join("settings.json"))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let s = serde_json::to_string_pretty(self)?;
        let mut f = fs::File::create(path)?;
        f.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Configured key first, then the environment. Empty strings count as unset.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                API_KEY_VARS
                    .iter()
                    .filter_map(|var| std::env::var(var).ok())
                    .find(|k| !k.trim().is_empty())
            })
    }

    /// Default export directory when no override is set: OS temporary directory.
    /// Example: {temp_dir}/Research-Buddy/exports
    pub fn export_default_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(APP_DIR);
        p.push("exports");
        p
    }

    /// Effective export directory honoring user override or falling back to OS temp.
    pub fn export_dir(&self) -> PathBuf {
        if let Some(p) = &self.export_override { return p.clone(); }
        Self::export_default_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let s: AppSettings = serde_json::from_str(r#"{"model_name":"gemini-2.5-pro"}"#).unwrap();
        assert_eq!(s.model_name, "gemini-2.5-pro");
        assert_eq!(s.temperature, Some(0.2));
        assert_eq!(s.layout, LayoutParams::default());
    }

    #[test]
    fn configured_key_wins() {
        let s = AppSettings { api_key: Some("abc".into()), ..AppSettings::default() };
        assert_eq!(s.resolved_api_key().as_deref(), Some("abc"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let s = AppSettings { request_timeout_secs: Some(90), export_override: Some(dir.path().to_path_buf()), ..AppSettings::default() };
        s.save_to(&path).unwrap();
        assert_eq!(AppSettings::load_from(&path).unwrap(), s);
        assert_eq!(s.export_dir(), dir.path());
    }
}
