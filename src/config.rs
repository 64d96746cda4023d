use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::constants;
use crate::error::StoreError;
use crate::player::PlayerKind;

/// Per-user directories the app persists into.
#[derive(Debug, Clone)]
pub struct StorePaths {
  pub config_dir: PathBuf,
  pub cache_dir: PathBuf,
  pub data_dir: PathBuf,
}

impl StorePaths {
  pub fn discover() -> Option<Self> {
    let dirs = ProjectDirs::from("", "", &constants().app_name)?;
    Some(Self {
      config_dir: dirs.config_dir().to_path_buf(),
      cache_dir: dirs.cache_dir().to_path_buf(),
      data_dir: dirs.data_dir().to_path_buf(),
    })
  }

  /// Everything under one root. Used by tests and `--data-dir`.
  pub fn rooted(root: &Path) -> Self {
    Self { config_dir: root.join("config"), cache_dir: root.join("cache"), data_dir: root.join("data") }
  }

  pub fn config_file(&self) -> PathBuf {
    self.config_dir.join("config.json")
  }

  pub fn search_history_file(&self) -> PathBuf {
    self.cache_dir.join("search_history.txt")
  }

  pub fn saved_videos_file(&self) -> PathBuf {
    self.data_dir.join("saved_videos.json")
  }

  pub fn recent_videos_file(&self) -> PathBuf {
    self.data_dir.join("recent.json")
  }

  pub fn custom_playlists_file(&self) -> PathBuf {
    self.data_dir.join("custom_playlists.json")
  }

  pub fn subscriptions_file(&self) -> PathBuf {
    self.data_dir.join("subscriptions.json")
  }

  pub fn log_dir(&self) -> PathBuf {
    self.cache_dir.join("logs")
  }
}

/// Typed view over the settings file. Keys are the upper-case option names
/// users see in `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Settings {
  /// Indent JSON files on write.
  pub pretty_print: bool,
  /// Launch players detached instead of handing them the terminal.
  pub disown_streaming_process: bool,
  pub preferred_editor: String,
  /// Maximum video height passed to the stream resolver.
  pub video_quality: u32,
  pub update_recent: bool,
  pub search_history: bool,
  /// Cap for the saved and recent lists.
  pub no_of_recent: usize,
  pub player: PlayerKind,
  pub use_resolver: bool,
  /// Browser to borrow cookies from; empty disables it.
  pub preferred_browser: String,
  pub no_of_search_results: usize,
  /// Seconds a status or error line stays visible.
  pub notification_duration: u64,
  pub download_directory: PathBuf,
  pub welcome_screen: bool,
  pub theme: String,
}

impl Default for Settings {
  fn default() -> Self {
    let videos = UserDirs::new()
      .and_then(|u| u.video_dir().map(Path::to_path_buf).or_else(|| Some(u.home_dir().join("Videos"))))
      .unwrap_or_else(|| PathBuf::from("Videos"));
    Self {
      pretty_print: true,
      disown_streaming_process: true,
      preferred_editor: "vi".to_string(),
      video_quality: 1080,
      update_recent: true,
      search_history: true,
      no_of_recent: 30,
      player: PlayerKind::Mpv,
      use_resolver: true,
      preferred_browser: String::new(),
      no_of_search_results: 30,
      notification_duration: 5,
      download_directory: videos.join(&constants().app_name),
      welcome_screen: true,
      theme: "default".to_string(),
    }
  }
}

impl Settings {
  pub fn cookie_browser(&self) -> Option<&str> {
    Some(self.preferred_browser.trim()).filter(|b| !b.is_empty())
  }

  fn defaults_map() -> Map<String, Value> {
    match serde_json::to_value(Settings::default()) {
      Ok(Value::Object(map)) => map,
      _ => Map::new(),
    }
  }
}

/// Settings file merged over built-in defaults.
///
/// The raw map keeps keys this version does not know about so a rewrite
/// never drops them.
#[derive(Debug)]
pub struct ConfigStore {
  path: PathBuf,
  values: Map<String, Value>,
  settings: Settings,
}

impl ConfigStore {
  /// Load `config.json`. A missing or malformed file yields the defaults;
  /// a value of the wrong type falls back to that key's default.
  pub fn load(path: PathBuf) -> Self {
    let stored = match std::fs::read_to_string(&path) {
      Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
        Ok(map) => map,
        Err(e) => {
          warn!(path = %path.display(), err = %e, "config: malformed settings file, using defaults");
          Map::new()
        }
      },
      Err(_) => Map::new(),
    };

    let mut values = Settings::defaults_map();
    for (key, value) in stored {
      if values.contains_key(&key) && !Self::accepts(&key, &value) {
        warn!(key = %key, value = %value, "config: ignoring value of the wrong type");
        continue;
      }
      values.insert(key, value);
    }
    let settings = serde_json::from_value(Value::Object(values.clone())).unwrap_or_default();
    debug!(path = %path.display(), "config: loaded");
    Self { path, values, settings }
  }

  /// Whether `value` is a valid setting for `key` on its own.
  fn accepts(key: &str, value: &Value) -> bool {
    let mut probe = Settings::defaults_map();
    probe.insert(key.to_string(), value.clone());
    serde_json::from_value::<Settings>(Value::Object(probe)).is_ok()
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  /// Stored value, else the built-in default. `None` for unknown keys.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.values.get(key)
  }

  /// Stored value, else `fallback`.
  pub fn get_or(&self, key: &str, fallback: Value) -> Value {
    self.values.get(key).cloned().unwrap_or(fallback)
  }

  /// Set one option and rewrite the whole file.
  pub fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
    let mut candidate = self.values.clone();
    candidate.insert(key.to_string(), value);
    let settings = serde_json::from_value::<Settings>(Value::Object(candidate.clone()))
      .map_err(|e| StoreError::InvalidValue { key: key.to_string(), reason: e.to_string() })?;
    self.values = candidate;
    self.settings = settings;
    self.save()
  }

  pub fn save(&self) -> Result<(), StoreError> {
    let content = if self.settings.pretty_print {
      serde_json::to_string_pretty(&self.values)
    } else {
      serde_json::to_string(&self.values)
    }
    .map_err(|e| StoreError::json(&self.path, e))?;
    write_file(&self.path, &content)
  }
}

/// Write `content` to `path`, creating parent directories.
pub fn write_file(path: &Path, content: &str) -> Result<(), StoreError> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
  }
  std::fs::write(path, content).map_err(|e| StoreError::io(path, e))
}
