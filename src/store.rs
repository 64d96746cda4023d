//! Persisted lists: saved videos, recents, subscriptions, custom playlists
//! and search history.
//!
//! Each list is read from disk on first access and rewritten wholesale on
//! every mutation. There is no locking; the last writer wins.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::catalog::{Entry, EntryKind};
use crate::config::{Settings, StorePaths, write_file};
use crate::constants::constants;
use crate::error::StoreError;

/// A user-named playlist bookmark. Append-only, duplicates allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPlaylist {
  pub name: String,
  pub playlist_url: String,
  pub playlist_watch_url: String,
}

/// A followed channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
  pub id: String,
  #[serde(default)]
  pub channel: String,
  #[serde(default)]
  pub channel_url: Option<String>,
  #[serde(default)]
  pub channel_follower_count: Option<u64>,
}

impl Subscription {
  /// The channel behind an entry: the entry itself for channel results,
  /// the uploader for videos.
  pub fn from_entry(entry: &Entry) -> Option<Self> {
    if entry.kind == EntryKind::Channel {
      return Some(Self {
        id: entry.channel_id.clone().unwrap_or_else(|| entry.id.clone()),
        channel: entry.channel.clone().unwrap_or_else(|| entry.title.clone()),
        channel_url: Some(entry.url.clone()),
        channel_follower_count: entry.channel_follower_count,
      });
    }
    let id = entry.channel_id.clone()?;
    Some(Self {
      channel: entry.channel.clone().unwrap_or_else(|| id.clone()),
      channel_url: entry.channel_url.clone(),
      channel_follower_count: entry.channel_follower_count,
      id,
    })
  }

  /// The channel's uploads tab.
  pub fn videos_url(&self) -> String {
    let base = match &self.channel_url {
      Some(url) => url.trim_end_matches('/').to_string(),
      None => format!("https://www.youtube.com/channel/{}", self.id),
    };
    if base.ends_with("/videos") { base } else { format!("{}/videos", base) }
  }
}

/// `{"entries": [...]}`, the on-disk shape of the entry lists.
#[derive(Serialize)]
struct EntriesFile<'a, T> {
  entries: &'a [T],
}

#[derive(Deserialize)]
struct RawEntriesFile {
  #[serde(default)]
  entries: Vec<serde_json::Value>,
}

/// Read a list file. Missing or malformed files read as empty; malformed
/// elements are skipped.
fn read_list<T: DeserializeOwned>(path: &Path, wrapped: bool) -> Vec<T> {
  let Ok(content) = std::fs::read_to_string(path) else { return Vec::new() };
  let raw = if wrapped {
    serde_json::from_str::<RawEntriesFile>(&content).map(|f| f.entries)
  } else {
    serde_json::from_str::<Vec<serde_json::Value>>(&content)
  };
  match raw {
    Ok(values) => values.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect(),
    Err(e) => {
      warn!(path = %path.display(), err = %e, "store: malformed list file, treating as empty");
      Vec::new()
    }
  }
}

fn to_json<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<String, StoreError> {
  let encoded = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
  encoded.map_err(|e| StoreError::json(path, e))
}

fn write_entries<T: Serialize>(path: &Path, entries: &[T], pretty: bool) -> Result<(), StoreError> {
  write_file(path, &to_json(path, &EntriesFile { entries }, pretty)?)
}

/// Remove any item with the same id, insert at the front, truncate.
fn push_front_dedup<T, F>(list: &mut Vec<T>, item: T, cap: Option<usize>, id_of: F)
where
  F: Fn(&T) -> &str,
{
  let id = id_of(&item).to_string();
  list.retain(|existing| id_of(existing) != id);
  list.insert(0, item);
  if let Some(cap) = cap {
    list.truncate(cap);
  }
}

/// All persisted lists, each loaded lazily.
#[derive(Debug)]
pub struct Library {
  paths: StorePaths,
  saved: Option<Vec<Entry>>,
  recent: Option<Vec<Entry>>,
  subscriptions: Option<Vec<Subscription>>,
  playlists: Option<Vec<CustomPlaylist>>,
  history: Option<Vec<String>>,
}

impl Library {
  pub fn new(paths: StorePaths) -> Self {
    Self { paths, saved: None, recent: None, subscriptions: None, playlists: None, history: None }
  }

  // --- Saved videos ---

  pub fn saved(&mut self) -> &[Entry] {
    let path = self.paths.saved_videos_file();
    self.saved.get_or_insert_with(|| read_list(&path, true))
  }

  pub fn add_saved(&mut self, entry: Entry, settings: &Settings) -> Result<(), StoreError> {
    let path = self.paths.saved_videos_file();
    let list = self.saved.get_or_insert_with(|| read_list(&path, true));
    push_front_dedup(list, entry, Some(settings.no_of_recent), |e| e.id.as_str());
    info!(count = list.len(), "store: saved list updated");
    write_entries(&path, list, settings.pretty_print)
  }

  pub fn remove_saved(&mut self, id: &str, settings: &Settings) -> Result<(), StoreError> {
    let path = self.paths.saved_videos_file();
    let list = self.saved.get_or_insert_with(|| read_list(&path, true));
    list.retain(|e| e.id != id);
    write_entries(&path, list, settings.pretty_print)
  }

  // --- Recently watched ---

  pub fn recent(&mut self) -> &[Entry] {
    let path = self.paths.recent_videos_file();
    self.recent.get_or_insert_with(|| read_list(&path, true))
  }

  /// No-op when `UPDATE_RECENT` is off.
  pub fn add_recent(&mut self, entry: Entry, settings: &Settings) -> Result<(), StoreError> {
    if !settings.update_recent {
      return Ok(());
    }
    let path = self.paths.recent_videos_file();
    let list = self.recent.get_or_insert_with(|| read_list(&path, true));
    push_front_dedup(list, entry, Some(settings.no_of_recent), |e| e.id.as_str());
    write_entries(&path, list, settings.pretty_print)
  }

  // --- Subscriptions ---

  pub fn subscriptions(&mut self) -> &[Subscription] {
    let path = self.paths.subscriptions_file();
    self.subscriptions.get_or_insert_with(|| read_list(&path, true))
  }

  pub fn add_subscription(&mut self, sub: Subscription, settings: &Settings) -> Result<(), StoreError> {
    let path = self.paths.subscriptions_file();
    let list = self.subscriptions.get_or_insert_with(|| read_list(&path, true));
    push_front_dedup(list, sub, None, |s| s.id.as_str());
    write_entries(&path, list, settings.pretty_print)
  }

  pub fn remove_subscription(&mut self, id: &str, settings: &Settings) -> Result<(), StoreError> {
    let path = self.paths.subscriptions_file();
    let list = self.subscriptions.get_or_insert_with(|| read_list(&path, true));
    list.retain(|s| s.id != id);
    write_entries(&path, list, settings.pretty_print)
  }

  // --- Custom playlists ---

  pub fn custom_playlists(&mut self) -> &[CustomPlaylist] {
    let path = self.paths.custom_playlists_file();
    self.playlists.get_or_insert_with(|| read_list(&path, false))
  }

  pub fn add_custom_playlist(
    &mut self,
    name: &str,
    playlist_url: &str,
    playlist_watch_url: &str,
    settings: &Settings,
  ) -> Result<(), StoreError> {
    let path = self.paths.custom_playlists_file();
    let list = self.playlists.get_or_insert_with(|| read_list(&path, false));
    list.push(CustomPlaylist {
      name: name.to_string(),
      playlist_url: playlist_url.to_string(),
      playlist_watch_url: playlist_watch_url.to_string(),
    });
    write_file(&path, &to_json(&path, list, settings.pretty_print)?)
  }

  pub fn remove_custom_playlist(&mut self, index: usize, settings: &Settings) -> Result<(), StoreError> {
    let path = self.paths.custom_playlists_file();
    let list = self.playlists.get_or_insert_with(|| read_list(&path, false));
    if index < list.len() {
      list.remove(index);
    }
    write_file(&path, &to_json(&path, list, settings.pretty_print)?)
  }

  // --- Search history ---

  pub fn search_history(&mut self) -> &[String] {
    let path = self.paths.search_history_file();
    self.history.get_or_insert_with(|| read_history(&path))
  }

  /// No-op when `SEARCH_HISTORY` is off.
  pub fn add_search_history(&mut self, query: &str, settings: &Settings) -> Result<(), StoreError> {
    // One query per line on disk.
    let query = query.replace(['\r', '\n'], " ");
    let query = query.trim();
    if !settings.search_history || query.is_empty() {
      return Ok(());
    }
    let path = self.paths.search_history_file();
    let list = self.history.get_or_insert_with(|| read_history(&path));
    push_front_dedup(list, query.to_string(), Some(constants().search_history_cap), |q| q.as_str());
    write_file(&path, &list.join("\n"))
  }

  pub fn clear_search_history(&mut self) -> Result<(), StoreError> {
    let path = self.paths.search_history_file();
    self.history = Some(Vec::new());
    match std::fs::remove_file(&path) {
      Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(StoreError::io(&path, e)),
      _ => Ok(()),
    }
  }
}

fn read_history(path: &Path) -> Vec<String> {
  std::fs::read_to_string(path)
    .map(|content| content.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    .unwrap_or_default()
}
