//! Catalog records and the provider seam.
//!
//! An [`Entry`] is what every listing in the app is made of: search results,
//! playlist items, channel uploads, and the saved/recent lists on disk. The
//! [`CatalogProvider`] trait is the only way the rest of the app asks for
//! them; `youtube::YtDlp` is the production implementation.

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::constants::constants;
use crate::error::CatalogError;

/// What a URL (or listing entry) points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
  #[default]
  Video,
  Playlist,
  Channel,
}

impl EntryKind {
  /// Playlists and channels expand into several entries.
  pub fn is_collection(self) -> bool {
    !matches!(self, EntryKind::Video)
  }

  pub fn label(self) -> &'static str {
    match self {
      EntryKind::Video => "video",
      EntryKind::Playlist => "playlist",
      EntryKind::Channel => "channel",
    }
  }
}

/// A single video/channel/playlist record. Immutable once returned; no
/// identity beyond `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
  pub id: String,
  #[serde(default = "unknown_title")]
  pub title: String,
  #[serde(default)]
  pub channel: Option<String>,
  /// Length in whole seconds.
  #[serde(default, deserialize_with = "lenient_u64")]
  pub duration: Option<u64>,
  #[serde(default, deserialize_with = "lenient_u64")]
  pub view_count: Option<u64>,
  pub url: String,
  #[serde(default)]
  pub kind: EntryKind,
  #[serde(default)]
  pub channel_id: Option<String>,
  #[serde(default)]
  pub channel_url: Option<String>,
  #[serde(default, deserialize_with = "lenient_u64")]
  pub channel_follower_count: Option<u64>,
  #[serde(default)]
  pub thumbnail: Option<String>,
}

fn unknown_title() -> String {
  "Unknown".to_string()
}

/// Accept integers, floats (yt-dlp reports `212.0`), or null.
fn lenient_u64<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u64>, D::Error> {
  let value = Option::<serde_json::Value>::deserialize(de)?;
  Ok(value.and_then(|v| v.as_u64().or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))))
}

/// The record shape yt-dlp prints with `-J`, before normalization.
#[derive(Debug, Default, Deserialize)]
struct RawEntry {
  id: Option<String>,
  title: Option<String>,
  channel: Option<String>,
  uploader: Option<String>,
  #[serde(default, deserialize_with = "lenient_u64")]
  duration: Option<u64>,
  #[serde(default, deserialize_with = "lenient_u64")]
  view_count: Option<u64>,
  url: Option<String>,
  webpage_url: Option<String>,
  channel_id: Option<String>,
  channel_url: Option<String>,
  uploader_url: Option<String>,
  #[serde(default, deserialize_with = "lenient_u64")]
  channel_follower_count: Option<u64>,
  #[serde(default)]
  thumbnails: Vec<RawThumbnail>,
  thumbnail: Option<String>,
  entries: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawThumbnail {
  url: Option<String>,
}

impl RawEntry {
  fn into_entry(self) -> Option<Entry> {
    let id = self.id.filter(|s| !s.is_empty())?;
    // `url` is a direct stream URL in full (non-flat) output; the page URL wins.
    let url = self.webpage_url.or(self.url).unwrap_or_else(|| watch_url(&id));
    let kind = classify_target(&url);
    let thumbnail = self.thumbnails.into_iter().rev().find_map(|t| t.url).or(self.thumbnail);
    Some(Entry {
      title: self.title.filter(|s| !s.is_empty()).unwrap_or_else(unknown_title),
      channel: self.channel.or(self.uploader),
      duration: self.duration,
      view_count: self.view_count,
      kind,
      channel_id: self.channel_id.or_else(|| (kind == EntryKind::Channel).then(|| id.clone())),
      channel_url: self.channel_url.or(self.uploader_url),
      channel_follower_count: self.channel_follower_count,
      thumbnail,
      url,
      id,
    })
  }
}

/// Canonical watch URL for a video id.
pub fn watch_url(id: &str) -> String {
  format!("{}?v={}", constants().watch_base_url, id)
}

/// Normalize a `-J` document into entries.
///
/// `{"entries": [...]}` is a listing; anything else is a single record.
/// Entries without an id (deleted/private placeholders) are dropped.
pub fn parse_document(json: &str) -> Result<Vec<Entry>, CatalogError> {
  let mut raw: RawEntry = serde_json::from_str(json).map_err(|e| CatalogError::parse("yt-dlp JSON", e))?;
  match raw.entries.take() {
    Some(children) => Ok(
      children
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawEntry>(v).ok())
        .filter_map(RawEntry::into_entry)
        .collect(),
    ),
    None => Ok(raw.into_entry().into_iter().collect()),
  }
}

/// Decide whether a URL is a single video, a playlist, or a channel feed.
///
/// Anything that does not parse as a URL (a local file, a bare id) is
/// treated as a single video.
pub fn classify_target(target: &str) -> EntryKind {
  let Ok(url) = Url::parse(target) else { return EntryKind::Video };
  if !matches!(url.scheme(), "http" | "https") {
    return EntryKind::Video;
  }
  let path = url.path().trim_end_matches('/');
  let has = |key: &str| url.query_pairs().any(|(k, v)| k == key && !v.is_empty());

  if path == "/playlist" || (has("list") && !has("v")) {
    return EntryKind::Playlist;
  }
  let mut segments = path.split('/').filter(|s| !s.is_empty());
  match segments.next() {
    Some(first) if first.starts_with('@') => EntryKind::Channel,
    Some("channel" | "c" | "user") => EntryKind::Channel,
    Some("feed") => EntryKind::Playlist,
    _ if path.ends_with("/videos") || path.ends_with("/streams") || path.ends_with("/shorts") => EntryKind::Channel,
    _ => EntryKind::Video,
  }
}

/// YouTube's `sp=` search filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchFilter {
  Videos,
  Channels,
  Playlists,
  Today,
  ThisWeek,
}

impl SearchFilter {
  pub const ALL: [SearchFilter; 5] =
    [SearchFilter::Videos, SearchFilter::Channels, SearchFilter::Playlists, SearchFilter::Today, SearchFilter::ThisWeek];

  /// Decoded `sp` value; `Url` percent-encodes it.
  pub fn sp(self) -> &'static str {
    match self {
      SearchFilter::Videos => "EgIQAQ==",
      SearchFilter::Channels => "EgIQAg==",
      SearchFilter::Playlists => "EgIQAw==",
      SearchFilter::Today => "EgIIAg==",
      SearchFilter::ThisWeek => "EgIIAw==",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      SearchFilter::Videos => "videos",
      SearchFilter::Channels => "channels",
      SearchFilter::Playlists => "playlists",
      SearchFilter::Today => "today",
      SearchFilter::ThisWeek => "this week",
    }
  }
}

/// Build the results-page URL for a query, with an optional filter.
pub fn search_url(query: &str, filter: Option<SearchFilter>) -> Result<String, CatalogError> {
  let base = &constants().search_base_url;
  let mut params = vec![("search_query", query)];
  if let Some(f) = filter {
    params.push(("sp", f.sp()));
  }
  Url::parse_with_params(base, &params).map(String::from).map_err(|e| CatalogError::parse("search URL", e))
}

/// Source of catalog data. One method per query type.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
  /// Fetch a URL as JSON. `flat` asks for a shallow playlist expansion.
  async fn fetch(&self, url: &str, flat: bool) -> Result<Vec<Entry>, CatalogError>;

  /// Flat listing restricted to items `start..=end` (1-indexed).
  async fn fetch_playlist(&self, url: &str, start: usize, end: Option<usize>) -> Result<Vec<Entry>, CatalogError>;

  /// Resolve a page URL to a direct stream URL.
  async fn resolve_stream(&self, url: &str, quality: Option<u32>, audio_only: bool) -> Result<String, CatalogError>;

  async fn search(
    &self,
    query: &str,
    filter: Option<SearchFilter>,
    max_results: Option<usize>,
  ) -> Result<Vec<Entry>, CatalogError> {
    let url = search_url(query, filter)?;
    match max_results {
      // The results page keeps paging until it runs dry, so bound the tool's work too.
      Some(max) => {
        let mut entries = self.fetch_playlist(&url, 1, Some(max)).await?;
        entries.truncate(max);
        Ok(entries)
      }
      None => self.fetch(&url, true).await,
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  // --- parse_document ---

  #[test]
  fn parses_flat_listing() {
    let json = r#"{
      "_type": "playlist",
      "entries": [
        {"id": "abc123", "title": "First", "channel": "Chan", "duration": 212.0, "view_count": 1500,
         "url": "https://www.youtube.com/watch?v=abc123", "ie_key": "Youtube"},
        {"id": "def456", "title": "Second", "url": "https://www.youtube.com/watch?v=def456"}
      ]
    }"#;
    let entries = parse_document(json).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, "abc123");
    assert_eq!(entries[0].duration, Some(212));
    assert_eq!(entries[0].view_count, Some(1500));
    assert_eq!(entries[0].channel.as_deref(), Some("Chan"));
    assert_eq!(entries[1].channel, None);
  }

  #[test]
  fn single_record_prefers_webpage_url() {
    let json = r#"{
      "id": "abc123", "title": "Solo", "uploader": "Someone",
      "url": "https://rr1.googlevideo.com/videoplayback?x=1",
      "webpage_url": "https://www.youtube.com/watch?v=abc123",
      "thumbnails": [{"url": "https://i.ytimg.com/small.jpg"}, {"url": "https://i.ytimg.com/big.jpg"}]
    }"#;
    let entries = parse_document(json).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].url, "https://www.youtube.com/watch?v=abc123");
    assert_eq!(entries[0].channel.as_deref(), Some("Someone"));
    assert_eq!(entries[0].thumbnail.as_deref(), Some("https://i.ytimg.com/big.jpg"));
  }

  #[test]
  fn missing_url_synthesizes_watch_url() {
    let entries = parse_document(r#"{"id": "xyz", "title": ""}"#).unwrap();
    assert_eq!(entries[0].url, "https://www.youtube.com/watch?v=xyz");
    assert_eq!(entries[0].title, "Unknown");
  }

  #[test]
  fn entries_without_id_are_dropped() {
    let entries = parse_document(r#"{"entries": [{"title": "[Private video]"}, {"id": "ok"}]}"#).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "ok");
  }

  #[test]
  fn malformed_json_is_parse_failure() {
    let err = parse_document("WARNING: something\n{").unwrap_err();
    assert!(matches!(err, CatalogError::ParseFailure { .. }));
  }

  #[test]
  fn tab_entries_get_collection_kinds() {
    let json = r#"{"entries": [
      {"id": "PLxyz", "ie_key": "YoutubeTab", "url": "https://www.youtube.com/playlist?list=PLxyz", "title": "Mix"},
      {"id": "UCabcdefghijklmnopqrstuv", "ie_key": "YoutubeTab",
       "url": "https://www.youtube.com/channel/UCabcdefghijklmnopqrstuv", "title": "Chan"}
    ]}"#;
    let entries = parse_document(json).unwrap();
    assert_eq!(entries[0].kind, EntryKind::Playlist);
    assert_eq!(entries[1].kind, EntryKind::Channel);
    assert_eq!(entries[1].channel_id.as_deref(), Some("UCabcdefghijklmnopqrstuv"));
  }

  #[test]
  fn persisted_entry_accepts_float_duration() {
    let entry: Entry =
      serde_json::from_str(r#"{"id": "a", "title": "t", "url": "u", "duration": 61.6, "view_count": null}"#).unwrap();
    assert_eq!(entry.duration, Some(62));
    assert_eq!(entry.view_count, None);
    assert_eq!(entry.kind, EntryKind::Video);
  }

  // --- classify_target ---

  #[test]
  fn classify_videos() {
    assert_eq!(classify_target("https://www.youtube.com/watch?v=abc"), EntryKind::Video);
    assert_eq!(classify_target("https://youtu.be/abc"), EntryKind::Video);
    assert_eq!(classify_target("https://www.youtube.com/watch?v=abc&list=PL1"), EntryKind::Video);
    assert_eq!(classify_target("/home/me/Videos/clip.mkv"), EntryKind::Video);
    assert_eq!(classify_target("not a url"), EntryKind::Video);
  }

  #[test]
  fn classify_playlists() {
    assert_eq!(classify_target("https://www.youtube.com/playlist?list=PL123"), EntryKind::Playlist);
    assert_eq!(classify_target("https://www.youtube.com/watch?list=PL123"), EntryKind::Playlist);
    assert_eq!(classify_target("https://www.youtube.com/feed/trending"), EntryKind::Playlist);
  }

  #[test]
  fn classify_channels() {
    assert_eq!(classify_target("https://www.youtube.com/@SomeHandle"), EntryKind::Channel);
    assert_eq!(classify_target("https://www.youtube.com/@SomeHandle/videos"), EntryKind::Channel);
    assert_eq!(classify_target("https://www.youtube.com/channel/UC123/"), EntryKind::Channel);
    assert_eq!(classify_target("https://www.youtube.com/c/Legacy"), EntryKind::Channel);
  }

  // --- search_url ---

  #[test]
  fn search_url_encodes_query() {
    let url = search_url("funny cats & dogs", None).unwrap();
    assert_eq!(url, "https://www.youtube.com/results?search_query=funny+cats+%26+dogs");
  }

  #[test]
  fn search_url_appends_filter() {
    let url = search_url("rust", Some(SearchFilter::Videos)).unwrap();
    assert_eq!(url, "https://www.youtube.com/results?search_query=rust&sp=EgIQAQ%3D%3D");
  }

  #[tokio::test]
  async fn search_asks_the_tool_for_at_most_max() {
    let url = search_url("q", None).unwrap();
    let entries = (0..10).map(|i| fake::entry(&format!("id{i}"), "t")).collect();
    let catalog = fake::FakeCatalog::default().with_listing(&url, entries);
    let results = catalog.search("q", None, Some(3)).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[2].id, "id2");
    assert_eq!(catalog.calls(), vec![format!("fetch_playlist {url} 1..Some(3)")]);
  }

  #[tokio::test]
  async fn unbounded_search_fetches_the_whole_page() {
    let url = search_url("q", None).unwrap();
    let catalog = fake::FakeCatalog::default().with_listing(&url, vec![fake::entry("a", "A")]);
    assert_eq!(catalog.search("q", None, None).await.unwrap().len(), 1);
    assert_eq!(catalog.calls(), vec![format!("fetch {url} flat=true")]);
  }
}
