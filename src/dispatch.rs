//! Playback dispatch: turn a target into a [`LaunchPlan`].
//!
//! A playlist is expanded through the catalog. One entry plays as a plain
//! video. Several entries go to the player as the playlist URL when it can
//! expand playlists itself, or as a generated M3U file when it cannot. A
//! single video may be resolved to a direct stream first. Every catalog or
//! file failure degrades to the next-safest target; only the final spawn can
//! fail.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::{CatalogProvider, classify_target};
use crate::config::Settings;
use crate::constants::constants;
use crate::error::CatalogError;
use crate::m3u;
use crate::player::{self, LaunchMode, LaunchPlan, PlayerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
  Idle,
  Resolving,
  Dispatching,
  Launched,
}

/// Playback choices taken from settings. Each `plan` call is independent.
#[derive(Debug, Clone)]
pub struct Dispatcher {
  player: PlayerKind,
  use_resolver: bool,
  quality: u32,
  mode: LaunchMode,
  resolve_timeout: Duration,
  playlist_dir: PathBuf,
}

impl Dispatcher {
  pub fn from_settings(settings: &Settings) -> Self {
    Self {
      player: settings.player,
      use_resolver: settings.use_resolver,
      quality: settings.video_quality,
      mode: LaunchMode::from_disown(settings.disown_streaming_process),
      resolve_timeout: constants().resolve_timeout(),
      playlist_dir: m3u::session_dir(),
    }
  }

  pub fn mode(&self) -> LaunchMode {
    self.mode
  }

  #[cfg(test)]
  fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
    self.resolve_timeout = timeout;
    self
  }

  #[cfg(test)]
  fn with_playlist_dir(mut self, dir: PathBuf) -> Self {
    self.playlist_dir = dir;
    self
  }

  fn enter(&self, state: DispatchState, target: &str) {
    debug!(state = ?state, target = %target, "dispatch: state");
  }

  /// Decide what to hand the player for `target`. Never fails.
  pub async fn plan(&self, provider: &dyn CatalogProvider, target: &str, audio_only: bool) -> LaunchPlan {
    self.enter(DispatchState::Idle, target);
    if !classify_target(target).is_collection() {
      return self.plan_single(provider, target, audio_only).await;
    }

    let entries = match provider.fetch(target, true).await {
      Ok(entries) => entries,
      Err(e) => {
        warn!(target = %target, err = %e, "dispatch: playlist expansion failed, playing target as-is");
        return self.plan_single(provider, target, audio_only).await;
      }
    };

    match entries.as_slice() {
      [] => {
        warn!(target = %target, "dispatch: playlist is empty, playing target as-is");
        self.plan_single(provider, target, audio_only).await
      }
      [only] => self.plan_single(provider, &only.url, audio_only).await,
      many => {
        self.enter(DispatchState::Dispatching, target);
        if self.player.supports_native_playlists() {
          return self.make_plan(target.to_string(), audio_only, true);
        }
        match m3u::write_playlist_in(&self.playlist_dir, many) {
          Ok(path) => {
            info!(path = %path.display(), entries = many.len(), "dispatch: wrote playlist file");
            self.make_plan(path.to_string_lossy().into_owned(), audio_only, false)
          }
          Err(e) => {
            warn!(err = %e, "dispatch: could not write playlist file, passing URL through");
            self.make_plan(target.to_string(), audio_only, true)
          }
        }
      }
    }
  }

  async fn plan_single(&self, provider: &dyn CatalogProvider, url: &str, audio_only: bool) -> LaunchPlan {
    if !(self.use_resolver && self.player.needs_resolved_stream() && is_remote(url)) {
      self.enter(DispatchState::Dispatching, url);
      return self.make_plan(url.to_string(), audio_only, true);
    }

    self.enter(DispatchState::Resolving, url);
    let resolved = match self.resolve(provider, url, audio_only).await {
      Ok(stream) => stream,
      Err(e) => {
        warn!(url = %url, err = %e, "dispatch: resolve failed, using original URL");
        url.to_string()
      }
    };
    self.enter(DispatchState::Dispatching, &resolved);
    let is_page = resolved == url;
    self.make_plan(resolved, audio_only, is_page)
  }

  async fn resolve(&self, provider: &dyn CatalogProvider, url: &str, audio_only: bool) -> Result<String, CatalogError> {
    let quality = Some(self.quality);
    match tokio::time::timeout(self.resolve_timeout, provider.resolve_stream(url, quality, audio_only)).await {
      Ok(result) => result,
      Err(_) => Err(CatalogError::Timeout { what: "stream resolution", after: self.resolve_timeout }),
    }
  }

  /// `quality` only means something to a player that fetches page URLs itself.
  fn make_plan(&self, target: String, audio_only: bool, page_url: bool) -> LaunchPlan {
    let quality = (page_url && self.player == PlayerKind::Mpv).then_some(self.quality);
    LaunchPlan { player: self.player, target, audio_only, quality, mode: self.mode }
  }

  /// Plan and launch in one go.
  pub async fn play(&self, provider: &dyn CatalogProvider, target: &str, audio_only: bool) -> anyhow::Result<LaunchPlan> {
    let plan = self.plan(provider, target, audio_only).await;
    player::launch(&plan).await?;
    self.enter(DispatchState::Launched, &plan.target);
    Ok(plan)
  }
}

fn is_remote(target: &str) -> bool {
  Url::parse(target).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::fake::{FakeCatalog, entry};
  use crate::catalog::watch_url;
  use tempfile::TempDir;

  const PLAYLIST: &str = "https://www.youtube.com/playlist?list=PL123";

  fn dispatcher(player: PlayerKind, dir: &TempDir) -> Dispatcher {
    let settings = Settings { player, ..Settings::default() };
    Dispatcher::from_settings(&settings).with_playlist_dir(dir.path().to_path_buf())
  }

  #[tokio::test]
  async fn one_entry_playlist_plays_like_the_video() {
    let dir = TempDir::new().unwrap();
    for player in [PlayerKind::Mpv, PlayerKind::Vlc] {
      let video = watch_url("only");
      let catalog =
        FakeCatalog::default().with_listing(PLAYLIST, vec![entry("only", "Only")]).with_resolved(&video, "https://stream/only");
      let d = dispatcher(player, &dir);
      let from_playlist = d.plan(&catalog, PLAYLIST, false).await;
      let direct = d.plan(&catalog, &video, false).await;
      assert_eq!(from_playlist, direct, "player {player:?}");
    }
  }

  #[tokio::test]
  async fn vlc_gets_m3u_for_many_entries() {
    let dir = TempDir::new().unwrap();
    let entries = vec![entry("a", "A"), entry("b", "B"), entry("c", "C")];
    let catalog = FakeCatalog::default().with_listing(PLAYLIST, entries.clone());
    let plan = dispatcher(PlayerKind::Vlc, &dir).plan(&catalog, PLAYLIST, false).await;

    assert!(plan.target.ends_with(".m3u"));
    assert!(plan.target.starts_with(&dir.path().to_string_lossy().into_owned()));
    let text = std::fs::read_to_string(&plan.target).unwrap();
    let urls: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(urls, entries.iter().map(|e| e.url.as_str()).collect::<Vec<_>>());
    // Entries are listed, not resolved one by one.
    assert!(catalog.calls().iter().all(|c| !c.starts_with("resolve")));
  }

  #[tokio::test]
  async fn mpv_gets_playlist_url_for_many_entries() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default().with_listing(PLAYLIST, vec![entry("a", "A"), entry("b", "B")]);
    let plan = dispatcher(PlayerKind::Mpv, &dir).plan(&catalog, PLAYLIST, true).await;
    assert_eq!(plan.target, PLAYLIST);
    assert!(plan.audio_only);
    assert_eq!(plan.quality, Some(1080));
  }

  #[tokio::test]
  async fn unwritable_playlist_dir_passes_url_through() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();
    let catalog = FakeCatalog::default().with_listing(PLAYLIST, vec![entry("a", "A"), entry("b", "B")]);
    let settings = Settings { player: PlayerKind::Vlc, ..Settings::default() };
    let plan = Dispatcher::from_settings(&settings).with_playlist_dir(blocker).plan(&catalog, PLAYLIST, false).await;
    assert_eq!(plan.target, PLAYLIST);
    assert!(catalog.calls().iter().all(|c| !c.starts_with("resolve")));
  }

  #[tokio::test]
  async fn vlc_resolves_single_video() {
    let dir = TempDir::new().unwrap();
    let video = watch_url("abc");
    let catalog = FakeCatalog::default().with_resolved(&video, "https://stream/abc");
    let plan = dispatcher(PlayerKind::Vlc, &dir).plan(&catalog, &video, true).await;
    assert_eq!(plan.target, "https://stream/abc");
    assert_eq!(plan.quality, None);
    assert_eq!(catalog.calls(), vec![format!("resolve {video} quality=Some(1080) audio=true")]);
  }

  #[tokio::test]
  async fn resolve_failure_falls_back_to_original() {
    let dir = TempDir::new().unwrap();
    let video = watch_url("gone");
    let catalog = FakeCatalog::default();
    let plan = dispatcher(PlayerKind::Vlc, &dir).plan(&catalog, &video, false).await;
    assert_eq!(plan.target, video);
  }

  #[tokio::test]
  async fn resolve_timeout_falls_back_to_original() {
    let dir = TempDir::new().unwrap();
    let video = watch_url("slow");
    let catalog = FakeCatalog {
      resolve_delay: Some(Duration::from_secs(10)),
      ..FakeCatalog::default().with_resolved(&video, "https://stream/slow")
    };
    let d = dispatcher(PlayerKind::Vlc, &dir).with_resolve_timeout(Duration::from_millis(20));
    let started = std::time::Instant::now();
    let plan = d.plan(&catalog, &video, false).await;
    assert_eq!(plan.target, video);
    assert!(started.elapsed() < Duration::from_secs(5));
  }

  #[tokio::test]
  async fn expansion_failure_plays_target_as_is() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default();
    let plan = dispatcher(PlayerKind::Mpv, &dir).plan(&catalog, PLAYLIST, false).await;
    assert_eq!(plan.target, PLAYLIST);
    assert_eq!(catalog.calls(), vec![format!("fetch {PLAYLIST} flat=true")]);
  }

  #[tokio::test]
  async fn mpv_and_disabled_resolver_never_resolve() {
    let dir = TempDir::new().unwrap();
    let video = watch_url("abc");
    let catalog = FakeCatalog::default().with_resolved(&video, "https://stream/abc");

    let plan = dispatcher(PlayerKind::Mpv, &dir).plan(&catalog, &video, false).await;
    assert_eq!(plan.target, video);

    let settings = Settings { player: PlayerKind::Vlc, use_resolver: false, ..Settings::default() };
    let plan = Dispatcher::from_settings(&settings).plan(&catalog, &video, false).await;
    assert_eq!(plan.target, video);
    assert!(catalog.calls().is_empty());
  }

  #[tokio::test]
  async fn local_files_skip_the_resolver() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default();
    let plan = dispatcher(PlayerKind::Vlc, &dir).plan(&catalog, "/home/me/clip.mkv", false).await;
    assert_eq!(plan.target, "/home/me/clip.mkv");
    assert!(catalog.calls().is_empty());
  }

  #[test]
  fn mode_follows_disown_setting() {
    let settings = Settings { disown_streaming_process: false, ..Settings::default() };
    assert_eq!(Dispatcher::from_settings(&settings).mode(), LaunchMode::Attached);
    assert_eq!(Dispatcher::from_settings(&Settings::default()).mode(), LaunchMode::Detached);
  }
}
