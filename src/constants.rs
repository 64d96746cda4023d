//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` and parsed once on first
//! access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  pub app_name: String,

  // yt-dlp
  pub ytdlp_program: String,
  pub ytdlp_install_hint: String,
  pub search_base_url: String,
  pub watch_base_url: String,
  pub resolve_timeout_secs: u64,

  // Listing pages
  pub list_initial_size: usize,
  pub list_page_size: usize,

  // Persistence
  pub search_history_cap: usize,

  // Playback
  pub playlist_file_prefix: String,
}

impl Constants {
  pub fn resolve_timeout(&self) -> Duration {
    Duration::from_secs(self.resolve_timeout_secs)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed the tests below fail.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
