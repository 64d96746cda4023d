use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::catalog::{CatalogProvider, Entry, parse_document};
use crate::config::Settings;
use crate::constants::constants;
use crate::error::CatalogError;

/// Detect whether user input refers to a YouTube channel.
/// Returns the canonical uploads URL if detected, or None for a regular search.
pub fn detect_channel_url(input: &str) -> Option<String> {
  let trimmed = input.trim();

  // "/channel @handle" or "/channel https://..."
  let after_prefix = trimmed.strip_prefix("/channel").map(str::trim_start);

  let candidate = after_prefix.unwrap_or(trimmed);

  // Bare @handle (e.g. "@TwoSetViolin")
  if candidate.starts_with('@') && !candidate.contains(' ') && candidate.len() > 1 {
    return Some(format!("https://www.youtube.com/{}/videos", candidate));
  }

  // Full YouTube channel URL
  if (candidate.contains("youtube.com/@") || candidate.contains("youtube.com/channel/"))
    && (candidate.starts_with("http://") || candidate.starts_with("https://"))
  {
    let url = candidate.trim_end_matches('/');
    if url.ends_with("/videos") {
      return Some(url.to_string());
    }
    return Some(format!("{}/videos", url));
  }

  // Only trigger for the /channel prefix form, not bare text
  if after_prefix.is_some() && !candidate.is_empty() {
    return Some(format!("https://www.youtube.com/@{}/videos", candidate));
  }

  None
}

/// The stream URL is the last non-empty line; yt-dlp may print a title first.
pub fn last_non_empty_line(stdout: &str) -> Option<&str> {
  stdout.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

/// yt-dlp as a [`CatalogProvider`].
#[derive(Debug, Clone)]
pub struct YtDlp {
  program: String,
  cookie_browser: Option<String>,
}

impl YtDlp {
  pub fn new(program: &str, cookie_browser: Option<&str>) -> Self {
    Self { program: program.to_string(), cookie_browser: cookie_browser.map(str::to_string) }
  }

  pub fn from_settings(settings: &Settings) -> Self {
    Self::new(&constants().ytdlp_program, settings.cookie_browser())
  }

  fn push_common(&self, args: &mut Vec<String>, url: &str) {
    args.push("--no-warnings".to_string());
    if let Some(browser) = &self.cookie_browser {
      args.push("--cookies-from-browser".to_string());
      args.push(browser.clone());
    }
    args.push("--".to_string());
    args.push(url.to_string());
  }

  pub fn fetch_args(&self, url: &str, flat: bool) -> Vec<String> {
    let mut args = vec!["-J".to_string()];
    if flat {
      args.push("--flat-playlist".to_string());
    }
    self.push_common(&mut args, url);
    args
  }

  pub fn playlist_args(&self, url: &str, start: usize, end: Option<usize>) -> Vec<String> {
    let mut args = vec!["-J".to_string(), "--flat-playlist".to_string()];
    args.push("--playlist-start".to_string());
    args.push(start.max(1).to_string());
    if let Some(end) = end {
      args.push("--playlist-end".to_string());
      args.push(end.to_string());
    }
    self.push_common(&mut args, url);
    args
  }

  pub fn resolve_args(&self, url: &str, quality: Option<u32>, audio_only: bool) -> Vec<String> {
    let format = match (audio_only, quality) {
      (true, _) => "bestaudio/best".to_string(),
      (false, Some(q)) => format!("best[height<={q}]/best"),
      (false, None) => "best".to_string(),
    };
    let mut args = vec!["--get-url".to_string(), "-f".to_string(), format];
    self.push_common(&mut args, url);
    args
  }

  pub fn download_args(&self, url: &str, dir: &Path, audio_only: bool) -> Vec<String> {
    let sub = if audio_only { "audio" } else { "videos" };
    let template = dir.join(sub).join("%(channel)s").join("%(title)s.%(ext)s");
    let mut args = vec!["-o".to_string(), template.to_string_lossy().into_owned()];
    if audio_only {
      args.extend(["-x", "-f", "bestaudio", "--audio-format", "mp3"].map(String::from));
    }
    self.push_common(&mut args, url);
    args
  }

  async fn run(&self, args: &[String]) -> Result<String, CatalogError> {
    debug!(program = %self.program, args = ?args, "yt-dlp: running");
    let output = Command::new(&self.program)
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|e| self.spawn_error(e))?;

    if !output.status.success() {
      let err = CatalogError::ProcessFailure {
        program: self.program.clone(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      };
      warn!(err = %err, "yt-dlp: failed");
      return Err(err);
    }
    String::from_utf8(output.stdout).map_err(|e| CatalogError::parse("yt-dlp output", e))
  }

  fn spawn_error(&self, e: std::io::Error) -> CatalogError {
    if e.kind() == std::io::ErrorKind::NotFound {
      CatalogError::ToolNotFound(constants().ytdlp_install_hint.clone())
    } else {
      CatalogError::Io(e)
    }
  }

  async fn fetch_json(&self, args: &[String]) -> Result<Vec<Entry>, CatalogError> {
    let stdout = self.run(args).await?;
    parse_document(&stdout).inspect_err(|e| warn!(err = %e, "yt-dlp: unreadable JSON"))
  }

  /// Download into `<dir>/{videos|audio}/<channel>/<title>.<ext>`.
  pub async fn download(&self, url: &str, dir: &Path, audio_only: bool) -> Result<(), CatalogError> {
    self.run(&self.download_args(url, dir, audio_only)).await.map(|_| ())
  }

  /// `yt-dlp --version`; fails with the install hint when the tool is missing.
  pub async fn probe(&self) -> Result<String, CatalogError> {
    let stdout = self.run(&["--version".to_string()]).await?;
    Ok(stdout.trim().to_string())
  }
}

#[async_trait]
impl CatalogProvider for YtDlp {
  async fn fetch(&self, url: &str, flat: bool) -> Result<Vec<Entry>, CatalogError> {
    self.fetch_json(&self.fetch_args(url, flat)).await
  }

  async fn fetch_playlist(&self, url: &str, start: usize, end: Option<usize>) -> Result<Vec<Entry>, CatalogError> {
    self.fetch_json(&self.playlist_args(url, start, end)).await
  }

  async fn resolve_stream(&self, url: &str, quality: Option<u32>, audio_only: bool) -> Result<String, CatalogError> {
    let stdout = self.run(&self.resolve_args(url, quality, audio_only)).await?;
    last_non_empty_line(&stdout)
      .map(str::to_string)
      .ok_or_else(|| CatalogError::ParseFailure { what: "resolved stream", reason: "empty output".to_string() })
  }
}
