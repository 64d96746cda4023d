use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Supported external players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
  #[default]
  #[serde(alias = "MPV", alias = "Mpv")]
  Mpv,
  #[serde(alias = "VLC", alias = "Vlc")]
  Vlc,
}

impl PlayerKind {
  pub fn program(self) -> &'static str {
    match self {
      PlayerKind::Mpv => "mpv",
      PlayerKind::Vlc => "vlc",
    }
  }

  /// mpv expands playlist URLs itself through its ytdl hook.
  pub fn supports_native_playlists(self) -> bool {
    matches!(self, PlayerKind::Mpv)
  }

  /// vlc cannot open page URLs reliably and wants a direct stream.
  pub fn needs_resolved_stream(self) -> bool {
    matches!(self, PlayerKind::Vlc)
  }

  pub fn install_hint(self) -> &'static str {
    match self {
      PlayerKind::Mpv => "mpv not found. Install it with: brew install mpv (macOS), apt install mpv (Linux) or winget install mpv",
      PlayerKind::Vlc => {
        "vlc not found. Install it with: brew install --cask vlc (macOS), apt install vlc (Linux) or winget install VideoLAN.VLC"
      }
    }
  }
}

/// How the player process relates to us once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
  /// Fire-and-forget: stdio discarded, own session, no completion signal.
  Detached,
  /// The player owns the terminal until it exits.
  Attached,
}

impl LaunchMode {
  pub fn from_disown(disown: bool) -> Self {
    if disown { LaunchMode::Detached } else { LaunchMode::Attached }
  }
}

/// A fully decided player invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
  pub player: PlayerKind,
  /// Page URL, direct stream URL, or local playlist file.
  pub target: String,
  pub audio_only: bool,
  /// Height cap handed to mpv's ytdl hook; `None` for pre-resolved targets.
  pub quality: Option<u32>,
  pub mode: LaunchMode,
}

impl LaunchPlan {
  pub fn args(&self) -> Vec<String> {
    let mut args = Vec::new();
    match self.player {
      PlayerKind::Mpv => {
        if self.audio_only {
          args.push("--no-video".to_string());
          args.push("--force-window=no".to_string());
        }
        if let Some(q) = self.quality {
          let format = if self.audio_only {
            "bestaudio/best".to_string()
          } else {
            format!("bestvideo[height<=?{q}]+bestaudio/best[height<=?{q}]/best")
          };
          args.push(format!("--ytdl-format={}", format));
        }
      }
      PlayerKind::Vlc => {
        if self.audio_only {
          args.push("--no-video".to_string());
        }
        args.push("--play-and-exit".to_string());
      }
    }
    args.push(self.target.clone());
    args
  }
}

/// Start the player described by `plan`.
///
/// Detached launches return as soon as the process exists; the child is
/// reaped on a background thread and never reported on again. Attached
/// launches wait for the player to exit.
pub async fn launch(plan: &LaunchPlan) -> Result<()> {
  launch_program(plan.player.program(), plan).await
}

/// `launch` with the executable named explicitly.
async fn launch_program(program: &str, plan: &LaunchPlan) -> Result<()> {
  let args = plan.args();
  info!(player = program, target = %plan.target, mode = ?plan.mode, audio_only = plan.audio_only, "player: launching");

  let not_found = |e: std::io::Error| {
    if e.kind() == std::io::ErrorKind::NotFound {
      anyhow!(plan.player.install_hint())
    } else {
      anyhow!(e).context(format!("Failed to spawn {}", program))
    }
  };

  match plan.mode {
    LaunchMode::Detached => {
      let mut cmd = std::process::Command::new(program);
      cmd.args(&args);
      spawn_detached(cmd).map_err(not_found)
    }
    LaunchMode::Attached => {
      let status = Command::new(program).args(&args).status().await.map_err(not_found)?;
      if !status.success() {
        warn!(player = program, status = %status, "player: exited unsuccessfully");
      }
      Ok(())
    }
  }
}

/// Open a URL with the desktop's default handler.
pub fn open_in_browser(url: &str) -> Result<()> {
  #[cfg(target_os = "macos")]
  let opener = "open";
  #[cfg(target_os = "windows")]
  let opener = "explorer";
  #[cfg(not(any(target_os = "macos", target_os = "windows")))]
  let opener = "xdg-open";

  let mut cmd = std::process::Command::new(opener);
  cmd.arg(url);
  spawn_detached(cmd).with_context(|| format!("Failed to open browser with {}", opener))
}

/// Spawn with stdio discarded in a new session, then forget the child.
fn spawn_detached(mut cmd: std::process::Command) -> std::io::Result<()> {
  cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

  #[cfg(unix)]
  {
    use std::os::unix::process::CommandExt;
    // Safety: setsid is async-signal-safe and only affects the child.
    unsafe {
      cmd.pre_exec(|| {
        if libc::setsid() == -1 {
          return Err(std::io::Error::last_os_error());
        }
        Ok(())
      });
    }
  }

  let mut child = cmd.spawn()?;
  // Reap the child in a background thread to avoid zombie processes.
  std::thread::spawn(move || {
    let _ = child.wait();
  });
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn plan(player: PlayerKind, audio_only: bool, quality: Option<u32>) -> LaunchPlan {
    LaunchPlan {
      player,
      target: "https://www.youtube.com/watch?v=abc".to_string(),
      audio_only,
      quality,
      mode: LaunchMode::Detached,
    }
  }

  #[test]
  fn mpv_video_args_carry_quality_cap() {
    let args = plan(PlayerKind::Mpv, false, Some(720)).args();
    assert_eq!(
      args,
      vec![
        "--ytdl-format=bestvideo[height<=?720]+bestaudio/best[height<=?720]/best".to_string(),
        "https://www.youtube.com/watch?v=abc".to_string(),
      ]
    );
  }

  #[test]
  fn mpv_audio_only_is_windowless() {
    let args = plan(PlayerKind::Mpv, true, None).args();
    assert_eq!(args[0], "--no-video");
    assert_eq!(args[1], "--force-window=no");
    assert_eq!(args.last().map(String::as_str), Some("https://www.youtube.com/watch?v=abc"));
  }

  #[test]
  fn vlc_args_end_with_target() {
    let args = plan(PlayerKind::Vlc, true, None).args();
    assert_eq!(args, vec!["--no-video", "--play-and-exit", "https://www.youtube.com/watch?v=abc"]);
  }

  #[test]
  fn player_capabilities() {
    assert!(PlayerKind::Mpv.supports_native_playlists());
    assert!(!PlayerKind::Mpv.needs_resolved_stream());
    assert!(!PlayerKind::Vlc.supports_native_playlists());
    assert!(PlayerKind::Vlc.needs_resolved_stream());
  }

  #[test]
  fn player_kind_reads_any_case() {
    let kind: PlayerKind = serde_json::from_str("\"VLC\"").unwrap();
    assert_eq!(kind, PlayerKind::Vlc);
    assert_eq!(serde_json::to_string(&PlayerKind::Mpv).unwrap(), "\"mpv\"");
  }

  #[test]
  fn detached_spawn_returns_without_waiting() {
    let mut cmd = std::process::Command::new("sleep");
    cmd.arg("30");
    let started = std::time::Instant::now();
    spawn_detached(cmd).unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
  }

  #[tokio::test]
  async fn missing_player_reports_install_hint() {
    for mode in [LaunchMode::Detached, LaunchMode::Attached] {
      let plan = LaunchPlan { mode, ..plan(PlayerKind::Vlc, false, None) };
      let err = launch_program("yt-x-test-no-such-player", &plan).await.unwrap_err();
      assert_eq!(err.to_string(), PlayerKind::Vlc.install_hint(), "mode {mode:?}");
    }
  }

  #[test]
  fn launch_mode_follows_disown_flag() {
    assert_eq!(LaunchMode::from_disown(true), LaunchMode::Detached);
    assert_eq!(LaunchMode::from_disown(false), LaunchMode::Attached);
  }
}
