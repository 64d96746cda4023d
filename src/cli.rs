//! Command-line surface and the non-interactive subcommands.

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

use crate::catalog::SearchFilter;
use crate::error::CatalogError;
use crate::config::Settings;
use crate::player::PlayerKind;
use crate::youtube::YtDlp;

#[derive(Parser, Debug)]
#[command(name = "yt-x", author, version = env!("CARGO_PKG_VERSION"), about = "Browse and play YouTube from the terminal", long_about = None)]
pub struct Args {
  /// Start with the results of this search
  #[arg(short, long, value_name = "QUERY")]
  pub search: Option<String>,

  /// Narrow the initial search to one result type or upload date
  #[arg(long, value_enum, requires = "search")]
  pub filter: Option<SearchFilter>,

  /// Open a URL in the web browser and exit
  #[arg(short, long, value_name = "URL")]
  pub url: Option<String>,

  /// Open the settings file in an editor and exit
  #[arg(short, long)]
  pub config: bool,

  /// Report which external tools are installed and exit
  #[arg(long)]
  pub check_deps: bool,

  /// Print a shell completion script and exit
  #[arg(long, value_enum, value_name = "SHELL")]
  pub completions: Option<Shell>,

  /// Keep settings, lists and logs under this directory
  #[arg(long, value_name = "DIR")]
  pub data_dir: Option<PathBuf>,
}

/// Write a completion script for `shell` to stdout.
pub fn print_completions(shell: Shell) {
  let mut cmd = Args::command();
  generate(shell, &mut cmd, "yt-x", &mut io::stdout());
}

/// `$EDITOR` when set, else the configured editor.
pub fn editor_command(settings: &Settings) -> String {
  std::env::var("EDITOR")
    .ok()
    .filter(|e| !e.trim().is_empty())
    .unwrap_or_else(|| settings.preferred_editor.clone())
}

/// Split an editor command such as `code --wait` into program and arguments.
fn split_command(command: &str) -> Option<(&str, Vec<&str>)> {
  let mut parts = command.split_whitespace();
  let program = parts.next()?;
  Some((program, parts.collect()))
}

/// Run the editor on `path` with the terminal attached and wait for it.
pub async fn run_editor(editor: &str, path: &Path) -> Result<()> {
  let Some((program, args)) = split_command(editor) else { bail!("No editor configured (set EDITOR or PREFERRED_EDITOR)") };
  info!(editor = %editor, path = %path.display(), "opening editor");
  let status = Command::new(program)
    .args(args)
    .arg(path)
    .status()
    .await
    .with_context(|| format!("Failed to start editor '{}'", program))?;
  if !status.success() {
    bail!("Editor '{}' exited with {}", program, status);
  }
  Ok(())
}

/// First line of `<program> --version`, or `None` when it cannot run.
async fn tool_version(program: &str) -> Option<String> {
  let output = Command::new(program)
    .arg("--version")
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true)
    .output()
    .await
    .ok()?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  Some(stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// Startup check: only a missing yt-dlp stops us. One that runs but
/// misbehaves is logged and left for the per-call errors to surface.
pub async fn require_ytdlp(ytdlp: &YtDlp) -> Result<()> {
  match ytdlp.probe().await {
    Ok(version) => info!(version = %version, "yt-dlp found"),
    Err(CatalogError::ToolNotFound(hint)) => bail!(hint),
    Err(e) => warn!(err = %e, "yt-dlp probe failed, continuing"),
  }
  Ok(())
}

/// Print one line per external tool. Fails when yt-dlp or the configured
/// player is missing.
pub async fn check_deps(ytdlp: &YtDlp, settings: &Settings) -> Result<()> {
  let mut missing = Vec::new();
  match ytdlp.probe().await {
    Ok(version) => println!("{:<8} ok  {}", "yt-dlp", version),
    Err(e) => {
      println!("{:<8} missing  {}", "yt-dlp", e);
      missing.push("yt-dlp");
    }
  }

  for kind in [PlayerKind::Mpv, PlayerKind::Vlc] {
    let configured = kind == settings.player;
    let marker = if configured { " (configured player)" } else { "" };
    match tool_version(kind.program()).await {
      Some(version) => println!("{:<8} ok  {}{}", kind.program(), version, marker),
      None => {
        println!("{:<8} missing{}  {}", kind.program(), marker, kind.install_hint());
        if configured {
          missing.push(kind.program());
        }
      }
    }
  }

  if !missing.is_empty() {
    bail!("Missing required tools: {}", missing.join(", "));
  }
  Ok(())
}
