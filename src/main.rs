mod app;
mod catalog;
mod cli;
mod config;
mod constants;
mod dispatch;
mod error;
mod input;
mod m3u;
mod player;
mod store;
mod theme;
mod ui;
mod youtube;

use anyhow::{Context, Result};
use clap::Parser;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use app::{Action, App, Suspend};
use cli::Args;
use config::{ConfigStore, StorePaths};
use store::Library;
use youtube::YtDlp;

/// Log to `<cache>/logs/yt-x.log`; the terminal belongs to the UI.
fn init_logging(paths: &StorePaths) -> Result<WorkerGuard> {
  let dir = paths.log_dir();
  std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;
  let file_appender = tracing_appender::rolling::never(&dir, "yt-x.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();
  Ok(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Some(shell) = args.completions {
    cli::print_completions(shell);
    return Ok(());
  }

  let paths = match &args.data_dir {
    Some(root) => StorePaths::rooted(root),
    None => StorePaths::discover().context("Could not determine the user's home directory")?,
  };
  let _guard = init_logging(&paths)?;
  info!(version = env!("CARGO_PKG_VERSION"), "starting yt-x");

  let config = ConfigStore::load(paths.config_file());
  let ytdlp = YtDlp::from_settings(config.settings());

  if args.check_deps {
    return cli::check_deps(&ytdlp, config.settings()).await;
  }

  if let Some(url) = &args.url {
    return player::open_in_browser(url);
  }

  if args.config {
    config.save().context("Failed to write settings file")?;
    let editor = cli::editor_command(config.settings());
    cli::run_editor(&editor, config.path()).await?;
    let edited = ConfigStore::load(paths.config_file());
    info!(player = ?edited.settings().player, "settings edited");
    return Ok(());
  }

  // Nothing works without the indexing tool.
  cli::require_ytdlp(&ytdlp).await?;

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    error!("panic: {}", info);
    default_hook(info);
  }));

  let catalog = Arc::new(ytdlp.clone());
  let mut app = App::new(config, Library::new(paths), catalog, ytdlp);
  if let Some(query) = args.search {
    app.show_welcome = false;
    app.search_filter = args.filter;
    app.apply(Action::Search(query));
  }

  let terminal = ratatui::init();
  let result = run(terminal, &mut app).await;
  ratatui::restore();
  result
}

async fn run(mut terminal: DefaultTerminal, app: &mut App) -> Result<()> {
  loop {
    app.check_pending();
    app.expire_messages();

    terminal.draw(|frame| ui::ui(frame, app))?;

    if let Some(suspend) = app.take_suspend() {
      ratatui::restore();
      resume_after(app, suspend).await;
      terminal = ratatui::init();
      continue;
    }

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(app, key);
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }
  info!("exiting");
  Ok(())
}

/// Hand the terminal to a player or editor, then pick up where we left off.
async fn resume_after(app: &mut App, suspend: Suspend) {
  match suspend {
    Suspend::Player(plan) => {
      if let Err(e) = player::launch(&plan).await {
        app.set_error(format!("Playback failed: {:#}", e));
      }
    }
    Suspend::Editor(path) => {
      let editor = cli::editor_command(app.settings());
      if let Err(e) = cli::run_editor(&editor, &path).await {
        app.set_error(format!("{:#}", e));
      }
      app.reload_config();
      let ytdlp = YtDlp::from_settings(app.settings());
      app.set_backend(Arc::new(ytdlp.clone()), ytdlp);
    }
  }
}
