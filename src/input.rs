use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{Action, App, AppMode, Screen, VideoAction};

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: event::KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.apply(Action::Quit);
    return;
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('t') {
    app.apply(Action::CycleTheme);
    return;
  }

  // The welcome panel swallows the first key.
  if app.show_welcome {
    app.show_welcome = false;
    return;
  }

  match app.mode {
    AppMode::Input => handle_input_key(app, key),
    AppMode::Browse => handle_browse_key(app, key),
    AppMode::Filter => handle_filter_key(app, key),
  }
}

fn handle_input_key(app: &mut App, key: event::KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter => {
      let query = app.input.clone();
      app.apply(Action::Search(query));
    }
    KeyCode::Tab => {
      app.apply(Action::CycleSearchFilter);
    }
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
      app.input.insert(byte_idx, c);
      app.cursor_position += 1;
    }
    KeyCode::Backspace => {
      if app.cursor_position > 0 {
        app.cursor_position -= 1;
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Delete => {
      if app.cursor_position < app.input.chars().count() {
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Left => {
      app.cursor_position = app.cursor_position.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.cursor_position < app.input.chars().count() {
        app.cursor_position += 1;
      }
    }
    KeyCode::Home => {
      app.cursor_position = 0;
    }
    KeyCode::End => {
      app.cursor_position = app.input.chars().count();
    }
    KeyCode::Esc => {
      if !app.input.is_empty() {
        app.input.clear();
        app.cursor_position = 0;
        app.input_scroll = 0;
      } else {
        app.mode = AppMode::Browse;
      }
    }
    KeyCode::Down => {
      app.mode = AppMode::Browse;
    }
    _ => {}
  }
}

fn handle_browse_key(app: &mut App, key: event::KeyEvent) {
  let in_listing = matches!(app.top(), Screen::Listing(_));
  match key.code {
    KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => app.apply(Action::Select),
    KeyCode::Esc | KeyCode::Left | KeyCode::Backspace | KeyCode::Char('h') | KeyCode::Char('q') => {
      app.apply(Action::Back)
    }
    KeyCode::Down | KeyCode::Char('j') => app.select_next(),
    KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
    KeyCode::Char('s') => app.mode = AppMode::Input,
    KeyCode::Char('/') if in_listing => app.mode = AppMode::Filter,
    KeyCode::Char('r') if in_listing => app.apply(Action::Refresh),
    KeyCode::Char('d') => app.apply(Action::RemoveSelected),
    // Shortcuts that skip the actions menu.
    KeyCode::Char(c @ ('w' | 'a' | 'o')) if in_listing => {
      let action = match c {
        'w' => VideoAction::Watch,
        'a' => VideoAction::Listen,
        _ => VideoAction::OpenInBrowser,
      };
      if let Some(entry) = app.selected_entry().cloned() {
        app.apply(Action::Video(action, entry));
      }
    }
    _ => {}
  }
}

fn handle_filter_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.filter, app.filter_cursor);
      app.filter.insert(byte_idx, c);
      app.filter_cursor += 1;
      app.recompute_filter();
    }
    KeyCode::Backspace => {
      if app.filter_cursor > 0 {
        app.filter_cursor -= 1;
        let byte_idx = char_to_byte_index(&app.filter, app.filter_cursor);
        app.filter.remove(byte_idx);
        app.recompute_filter();
      }
    }
    KeyCode::Delete => {
      if app.filter_cursor < app.filter.chars().count() {
        let byte_idx = char_to_byte_index(&app.filter, app.filter_cursor);
        app.filter.remove(byte_idx);
        app.recompute_filter();
      }
    }
    KeyCode::Left => {
      app.filter_cursor = app.filter_cursor.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.filter_cursor < app.filter.chars().count() {
        app.filter_cursor += 1;
      }
    }
    KeyCode::Home => {
      app.filter_cursor = 0;
    }
    KeyCode::End => {
      app.filter_cursor = app.filter.chars().count();
    }
    // Navigate filtered results while typing
    KeyCode::Down => app.select_next(),
    KeyCode::Up => app.select_prev(),
    KeyCode::Enter => {
      // Keep the filter and go back to browsing
      app.mode = AppMode::Browse;
    }
    KeyCode::Esc => {
      app.filter.clear();
      app.filter_cursor = 0;
      app.filter_scroll = 0;
      app.recompute_filter();
      app.mode = AppMode::Browse;
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::fake::FakeCatalog;
  use crate::config::{ConfigStore, StorePaths};
  use crate::store::Library;
  use crate::youtube::YtDlp;
  use std::sync::Arc;
  use tempfile::TempDir;

  fn press(app: &mut App, code: KeyCode) {
    handle_key_event(app, event::KeyEvent::new(code, KeyModifiers::NONE));
  }

  fn app(dir: &TempDir) -> App {
    let paths = StorePaths::rooted(dir.path());
    let config = ConfigStore::load(paths.config_file());
    let mut app = App::new(config, Library::new(paths), Arc::new(FakeCatalog::default()), YtDlp::new("yt-dlp", None));
    app.show_welcome = false;
    app
  }

  // --- char_to_byte_index ---

  #[test]
  fn char_to_byte_ascii() {
    assert_eq!(char_to_byte_index("hello", 0), 0);
    assert_eq!(char_to_byte_index("hello", 3), 3);
    assert_eq!(char_to_byte_index("hello", 5), 5); // past end
  }

  #[test]
  fn char_to_byte_multibyte() {
    let s = "aé日"; // a=1 byte, é=2 bytes, 日=3 bytes
    assert_eq!(char_to_byte_index(s, 0), 0); // 'a'
    assert_eq!(char_to_byte_index(s, 1), 1); // 'é' starts at byte 1
    assert_eq!(char_to_byte_index(s, 2), 3); // '日' starts at byte 3
    assert_eq!(char_to_byte_index(s, 3), 6); // past end
  }

  #[test]
  fn char_to_byte_empty() {
    assert_eq!(char_to_byte_index("", 0), 0);
    assert_eq!(char_to_byte_index("", 5), 0);
  }

  // --- key mapping ---

  #[test]
  fn welcome_swallows_first_key() {
    let dir = TempDir::new().unwrap();
    let mut app = app(&dir);
    app.show_welcome = true;
    press(&mut app, KeyCode::Char('q'));
    assert!(!app.show_welcome);
    assert!(!app.should_quit);
  }

  #[test]
  fn menu_wraps_and_opens_custom_playlists() {
    let dir = TempDir::new().unwrap();
    let mut app = app(&dir);
    press(&mut app, KeyCode::Up);
    assert!(matches!(app.top(), Screen::Menu(state) if state.selected() == Some(16)));
    for _ in 0..8 {
      press(&mut app, KeyCode::Char('j'));
    }
    press(&mut app, KeyCode::Char('k'));
    press(&mut app, KeyCode::Char('j'));
    assert!(matches!(app.top(), Screen::Menu(state) if state.selected() == Some(7)));
    press(&mut app, KeyCode::Enter);
    assert!(matches!(app.top(), Screen::CustomPlaylists(_)));
    press(&mut app, KeyCode::Esc);
    assert!(matches!(app.top(), Screen::Menu(_)));
  }

  #[test]
  fn typing_a_query_edits_input() {
    let dir = TempDir::new().unwrap();
    let mut app = app(&dir);
    press(&mut app, KeyCode::Char('s'));
    assert_eq!(app.mode, AppMode::Input);
    for c in "caté".chars() {
      press(&mut app, KeyCode::Char(c));
    }
    press(&mut app, KeyCode::Left);
    press(&mut app, KeyCode::Backspace);
    assert_eq!(app.input, "caé");
    press(&mut app, KeyCode::Tab);
    assert!(app.search_filter.is_some());
    press(&mut app, KeyCode::Esc);
    assert!(app.input.is_empty());
    press(&mut app, KeyCode::Esc);
    assert_eq!(app.mode, AppMode::Browse);
  }

  #[test]
  fn ctrl_c_quits_from_any_mode() {
    let dir = TempDir::new().unwrap();
    let mut app = app(&dir);
    app.mode = AppMode::Input;
    handle_key_event(&mut app, event::KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert!(app.should_quit);
  }

  #[test]
  fn filter_key_ignored_outside_listings() {
    let dir = TempDir::new().unwrap();
    let mut app = app(&dir);
    press(&mut app, KeyCode::Char('/'));
    assert_eq!(app.mode, AppMode::Browse);
  }
}
