use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, Cell, List, ListItem, ListState, Padding, Paragraph, Row, Table, TableState},
};

use crate::app::{App, AppMode, Listing, ListingSource, MenuItem, Screen, VideoAction};
use crate::catalog::{Entry, EntryKind};
use crate::store::{CustomPlaylist, Subscription};
use crate::theme::Theme;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// "1h 2m", "3m 4s" or "5s".
pub fn format_duration(secs: u64) -> String {
  let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
  if h > 0 {
    format!("{}h {}m", h, m)
  } else if m > 0 {
    format!("{}m {}s", m, s)
  } else {
    format!("{}s", s)
  }
}

/// "1.2M", "3.4K" or the plain count.
pub fn format_views(n: u64) -> String {
  if n >= 1_000_000 {
    format!("{:.1}M", n as f64 / 1_000_000.0)
  } else if n >= 1_000 {
    format!("{:.1}K", n as f64 / 1_000.0)
  } else {
    n.to_string()
  }
}

fn bordered(theme: &Theme, title: String) -> Block<'static> {
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.border))
}

fn stripe(theme: &Theme, i: usize) -> Style {
  let bg = if i % 2 == 1 { theme.stripe_bg } else { theme.bg };
  Style::default().fg(theme.fg).bg(bg)
}

fn highlight(theme: &Theme) -> Style {
  Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD)
}

fn placeholder(frame: &mut Frame, theme: &Theme, block: Block, text: &str, area: Rect) {
  let paragraph = Paragraph::new(Line::from(Span::styled(text.to_string(), Style::default().fg(theme.muted))))
    .alignment(Alignment::Center)
    .block(block.padding(Padding::top(1)));
  frame.render_widget(paragraph, area);
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  render_main(frame, app, main_area);
  render_status(frame, app, status_area);
  render_input(frame, app, input_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let mut spans = vec![Span::styled(" ▶ yt-x ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))];
  // Breadcrumb of the screen stack below the menu.
  for screen in app.screens.iter().skip(1) {
    let name = match screen {
      Screen::Menu(_) => continue,
      Screen::Listing(listing) => listing.title.clone(),
      Screen::Actions { entry, .. } => entry.title.clone(),
      Screen::Subscriptions(_) => MenuItem::Channels.label().to_string(),
      Screen::CustomPlaylists(_) => MenuItem::CustomPlaylists.label().to_string(),
      Screen::SearchHistory(_) => MenuItem::SearchHistory.label().to_string(),
    };
    spans.push(Span::styled(" › ", Style::default().fg(theme.muted)));
    spans.push(Span::styled(truncate_str(&name, 30), Style::default().fg(theme.fg)));
  }
  frame.render_widget(Line::from(spans), area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_main(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let top = app.screens.len() - 1;
  match &mut app.screens[top] {
    Screen::Menu(state) => {
      if app.show_welcome {
        let [menu_area, welcome_area] = Layout::horizontal([Constraint::Length(28), Constraint::Min(20)]).areas(area);
        render_menu(frame, theme, state, menu_area);
        render_welcome(frame, theme, welcome_area);
      } else {
        render_menu(frame, theme, state, area);
      }
    }
    Screen::Listing(listing) => render_listing(frame, theme, listing, &app.filtered_indices, area),
    Screen::Actions { entry, actions, state } => render_actions(frame, theme, entry, actions, state, area),
    Screen::Subscriptions(state) => render_subscriptions(frame, theme, app.library.subscriptions(), state, area),
    Screen::CustomPlaylists(state) => render_custom_playlists(frame, theme, app.library.custom_playlists(), state, area),
    Screen::SearchHistory(state) => render_search_history(frame, theme, app.library.search_history(), state, area),
  }
}

fn render_welcome(frame: &mut Frame, theme: &Theme, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("▶  Welcome to yt-x", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled("Browse, search and play YouTube from the terminal.", Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(Span::styled("Feeds that need an account read cookies from PREFERRED_BROWSER.", Style::default().fg(theme.muted))),
    Line::from(Span::styled("Edit Config opens the settings file in your editor.", Style::default().fg(theme.muted))),
    Line::from(""),
    Line::from(Span::styled("Press any key to start.", Style::default().fg(theme.muted))),
  ];
  let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
    Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border)),
  );
  frame.render_widget(paragraph, area);
}

fn render_menu(frame: &mut Frame, theme: &Theme, state: &mut ListState, area: Rect) {
  let items: Vec<ListItem> = MenuItem::ALL.iter().map(|item| ListItem::new(item.label()).fg(theme.fg)).collect();
  let list =
    List::new(items).block(bordered(theme, " Menu ".to_string())).highlight_symbol("▶ ").highlight_style(highlight(theme));
  frame.render_stateful_widget(list, area, state);
}

fn entry_row(theme: &Theme, i: usize, entry: &Entry) -> Row<'static> {
  let title = match entry.kind {
    EntryKind::Video => entry.title.clone(),
    kind => format!("[{}] {}", kind.label(), entry.title),
  };
  Row::new(vec![
    Cell::from(title),
    Cell::from(entry.channel.clone().unwrap_or_default()),
    Cell::from(entry.duration.map(format_duration).unwrap_or_default()),
    Cell::from(entry.view_count.map(format_views).unwrap_or_default()),
  ])
  .style(stripe(theme, i))
}

fn render_listing(frame: &mut Frame, theme: &Theme, listing: &mut Listing, filtered: &[usize], area: Rect) {
  let suffix = if listing.paging.loading_more { " (loading more…)" } else { "" };
  let count = if filtered.len() == listing.entries.len() {
    format!("{}", listing.entries.len())
  } else {
    format!("{}/{}", filtered.len(), listing.entries.len())
  };
  let block = bordered(theme, format!(" {} · {}{} ", truncate_str(&listing.title, 60), count, suffix));

  if listing.entries.is_empty() {
    let text = if listing.loading { "Loading…" } else { "Nothing here." };
    placeholder(frame, theme, block, text, area);
    return;
  }

  let rows: Vec<Row> = filtered
    .iter()
    .filter_map(|&idx| listing.entries.get(idx))
    .enumerate()
    .map(|(i, entry)| entry_row(theme, i, entry))
    .collect();
  let header = Row::new(["Title", "Channel", "Duration", "Views"])
    .style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD));
  let widths = [Constraint::Percentage(55), Constraint::Percentage(25), Constraint::Length(9), Constraint::Length(7)];
  let table = Table::new(rows, widths)
    .header(header)
    .block(block)
    .column_spacing(2)
    .highlight_symbol("▶ ")
    .row_highlight_style(highlight(theme));
  frame.render_stateful_widget(table, area, &mut listing.state);
}

fn render_actions(
  frame: &mut Frame,
  theme: &Theme,
  entry: &Entry,
  actions: &[VideoAction],
  state: &mut ListState,
  area: Rect,
) {
  let [details_area, list_area] = Layout::vertical([Constraint::Length(8), Constraint::Min(3)]).areas(area);
  let inner_w = details_area.width.saturating_sub(4) as usize;

  let field = |label: &'static str, value: String| {
    Line::from(vec![
      Span::styled(format!("{:<10}", label), Style::default().fg(theme.muted)),
      Span::styled(truncate_str(&value, inner_w.saturating_sub(10)), Style::default().fg(theme.fg)),
    ])
  };
  let mut lines = vec![Line::from(Span::styled(
    truncate_str(&entry.title, inner_w),
    Style::default().fg(theme.fg).add_modifier(Modifier::BOLD),
  ))];
  if let Some(channel) = &entry.channel {
    lines.push(field("Channel", channel.clone()));
  }
  if let Some(duration) = entry.duration {
    lines.push(field("Duration", format_duration(duration)));
  }
  if let Some(views) = entry.view_count {
    lines.push(field("Views", format_views(views)));
  }
  lines.push(Line::from(Span::styled(
    truncate_str(&entry.url, inner_w),
    Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED),
  )));
  let details = Paragraph::new(lines)
    .block(bordered(theme, format!(" {} ", entry.kind.label())).padding(Padding::horizontal(1)));
  frame.render_widget(details, details_area);

  let items: Vec<ListItem> = actions.iter().map(|a| ListItem::new(a.label()).fg(theme.fg)).collect();
  let list = List::new(items)
    .block(bordered(theme, " Actions ".to_string()))
    .highlight_symbol("▶ ")
    .highlight_style(highlight(theme));
  frame.render_stateful_widget(list, list_area, state);
}

fn render_subscriptions(frame: &mut Frame, theme: &Theme, subs: &[Subscription], state: &mut ListState, area: Rect) {
  let block = bordered(theme, format!(" Channels · {} ", subs.len()));
  if subs.is_empty() {
    placeholder(frame, theme, block, "No subscriptions yet. Subscribe from a video's actions.", area);
    return;
  }
  let rows: Vec<Row> = subs
    .iter()
    .enumerate()
    .map(|(i, sub)| {
      let followers = sub.channel_follower_count.map(format_views).unwrap_or_default();
      Row::new(vec![sub.channel.clone(), followers]).style(stripe(theme, i))
    })
    .collect();
  let header =
    Row::new(["Channel", "Subscribers"]).style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD));
  let table = Table::new(rows, [Constraint::Min(20), Constraint::Length(12)])
    .header(header)
    .block(block)
    .highlight_symbol("▶ ")
    .row_highlight_style(highlight(theme));
  // Subscriptions share ListState with the other library screens.
  let mut table_state = TableState::default().with_selected(state.selected()).with_offset(state.offset());
  frame.render_stateful_widget(table, area, &mut table_state);
  *state.offset_mut() = table_state.offset();
}

fn render_custom_playlists(
  frame: &mut Frame,
  theme: &Theme,
  playlists: &[CustomPlaylist],
  state: &mut ListState,
  area: Rect,
) {
  let block = bordered(theme, format!(" Custom Playlists · {} ", playlists.len()));
  if playlists.is_empty() {
    placeholder(frame, theme, block, "No playlists saved. Add one from a playlist's actions.", area);
    return;
  }
  let items: Vec<ListItem> = playlists
    .iter()
    .enumerate()
    .map(|(i, p)| {
      ListItem::new(Line::from(vec![
        Span::raw(p.name.clone()),
        Span::styled(format!("  {}", p.playlist_url), Style::default().fg(theme.muted)),
      ]))
      .style(stripe(theme, i))
    })
    .collect();
  let list = List::new(items).block(block).highlight_symbol("▶ ").highlight_style(highlight(theme));
  frame.render_stateful_widget(list, area, state);
}

fn render_search_history(frame: &mut Frame, theme: &Theme, history: &[String], state: &mut ListState, area: Rect) {
  let block = bordered(theme, " Search History ".to_string());
  if history.is_empty() {
    placeholder(frame, theme, block, "No searches yet.", area);
    return;
  }
  let items: Vec<ListItem> =
    history.iter().enumerate().map(|(i, q)| ListItem::new(q.as_str()).style(stripe(theme, i))).collect();
  let list = List::new(items).block(block).highlight_symbol("▶ ").highlight_style(highlight(theme));
  frame.render_stateful_widget(list, area, state);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let downloads = app.downloads_in_flight();
  let (text, style) = if let Some(msg) = &app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(theme.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(info) = &app.info_message {
    (format!(" ✓ {}", info), Style::default().fg(theme.status))
  } else if downloads > 0 {
    let noun = if downloads == 1 { "download" } else { "downloads" };
    (format!(" ⬇ {} {} running", downloads, noun), Style::default().fg(theme.status))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

/// Horizontally scroll `text` so the cursor stays inside `inner_w` columns.
fn scroll_window(text: &str, cursor: usize, scroll: &mut usize, inner_w: usize) -> (String, usize) {
  let cursor_col = display_width(text, cursor);
  if inner_w == 0 {
    *scroll = cursor_col;
    return (String::new(), 0);
  }
  if cursor_col < *scroll {
    *scroll = cursor_col;
  } else if cursor_col >= *scroll + inner_w {
    *scroll = cursor_col.saturating_sub(inner_w) + 1;
  }
  let offset = *scroll;

  let visible: String = text
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= offset)
    .take_while(|(start, _, _)| *start < offset + inner_w)
    .map(|(_, _, c)| c)
    .collect();
  (visible, cursor_col - offset)
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let inner_w = area.width.saturating_sub(4) as usize;
  let filtering = app.mode == AppMode::Filter;
  let focused = matches!(app.mode, AppMode::Input | AppMode::Filter);
  let border_color = if focused { theme.accent } else { theme.border };

  let title = if filtering {
    " Filter ".to_string()
  } else {
    match app.search_filter {
      Some(f) => format!(" Search YouTube [{}] ", f.label()),
      None => " Search YouTube ".to_string(),
    }
  };
  let input_block = Block::bordered()
    .title(title)
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let (visible, cursor_x) = if filtering {
    scroll_window(&app.filter, app.filter_cursor, &mut app.filter_scroll, inner_w)
  } else {
    scroll_window(&app.input, app.cursor_position, &mut app.input_scroll, inner_w)
  };

  let paragraph = Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(input_block);
  frame.render_widget(paragraph, area);

  if focused {
    frame.set_cursor_position((area.x + 2 + cursor_x as u16, area.y + 1));
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let keys: Vec<(&str, &str)> = match app.mode {
    AppMode::Input => vec![("Enter", "Search"), ("Tab", "Filter"), ("Esc", "Back"), ("^t", "Theme")],
    AppMode::Filter => vec![("Enter", "Apply"), ("↑/↓", "Navigate"), ("Esc", "Clear")],
    AppMode::Browse => match app.top() {
      Screen::Menu(_) => vec![("Enter", "Open"), ("j/k", "Navigate"), ("s", "Search"), ("^t", "Theme"), ("q", "Quit")],
      Screen::Listing(listing) => {
        let mut k = vec![("Enter", "Actions"), ("w", "Watch"), ("a", "Listen"), ("/", "Filter")];
        if listing.source == ListingSource::Saved {
          k.push(("d", "Remove"));
        } else {
          k.push(("r", "Refresh"));
        }
        k.push(("Esc", "Back"));
        k
      }
      Screen::Actions { .. } => vec![("Enter", "Run"), ("j/k", "Navigate"), ("Esc", "Back")],
      Screen::Subscriptions(_) | Screen::CustomPlaylists(_) => {
        vec![("Enter", "Browse"), ("d", "Remove"), ("Esc", "Back")]
      }
      Screen::SearchHistory(_) => vec![("Enter", "Search"), ("Esc", "Back")],
    },
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}
