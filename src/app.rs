use anyhow::Result;
use ratatui::widgets::{ListState, TableState};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::catalog::{CatalogProvider, Entry, EntryKind, SearchFilter};
use crate::config::{ConfigStore, Settings};
use crate::constants::constants;
use crate::dispatch::Dispatcher;
use crate::error::{CatalogError, StoreError};
use crate::player::{LaunchMode, LaunchPlan, open_in_browser};
use crate::store::{Library, Subscription};
use crate::theme::{self, THEMES, Theme};
use crate::youtube::{YtDlp, detect_channel_url};

// --- Types ---

pub type FetchResult = Result<Vec<Entry>, CatalogError>;

/// Entries of the main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
  YourFeed,
  Trending,
  Playlists,
  Search,
  WatchLater,
  SubscriptionFeed,
  Channels,
  CustomPlaylists,
  LikedVideos,
  SavedVideos,
  RecentlyWatched,
  WatchHistory,
  Clips,
  SearchHistory,
  ClearSearchHistory,
  EditConfig,
  Exit,
}

impl MenuItem {
  pub const ALL: [MenuItem; 17] = [
    MenuItem::YourFeed,
    MenuItem::Trending,
    MenuItem::Playlists,
    MenuItem::Search,
    MenuItem::WatchLater,
    MenuItem::SubscriptionFeed,
    MenuItem::Channels,
    MenuItem::CustomPlaylists,
    MenuItem::LikedVideos,
    MenuItem::SavedVideos,
    MenuItem::RecentlyWatched,
    MenuItem::WatchHistory,
    MenuItem::Clips,
    MenuItem::SearchHistory,
    MenuItem::ClearSearchHistory,
    MenuItem::EditConfig,
    MenuItem::Exit,
  ];

  pub fn label(self) -> &'static str {
    match self {
      MenuItem::YourFeed => "Your Feed",
      MenuItem::Trending => "Trending",
      MenuItem::Playlists => "Playlists",
      MenuItem::Search => "Search",
      MenuItem::WatchLater => "Watch Later",
      MenuItem::SubscriptionFeed => "Subscription Feed",
      MenuItem::Channels => "Channels",
      MenuItem::CustomPlaylists => "Custom Playlists",
      MenuItem::LikedVideos => "Liked Videos",
      MenuItem::SavedVideos => "Saved Videos",
      MenuItem::RecentlyWatched => "Recently Watched",
      MenuItem::WatchHistory => "Watch History",
      MenuItem::Clips => "Clips",
      MenuItem::SearchHistory => "Search History",
      MenuItem::ClearSearchHistory => "Clear Search History",
      MenuItem::EditConfig => "Edit Config",
      MenuItem::Exit => "Exit",
    }
  }

  /// The remote listing behind a feed item. Most of these need browser cookies.
  pub fn feed_url(self) -> Option<&'static str> {
    match self {
      MenuItem::YourFeed => Some("https://www.youtube.com"),
      MenuItem::Trending => Some("https://www.youtube.com/feed/trending"),
      MenuItem::Playlists => Some("https://www.youtube.com/feed/playlists"),
      MenuItem::WatchLater => Some("https://www.youtube.com/playlist?list=WL"),
      MenuItem::SubscriptionFeed => Some("https://www.youtube.com/feed/subscriptions"),
      MenuItem::LikedVideos => Some("https://www.youtube.com/playlist?list=LL"),
      MenuItem::WatchHistory => Some("https://www.youtube.com/feed/history"),
      MenuItem::Clips => Some("https://www.youtube.com/feed/clips"),
      _ => None,
    }
  }
}

/// What can be done with a selected entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoAction {
  Watch,
  Listen,
  Browse,
  Save,
  Subscribe,
  SavePlaylist,
  OpenInBrowser,
  Download,
  DownloadAudio,
  Back,
}

impl VideoAction {
  pub fn label(self) -> &'static str {
    match self {
      VideoAction::Watch => "Watch",
      VideoAction::Listen => "Listen (audio only)",
      VideoAction::Browse => "Browse",
      VideoAction::Save => "Save Video",
      VideoAction::Subscribe => "Subscribe to Channel",
      VideoAction::SavePlaylist => "Add to Custom Playlists",
      VideoAction::OpenInBrowser => "Open in Browser",
      VideoAction::Download => "Download",
      VideoAction::DownloadAudio => "Download Audio Only",
      VideoAction::Back => "Back",
    }
  }

  pub fn for_entry(entry: &Entry) -> Vec<VideoAction> {
    use VideoAction::*;
    match entry.kind {
      EntryKind::Video => {
        let mut actions = vec![Watch, Listen, Save];
        if entry.channel_id.is_some() {
          actions.push(Subscribe);
        }
        actions.extend([OpenInBrowser, Download, DownloadAudio, Back]);
        actions
      }
      EntryKind::Playlist => vec![Browse, Watch, Listen, SavePlaylist, OpenInBrowser, Download, DownloadAudio, Back],
      EntryKind::Channel => vec![Browse, Subscribe, OpenInBrowser, Back],
    }
  }
}

/// Where a listing's entries come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingSource {
  /// A feed, playlist or channel, fetched in pages.
  Remote { url: String },
  Search { query: String, filter: Option<SearchFilter> },
  Saved,
  Recent,
}

/// Page bookkeeping for remote listings.
#[derive(Debug, Clone, Default)]
pub struct Paging {
  pub fetched: usize,
  pub has_more: bool,
  pub loading_more: bool,
}

#[derive(Debug)]
pub struct Listing {
  pub id: u64,
  pub title: String,
  pub source: ListingSource,
  pub entries: Vec<Entry>,
  pub state: TableState,
  pub loading: bool,
  pub paging: Paging,
}

/// One level of the screen stack. The menu is always at the bottom.
#[derive(Debug)]
pub enum Screen {
  Menu(ListState),
  Listing(Listing),
  Actions { entry: Entry, actions: Vec<VideoAction>, state: ListState },
  Subscriptions(ListState),
  CustomPlaylists(ListState),
  SearchHistory(ListState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  Browse,
  Input,
  Filter,
}

/// Everything the user can ask for, whichever key or screen it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
  Menu(MenuItem),
  Browse { title: String, url: String },
  Search(String),
  ShowActions(Entry),
  Video(VideoAction, Entry),
  /// Activate whatever is selected on the top screen.
  Select,
  RemoveSelected,
  Refresh,
  LoadMore,
  Back,
  CycleTheme,
  CycleSearchFilter,
  Quit,
}

/// Work that needs the terminal, run by the main loop between frames.
#[derive(Debug)]
pub enum Suspend {
  Player(LaunchPlan),
  Editor(PathBuf),
}

#[derive(Debug)]
pub struct DownloadOutcome {
  pub title: String,
  pub result: Result<(), CatalogError>,
}

/// In-flight async task receivers.
#[derive(Default)]
pub(crate) struct AsyncTasks {
  pub(crate) listing_rx: Option<(u64, oneshot::Receiver<FetchResult>)>,
  pub(crate) more_rx: Option<(u64, oneshot::Receiver<FetchResult>)>,
  pub(crate) play_rx: Option<oneshot::Receiver<Result<LaunchPlan>>>,
  pub(crate) downloads_in_flight: usize,
}

pub struct App {
  pub screens: Vec<Screen>,
  pub mode: AppMode,
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub search_filter: Option<SearchFilter>,
  /// Filter text for narrowing the top listing by title/channel.
  pub filter: String,
  pub filter_cursor: usize,
  pub filter_scroll: usize,
  /// Indices into the top listing's entries that match `filter`.
  pub filtered_indices: Vec<usize>,
  pub theme_index: usize,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  pub info_message: Option<String>,
  pub show_welcome: bool,
  pub should_quit: bool,
  pub config: ConfigStore,
  pub library: Library,
  catalog: Arc<dyn CatalogProvider>,
  ytdlp: YtDlp,
  pub(crate) tasks: AsyncTasks,
  download_tx: mpsc::UnboundedSender<DownloadOutcome>,
  download_rx: mpsc::UnboundedReceiver<DownloadOutcome>,
  next_listing_id: u64,
  error_time: Option<Instant>,
  info_time: Option<Instant>,
  suspend: Option<Suspend>,
}

impl App {
  pub fn new(config: ConfigStore, library: Library, catalog: Arc<dyn CatalogProvider>, ytdlp: YtDlp) -> Self {
    let theme_index = theme::index_of(&config.settings().theme);
    let show_welcome = config.settings().welcome_screen;
    let (download_tx, download_rx) = mpsc::unbounded_channel();
    let mut menu = ListState::default();
    menu.select(Some(0));

    Self {
      screens: vec![Screen::Menu(menu)],
      mode: AppMode::Browse,
      input: String::new(),
      cursor_position: 0,
      input_scroll: 0,
      search_filter: None,
      filter: String::new(),
      filter_cursor: 0,
      filter_scroll: 0,
      filtered_indices: Vec::new(),
      theme_index,
      last_error: None,
      status_message: None,
      info_message: None,
      show_welcome,
      should_quit: false,
      config,
      library,
      catalog,
      ytdlp,
      tasks: AsyncTasks::default(),
      download_tx,
      download_rx,
      next_listing_id: 0,
      error_time: None,
      info_time: None,
      suspend: None,
    }
  }

  pub fn settings(&self) -> &Settings {
    self.config.settings()
  }

  pub fn theme(&self) -> &'static Theme {
    // Safety: theme_index comes from index_of() or modular arithmetic in next_theme().
    &THEMES[self.theme_index]
  }

  /// Swap the yt-dlp backends, e.g. after the cookie browser changed.
  pub fn set_backend(&mut self, catalog: Arc<dyn CatalogProvider>, ytdlp: YtDlp) {
    self.catalog = catalog;
    self.ytdlp = ytdlp;
  }

  /// Re-read the settings file after an external edit.
  pub fn reload_config(&mut self) {
    self.config = ConfigStore::load(self.config.path().to_path_buf());
    self.theme_index = theme::index_of(&self.config.settings().theme);
    info!(path = %self.config.path().display(), "config reloaded");
  }

  pub fn take_suspend(&mut self) -> Option<Suspend> {
    self.suspend.take()
  }

  pub fn top(&self) -> &Screen {
    // Safety: the menu is never popped, so the stack is never empty.
    &self.screens[self.screens.len() - 1]
  }

  fn top_mut(&mut self) -> &mut Screen {
    let last = self.screens.len() - 1;
    &mut self.screens[last]
  }

  pub fn downloads_in_flight(&self) -> usize {
    self.tasks.downloads_in_flight
  }

  #[cfg(test)]
  fn is_busy(&self) -> bool {
    self.tasks.listing_rx.is_some() || self.tasks.more_rx.is_some() || self.tasks.play_rx.is_some()
  }

  // --- Messages ---

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  pub fn set_info(&mut self, msg: String) {
    self.info_message = Some(msg);
    self.info_time = Some(Instant::now());
  }

  /// Drop error and info lines older than `NOTIFICATION_DURATION`.
  pub fn expire_messages(&mut self) {
    let ttl = Duration::from_secs(self.settings().notification_duration);
    if let Some(t) = self.error_time
      && t.elapsed() >= ttl
    {
      self.clear_error();
    }
    if let Some(t) = self.info_time
      && t.elapsed() >= ttl
    {
      self.info_message = None;
      self.info_time = None;
    }
  }

  fn report_store(&mut self, what: &str, result: Result<(), StoreError>) -> bool {
    match result {
      Ok(()) => true,
      Err(e) => {
        warn!(err = %e, "store: {}", what);
        self.set_error(format!("Could not {}: {}", what, e));
        false
      }
    }
  }

  // --- Filtering ---

  /// Case-insensitive match against title and channel.
  pub fn matches_filter(entry: &Entry, filter: &str) -> bool {
    if filter.is_empty() {
      return true;
    }
    let needle = filter.to_lowercase();
    if entry.title.to_lowercase().contains(&needle) {
      return true;
    }
    if let Some(ref channel) = entry.channel
      && channel.to_lowercase().contains(&needle)
    {
      return true;
    }
    false
  }

  /// Rebuild `filtered_indices` for the top listing and clamp its selection.
  pub fn recompute_filter(&mut self) {
    let filter = self.filter.clone();
    let Screen::Listing(listing) = self.top_mut() else {
      self.filtered_indices.clear();
      return;
    };
    let indices: Vec<usize> = listing
      .entries
      .iter()
      .enumerate()
      .filter(|(_, entry)| Self::matches_filter(entry, &filter))
      .map(|(i, _)| i)
      .collect();
    if indices.is_empty() {
      listing.state.select(None);
    } else {
      let sel = listing.state.selected().unwrap_or(0);
      listing.state.select(Some(sel.min(indices.len() - 1)));
    }
    self.filtered_indices = indices;
  }

  fn reset_filter(&mut self) {
    self.filter.clear();
    self.filter_cursor = 0;
    self.filter_scroll = 0;
    if self.mode == AppMode::Filter {
      self.mode = AppMode::Browse;
    }
    self.recompute_filter();
  }

  /// Selected entry of the top listing, through the filter.
  pub fn selected_entry(&self) -> Option<&Entry> {
    let Screen::Listing(listing) = self.top() else { return None };
    let idx = *self.filtered_indices.get(listing.state.selected()?)?;
    listing.entries.get(idx)
  }

  // --- Navigation ---

  fn item_count(&mut self) -> usize {
    let top = self.screens.len() - 1;
    match &self.screens[top] {
      Screen::Menu(_) => MenuItem::ALL.len(),
      Screen::Listing(_) => self.filtered_indices.len(),
      Screen::Actions { actions, .. } => actions.len(),
      Screen::Subscriptions(_) => self.library.subscriptions().len(),
      Screen::CustomPlaylists(_) => self.library.custom_playlists().len(),
      Screen::SearchHistory(_) => self.library.search_history().len(),
    }
  }

  fn selected_index(&self) -> Option<usize> {
    match self.top() {
      Screen::Listing(listing) => listing.state.selected(),
      Screen::Menu(state)
      | Screen::Actions { state, .. }
      | Screen::Subscriptions(state)
      | Screen::CustomPlaylists(state)
      | Screen::SearchHistory(state) => state.selected(),
    }
  }

  fn select_index(&mut self, idx: Option<usize>) {
    match self.top_mut() {
      Screen::Listing(listing) => listing.state.select(idx),
      Screen::Menu(state)
      | Screen::Actions { state, .. }
      | Screen::Subscriptions(state)
      | Screen::CustomPlaylists(state)
      | Screen::SearchHistory(state) => state.select(idx),
    }
  }

  pub fn select_next(&mut self) {
    let count = self.item_count();
    if count == 0 {
      return;
    }
    let i = self.selected_index().map_or(0, |i| (i + 1) % count);
    self.select_index(Some(i));

    // Fetch the next page when within 5 items of the bottom (actual index).
    if let Screen::Listing(listing) = self.top()
      && let Some(&actual_idx) = self.filtered_indices.get(i)
      && actual_idx >= listing.entries.len().saturating_sub(5)
    {
      self.apply(Action::LoadMore);
    }
  }

  pub fn select_prev(&mut self) {
    let count = self.item_count();
    if count == 0 {
      return;
    }
    let i = self.selected_index().map_or(0, |i| if i == 0 { count - 1 } else { i - 1 });
    self.select_index(Some(i));
  }

  fn push_screen(&mut self, screen: Screen) {
    self.screens.push(screen);
    self.reset_filter();
    let has_items = self.item_count() > 0;
    if self.selected_index().is_none() && has_items {
      self.select_index(Some(0));
    }
  }

  fn pop_screen(&mut self) {
    if self.screens.len() > 1 {
      self.screens.pop();
      self.reset_filter();
    }
  }

  fn push_list_screen(&mut self, make: fn(ListState) -> Screen) {
    self.push_screen(make(ListState::default()));
  }

  /// Turn the current selection into an action.
  fn selected_action(&mut self) -> Option<Action> {
    let idx = self.selected_index()?;
    let top = self.screens.len() - 1;
    match &self.screens[top] {
      Screen::Menu(_) => MenuItem::ALL.get(idx).map(|item| Action::Menu(*item)),
      Screen::Listing(_) => self.selected_entry().cloned().map(Action::ShowActions),
      Screen::Actions { entry, actions, .. } => actions.get(idx).map(|a| Action::Video(*a, entry.clone())),
      Screen::Subscriptions(_) => self
        .library
        .subscriptions()
        .get(idx)
        .map(|sub| Action::Browse { title: sub.channel.clone(), url: sub.videos_url() }),
      Screen::CustomPlaylists(_) => self
        .library
        .custom_playlists()
        .get(idx)
        .map(|p| Action::Browse { title: p.name.clone(), url: p.playlist_url.clone() }),
      Screen::SearchHistory(_) => self.library.search_history().get(idx).map(|q| Action::Search(q.clone())),
    }
  }

  // --- Actions ---

  pub fn apply(&mut self, action: Action) {
    match action {
      Action::Menu(item) => self.open_menu_item(item),
      Action::Browse { title, url } => self.open_listing(title, ListingSource::Remote { url }),
      Action::Search(query) => self.search(&query),
      Action::ShowActions(entry) => {
        let actions = VideoAction::for_entry(&entry);
        let mut state = ListState::default();
        state.select(Some(0));
        self.push_screen(Screen::Actions { entry, actions, state });
      }
      Action::Video(action, entry) => self.run_video_action(action, entry),
      Action::Select => {
        if let Some(next) = self.selected_action() {
          self.apply(next);
        }
      }
      Action::RemoveSelected => self.remove_selected(),
      Action::Refresh => self.refresh(),
      Action::LoadMore => self.load_more(),
      Action::Back => {
        if self.screens.len() > 1 {
          self.pop_screen();
        } else {
          self.should_quit = true;
        }
      }
      Action::CycleTheme => self.next_theme(),
      Action::CycleSearchFilter => {
        let idx = self.search_filter.and_then(|f| SearchFilter::ALL.iter().position(|x| *x == f));
        self.search_filter = match idx {
          None => SearchFilter::ALL.first().copied(),
          Some(i) => SearchFilter::ALL.get(i + 1).copied(),
        };
      }
      Action::Quit => self.should_quit = true,
    }
  }

  fn open_menu_item(&mut self, item: MenuItem) {
    if let Some(url) = item.feed_url() {
      self.open_listing(item.label().to_string(), ListingSource::Remote { url: url.to_string() });
      return;
    }
    match item {
      MenuItem::Search => self.mode = AppMode::Input,
      MenuItem::Channels => self.push_list_screen(Screen::Subscriptions),
      MenuItem::CustomPlaylists => self.push_list_screen(Screen::CustomPlaylists),
      MenuItem::SavedVideos => self.open_listing(item.label().to_string(), ListingSource::Saved),
      MenuItem::RecentlyWatched => self.open_listing(item.label().to_string(), ListingSource::Recent),
      MenuItem::SearchHistory => self.push_list_screen(Screen::SearchHistory),
      MenuItem::ClearSearchHistory => {
        let result = self.library.clear_search_history();
        if self.report_store("clear search history", result) {
          self.set_info("Search history cleared.".to_string());
        }
      }
      MenuItem::EditConfig => {
        // Make sure the editor opens a file with every key in it.
        let result = self.config.save();
        self.report_store("write settings", result);
        self.suspend = Some(Suspend::Editor(self.config.path().to_path_buf()));
      }
      MenuItem::Exit => self.should_quit = true,
      _ => {}
    }
  }

  fn search(&mut self, query: &str) {
    let query = query.trim();
    if query.is_empty() {
      self.set_error("Enter a search term.".to_string());
      return;
    }
    self.mode = AppMode::Browse;
    if let Some(channel_url) = detect_channel_url(query) {
      self.open_listing(format!("Channel {}", query), ListingSource::Remote { url: channel_url });
      return;
    }
    let settings = self.config.settings().clone();
    let result = self.library.add_search_history(query, &settings);
    self.report_store("record search history", result);
    let title = match self.search_filter {
      Some(f) => format!("Search: {} [{}]", query, f.label()),
      None => format!("Search: {}", query),
    };
    self.open_listing(title, ListingSource::Search { query: query.to_string(), filter: self.search_filter });
  }

  fn open_listing(&mut self, title: String, source: ListingSource) {
    self.next_listing_id += 1;
    let listing = Listing {
      id: self.next_listing_id,
      title,
      source,
      entries: Vec::new(),
      state: TableState::default(),
      loading: false,
      paging: Paging::default(),
    };
    self.push_screen(Screen::Listing(listing));
    self.refresh();
  }

  /// (Re)load the top listing from its source.
  fn refresh(&mut self) {
    self.clear_error();
    let Screen::Listing(listing) = self.top() else { return };
    let id = listing.id;
    let source = listing.source.clone();

    let local = match &source {
      ListingSource::Saved => Some(self.library.saved().to_vec()),
      ListingSource::Recent => Some(self.library.recent().to_vec()),
      _ => None,
    };
    if let Some(entries) = local {
      self.fill_listing(id, Ok(entries), false);
      return;
    }

    let catalog = Arc::clone(&self.catalog);
    let max_results = self.settings().no_of_search_results;
    let (tx, rx) = oneshot::channel();
    match source {
      ListingSource::Search { query, filter } => {
        info!(query = %query, filter = ?filter, "search triggered");
        self.status_message = Some(format!("Searching '{}'…", query));
        tokio::spawn(async move {
          let _ = tx.send(catalog.search(&query, filter, Some(max_results)).await);
        });
      }
      ListingSource::Remote { url } => {
        info!(url = %url, "listing triggered");
        self.status_message = Some("Loading…".to_string());
        let end = constants().list_initial_size;
        tokio::spawn(async move {
          let _ = tx.send(catalog.fetch_playlist(&url, 1, Some(end)).await);
        });
      }
      ListingSource::Saved | ListingSource::Recent => return,
    }
    if let Screen::Listing(listing) = self.top_mut() {
      listing.loading = true;
      listing.paging = Paging::default();
    }
    self.tasks.more_rx = None;
    self.tasks.listing_rx = Some((id, rx));
  }

  /// Trigger a background fetch of the next page of a remote listing.
  fn load_more(&mut self) {
    if self.tasks.more_rx.is_some() {
      return;
    }
    let Screen::Listing(listing) = self.top_mut() else { return };
    let ListingSource::Remote { url } = &listing.source else { return };
    if !listing.paging.has_more || listing.paging.loading_more || listing.loading {
      return;
    }
    listing.paging.loading_more = true;
    let url = url.clone();
    let id = listing.id;
    let start = listing.paging.fetched + 1;
    let end = listing.paging.fetched + constants().list_page_size;

    let catalog = Arc::clone(&self.catalog);
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(catalog.fetch_playlist(&url, start, Some(end)).await);
    });
    self.tasks.more_rx = Some((id, rx));
  }

  fn listing_mut(&mut self, id: u64) -> Option<&mut Listing> {
    self.screens.iter_mut().rev().find_map(|s| match s {
      Screen::Listing(l) if l.id == id => Some(l),
      _ => None,
    })
  }

  fn fill_listing(&mut self, id: u64, result: FetchResult, more: bool) {
    let is_top = matches!(self.top(), Screen::Listing(l) if l.id == id);
    let Some(listing) = self.listing_mut(id) else { return };
    listing.loading = false;
    listing.paging.loading_more = false;
    let remote = matches!(listing.source, ListingSource::Remote { .. });
    let mut message = None;
    match result {
      Ok(entries) => {
        let page = if more { constants().list_page_size } else { constants().list_initial_size };
        listing.paging.has_more = remote && entries.len() >= page;
        listing.paging.fetched += entries.len();
        if more {
          listing.entries.extend(entries);
        } else {
          if entries.is_empty() {
            message = Some(Ok("No results found.".to_string()));
          }
          listing.entries = entries;
          listing.state.select(Some(0));
        }
      }
      Err(e) => {
        listing.paging.has_more = false;
        let verb = if more { "load more" } else { "load" };
        message = Some(Err(format!("Failed to {}: {}", verb, e)));
      }
    }
    match message {
      Some(Ok(info)) => self.set_info(info),
      Some(Err(err)) => self.set_error(err),
      None => {}
    }
    if is_top {
      self.recompute_filter();
    }
  }

  pub fn check_pending(&mut self) {
    if let Some((id, mut rx)) = self.tasks.listing_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.status_message = None;
          self.fill_listing(id, result, false);
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.listing_rx = Some((id, rx));
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.fill_listing(id, Ok(Vec::new()), false);
          self.set_error("Load task failed.".to_string());
        }
      }
    }

    if let Some((id, mut rx)) = self.tasks.more_rx.take() {
      match rx.try_recv() {
        Ok(result) => self.fill_listing(id, result, true),
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.more_rx = Some((id, rx));
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          if let Some(listing) = self.listing_mut(id) {
            listing.paging.loading_more = false;
          }
        }
      }
    }

    if let Some(mut rx) = self.tasks.play_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.status_message = None;
          match result {
            Ok(plan) if plan.mode == LaunchMode::Attached => {
              self.suspend = Some(Suspend::Player(plan));
            }
            Ok(plan) => self.set_info(format!("Playing in {}", plan.player.program())),
            Err(e) => self.set_error(format!("Playback failed: {:#}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.play_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.set_error("Playback task failed.".to_string());
        }
      }
    }

    while let Ok(outcome) = self.download_rx.try_recv() {
      self.tasks.downloads_in_flight = self.tasks.downloads_in_flight.saturating_sub(1);
      match outcome.result {
        Ok(()) => self.set_info(format!("Downloaded '{}'", outcome.title)),
        Err(e) => self.set_error(format!("Download of '{}' failed: {}", outcome.title, e)),
      }
    }
  }

  fn run_video_action(&mut self, action: VideoAction, entry: Entry) {
    if matches!(self.top(), Screen::Actions { .. }) && action != VideoAction::OpenInBrowser {
      self.pop_screen();
    }
    let settings = self.config.settings().clone();
    match action {
      VideoAction::Watch | VideoAction::Listen => {
        if entry.kind == EntryKind::Video {
          let result = self.library.add_recent(entry.clone(), &settings);
          self.report_store("update recent videos", result);
        }
        self.start_playback(&entry, action == VideoAction::Listen);
      }
      VideoAction::Browse => {
        let url = match entry.kind {
          EntryKind::Channel => Subscription::from_entry(&entry).map_or(entry.url.clone(), |s| s.videos_url()),
          _ => entry.url.clone(),
        };
        self.open_listing(entry.title, ListingSource::Remote { url });
      }
      VideoAction::Save => {
        let title = entry.title.clone();
        let result = self.library.add_saved(entry, &settings);
        if self.report_store("save video", result) {
          self.set_info(format!("Saved '{}'", title));
        }
      }
      VideoAction::Subscribe => match Subscription::from_entry(&entry) {
        Some(sub) => {
          let name = sub.channel.clone();
          let result = self.library.add_subscription(sub, &settings);
          if self.report_store("subscribe", result) {
            self.set_info(format!("Subscribed to {}", name));
          }
        }
        None => self.set_error("No channel information for this entry.".to_string()),
      },
      VideoAction::SavePlaylist => {
        let watch_url = format!("{}?list={}", constants().watch_base_url, entry.id);
        let result = self.library.add_custom_playlist(&entry.title, &entry.url, &watch_url, &settings);
        if self.report_store("add custom playlist", result) {
          self.set_info(format!("Added '{}' to custom playlists", entry.title));
        }
      }
      VideoAction::OpenInBrowser => {
        if let Err(e) = open_in_browser(&entry.url) {
          self.set_error(format!("{:#}", e));
        }
      }
      VideoAction::Download | VideoAction::DownloadAudio => {
        self.start_download(entry, action == VideoAction::DownloadAudio);
      }
      VideoAction::Back => {}
    }
  }

  fn start_playback(&mut self, entry: &Entry, audio_only: bool) {
    if self.tasks.play_rx.is_some() {
      self.set_error("A player is already starting.".to_string());
      return;
    }
    let dispatcher = Dispatcher::from_settings(self.config.settings());
    let catalog = Arc::clone(&self.catalog);
    let url = entry.url.clone();
    info!(url = %url, audio_only, "playback triggered");
    self.clear_error();
    self.status_message = Some(format!("Starting '{}'…", entry.title));

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = match dispatcher.mode() {
        // The main loop launches attached players once the terminal is released.
        LaunchMode::Attached => Ok(dispatcher.plan(catalog.as_ref(), &url, audio_only).await),
        LaunchMode::Detached => dispatcher.play(catalog.as_ref(), &url, audio_only).await,
      };
      let _ = tx.send(result);
    });
    self.tasks.play_rx = Some(rx);
  }

  fn start_download(&mut self, entry: Entry, audio_only: bool) {
    let ytdlp = self.ytdlp.clone();
    let dir = self.settings().download_directory.clone();
    let tx = self.download_tx.clone();
    info!(url = %entry.url, audio_only, dir = %dir.display(), "download triggered");
    self.tasks.downloads_in_flight += 1;
    self.set_info(format!("Downloading '{}'…", entry.title));
    tokio::spawn(async move {
      let result = ytdlp.download(&entry.url, &dir, audio_only).await;
      let _ = tx.send(DownloadOutcome { title: entry.title, result });
    });
  }

  fn remove_selected(&mut self) {
    let Some(idx) = self.selected_index() else { return };
    let settings = self.config.settings().clone();
    match self.top() {
      Screen::Listing(listing) if listing.source == ListingSource::Saved => {
        let Some(id) = self.selected_entry().map(|e| e.id.clone()) else { return };
        let result = self.library.remove_saved(&id, &settings);
        if self.report_store("remove saved video", result) {
          self.refresh();
        }
        return;
      }
      Screen::Subscriptions(_) => {
        let Some(id) = self.library.subscriptions().get(idx).map(|s| s.id.clone()) else { return };
        let result = self.library.remove_subscription(&id, &settings);
        self.report_store("unsubscribe", result);
      }
      Screen::CustomPlaylists(_) => {
        let result = self.library.remove_custom_playlist(idx, &settings);
        self.report_store("remove custom playlist", result);
      }
      _ => return,
    }
    let count = self.item_count();
    self.select_index(if count == 0 { None } else { Some(idx.min(count - 1)) });
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    let name = self.theme().name;
    let result = self.config.set("THEME", json!(name));
    self.report_store("save theme", result);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::fake::{FakeCatalog, entry};
  use crate::catalog::search_url;
  use crate::config::StorePaths;
  use tempfile::TempDir;

  const FEED: &str = "https://www.youtube.com/feed/trending";

  fn app_with(dir: &TempDir, catalog: FakeCatalog) -> App {
    let paths = StorePaths::rooted(dir.path());
    let config = ConfigStore::load(paths.config_file());
    App::new(config, Library::new(paths), Arc::new(catalog), YtDlp::new("yt-dlp", None))
  }

  async fn settle(app: &mut App) {
    for _ in 0..400 {
      app.check_pending();
      if !app.is_busy() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("background tasks did not finish");
  }

  fn top_listing(app: &App) -> &Listing {
    match app.top() {
      Screen::Listing(l) => l,
      other => panic!("expected a listing, got {other:?}"),
    }
  }

  fn numbered(n: usize) -> Vec<Entry> {
    (0..n).map(|i| entry(&format!("v{i}"), &format!("Video {i}"))).collect()
  }

  // --- menus and actions ---

  #[test]
  fn menu_labels_are_unique() {
    let mut labels: Vec<&str> = MenuItem::ALL.iter().map(|m| m.label()).collect();
    labels.sort();
    labels.dedup();
    assert_eq!(labels.len(), MenuItem::ALL.len());
    assert_eq!(MenuItem::Trending.feed_url(), Some(FEED));
    assert_eq!(MenuItem::Search.feed_url(), None);
  }

  #[test]
  fn actions_depend_on_entry_kind() {
    let video = entry("a", "A");
    assert_eq!(VideoAction::for_entry(&video)[..3], [VideoAction::Watch, VideoAction::Listen, VideoAction::Save]);
    assert!(VideoAction::for_entry(&video).contains(&VideoAction::Subscribe));

    let playlist = Entry { kind: EntryKind::Playlist, ..entry("PL1", "Mix") };
    let actions = VideoAction::for_entry(&playlist);
    assert_eq!(actions[0], VideoAction::Browse);
    assert!(actions.contains(&VideoAction::SavePlaylist));

    let channel = Entry { kind: EntryKind::Channel, ..entry("UC1", "Chan") };
    assert!(!VideoAction::for_entry(&channel).contains(&VideoAction::Watch));
  }

  #[test]
  fn back_at_root_quits() {
    let dir = TempDir::new().unwrap();
    let mut app = app_with(&dir, FakeCatalog::default());
    app.apply(Action::Menu(MenuItem::Channels));
    assert!(matches!(app.top(), Screen::Subscriptions(_)));
    app.apply(Action::Back);
    assert!(matches!(app.top(), Screen::Menu(_)));
    assert!(!app.should_quit);
    app.apply(Action::Back);
    assert!(app.should_quit);
  }

  #[test]
  fn search_filter_cycles_back_to_none() {
    let dir = TempDir::new().unwrap();
    let mut app = app_with(&dir, FakeCatalog::default());
    for expected in SearchFilter::ALL {
      app.apply(Action::CycleSearchFilter);
      assert_eq!(app.search_filter, Some(expected));
    }
    app.apply(Action::CycleSearchFilter);
    assert_eq!(app.search_filter, None);
  }

  // --- listings ---

  #[tokio::test]
  async fn search_fills_listing_and_records_history() {
    let dir = TempDir::new().unwrap();
    let url = search_url("lofi", None).unwrap();
    let mut app = app_with(&dir, FakeCatalog::default().with_listing(&url, numbered(3)));

    app.apply(Action::Search("  lofi ".to_string()));
    assert!(top_listing(&app).loading);
    settle(&mut app).await;

    let listing = top_listing(&app);
    assert_eq!(listing.entries.len(), 3);
    assert_eq!(listing.state.selected(), Some(0));
    assert_eq!(app.filtered_indices, vec![0, 1, 2]);
    assert_eq!(app.library.search_history(), ["lofi".to_string()]);
  }

  #[tokio::test]
  async fn handle_search_opens_channel_listing() {
    let dir = TempDir::new().unwrap();
    let channel = "https://www.youtube.com/@someone/videos";
    let mut app = app_with(&dir, FakeCatalog::default().with_listing(channel, numbered(2)));
    app.apply(Action::Search("@someone".to_string()));
    settle(&mut app).await;
    assert_eq!(top_listing(&app).source, ListingSource::Remote { url: channel.to_string() });
    assert_eq!(top_listing(&app).entries.len(), 2);
    assert!(app.library.search_history().is_empty());
  }

  #[tokio::test]
  async fn remote_listing_pages_until_short_page() {
    let dir = TempDir::new().unwrap();
    let mut app = app_with(&dir, FakeCatalog::default().with_listing(FEED, numbered(45)));

    app.apply(Action::Menu(MenuItem::Trending));
    settle(&mut app).await;
    assert_eq!(top_listing(&app).entries.len(), 30);
    assert!(top_listing(&app).paging.has_more);

    app.apply(Action::LoadMore);
    settle(&mut app).await;
    let listing = top_listing(&app);
    assert_eq!(listing.entries.len(), 45);
    assert_eq!(listing.entries[30].id, "v30");
    assert!(!listing.paging.has_more);
    assert_eq!(app.filtered_indices.len(), 45);
  }

  #[tokio::test]
  async fn empty_feed_and_failed_search_are_reported() {
    let dir = TempDir::new().unwrap();
    let failing = search_url("nothing here", None).unwrap();
    let mut app = app_with(&dir, FakeCatalog::default().failing_on(&failing));
    app.apply(Action::Menu(MenuItem::Trending));
    settle(&mut app).await;
    assert!(top_listing(&app).entries.is_empty());
    assert!(!top_listing(&app).paging.has_more);
    assert_eq!(app.info_message.as_deref(), Some("No results found."));

    app.apply(Action::Search("nothing here".to_string()));
    settle(&mut app).await;
    assert!(top_listing(&app).entries.is_empty());
    assert!(app.last_error.as_deref().is_some_and(|e| e.starts_with("Failed to load")));
    assert_eq!(app.screens.len(), 3);
  }

  #[tokio::test]
  async fn filter_narrows_and_clamps_selection() {
    let dir = TempDir::new().unwrap();
    let mut entries = numbered(4);
    entries[3].title = "Rust talk".to_string();
    let mut app = app_with(&dir, FakeCatalog::default().with_listing(FEED, entries));
    app.apply(Action::Menu(MenuItem::Trending));
    settle(&mut app).await;

    app.select_index(Some(2));
    app.filter = "rust".to_string();
    app.recompute_filter();
    assert_eq!(app.filtered_indices, vec![3]);
    assert_eq!(app.selected_entry().map(|e| e.id.as_str()), Some("v3"));

    app.filter = "SOME CHANNEL".to_string();
    app.recompute_filter();
    assert_eq!(app.filtered_indices.len(), 4);
  }

  #[test]
  fn matches_filter_title_and_channel() {
    let e = entry("a", "Rock Music Mix");
    assert!(App::matches_filter(&e, ""));
    assert!(App::matches_filter(&e, "MUSIC"));
    assert!(App::matches_filter(&e, "some chan"));
    assert!(!App::matches_filter(&e, "piano"));
  }

  // --- library actions ---

  #[tokio::test]
  async fn save_then_remove_from_saved_listing() {
    let dir = TempDir::new().unwrap();
    let mut app = app_with(&dir, FakeCatalog::default());
    app.apply(Action::Video(VideoAction::Save, entry("a", "A")));
    app.apply(Action::Video(VideoAction::Save, entry("b", "B")));
    app.apply(Action::Video(VideoAction::Save, entry("a", "A")));

    app.apply(Action::Menu(MenuItem::SavedVideos));
    let ids: Vec<&str> = top_listing(&app).entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);

    app.apply(Action::RemoveSelected);
    let ids: Vec<&str> = top_listing(&app).entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["b"]);
    assert_eq!(app.library.saved().len(), 1);
  }

  #[test]
  fn subscribe_and_browse_channel() {
    let dir = TempDir::new().unwrap();
    let mut app = app_with(&dir, FakeCatalog::default());
    let e = entry("a", "A");
    app.apply(Action::ShowActions(e.clone()));
    app.apply(Action::Video(VideoAction::Subscribe, e));
    assert!(matches!(app.top(), Screen::Menu(_)));
    assert_eq!(app.library.subscriptions().len(), 1);

    app.apply(Action::Menu(MenuItem::Channels));
    assert_eq!(
      app.selected_action(),
      Some(Action::Browse {
        title: "Some Channel".to_string(),
        url: "https://www.youtube.com/channel/UCabcdefghijklmnopqrstuv/videos".to_string(),
      })
    );
    app.apply(Action::RemoveSelected);
    assert!(app.library.subscriptions().is_empty());
  }

  #[test]
  fn playlist_bookmark_and_removal() {
    let dir = TempDir::new().unwrap();
    let mut app = app_with(&dir, FakeCatalog::default());
    let playlist = Entry {
      kind: EntryKind::Playlist,
      url: "https://www.youtube.com/playlist?list=PL1".to_string(),
      ..entry("PL1", "Mix")
    };
    app.apply(Action::Video(VideoAction::SavePlaylist, playlist));
    let saved = app.library.custom_playlists().to_vec();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].playlist_watch_url, "https://www.youtube.com/watch?list=PL1");

    app.apply(Action::Menu(MenuItem::CustomPlaylists));
    app.apply(Action::RemoveSelected);
    assert!(app.library.custom_playlists().is_empty());
  }

  #[tokio::test]
  async fn history_entry_reruns_search() {
    let dir = TempDir::new().unwrap();
    let url = search_url("jazz", None).unwrap();
    let mut app = app_with(&dir, FakeCatalog::default().with_listing(&url, numbered(1)));
    app.apply(Action::Search("jazz".to_string()));
    settle(&mut app).await;
    app.apply(Action::Back);

    app.apply(Action::Menu(MenuItem::SearchHistory));
    app.apply(Action::Select);
    settle(&mut app).await;
    assert_eq!(top_listing(&app).entries.len(), 1);

    app.apply(Action::Menu(MenuItem::ClearSearchHistory));
    assert!(app.library.search_history().is_empty());
  }

  // --- playback ---

  #[tokio::test]
  async fn attached_playback_hands_plan_to_main_loop() {
    let dir = TempDir::new().unwrap();
    let mut app = app_with(&dir, FakeCatalog::default());
    app.config.set("DISOWN_STREAMING_PROCESS", json!(false)).unwrap();

    let e = entry("a", "A");
    app.apply(Action::Video(VideoAction::Listen, e.clone()));
    settle(&mut app).await;

    match app.take_suspend() {
      Some(Suspend::Player(plan)) => {
        assert_eq!(plan.target, e.url);
        assert!(plan.audio_only);
        assert_eq!(plan.mode, LaunchMode::Attached);
      }
      other => panic!("expected an attached player, got {other:?}"),
    }
    assert_eq!(app.library.recent()[0].id, "a");
  }

  #[test]
  fn edit_config_suspends_for_editor() {
    let dir = TempDir::new().unwrap();
    let mut app = app_with(&dir, FakeCatalog::default());
    app.apply(Action::Menu(MenuItem::EditConfig));
    match app.take_suspend() {
      Some(Suspend::Editor(path)) => {
        assert_eq!(path, app.config.path());
        assert!(path.exists());
      }
      other => panic!("expected editor, got {other:?}"),
    }
  }

  #[test]
  fn theme_cycle_is_persisted() {
    let dir = TempDir::new().unwrap();
    let mut app = app_with(&dir, FakeCatalog::default());
    app.next_theme();
    let name = app.theme().name;
    let reloaded = ConfigStore::load(StorePaths::rooted(dir.path()).config_file());
    assert_eq!(reloaded.settings().theme, name);
  }
}
