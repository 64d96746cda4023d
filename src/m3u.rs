//! Extended-M3U playlist files for players that cannot expand playlist URLs.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::catalog::Entry;
use crate::constants::constants;

/// Directory scoped to this process, shared by every playlist it writes.
pub fn session_dir() -> PathBuf {
  std::env::temp_dir().join(format!("{}-{}", constants().app_name, std::process::id()))
}

/// Render `#EXTM3U` text: per item an optional `#EXTINF` title line, then the URL.
pub fn render<'a, I>(items: I) -> String
where
  I: IntoIterator<Item = (Option<&'a str>, &'a str)>,
{
  let mut out = String::from("#EXTM3U\n");
  for (title, url) in items {
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
      // A newline inside the title would start a bogus URL line.
      let title = title.replace(['\r', '\n'], " ");
      out.push_str(&format!("#EXTINF:-1,{}\n", title));
    }
    out.push_str(url.trim());
    out.push('\n');
  }
  out
}

/// Write a playlist for `entries` into `dir` under a fresh unique name.
pub fn write_playlist_in(dir: &Path, entries: &[Entry]) -> std::io::Result<PathBuf> {
  std::fs::create_dir_all(dir)?;
  let content = render(entries.iter().map(|e| (Some(e.title.as_str()), e.url.as_str())));
  let mut file = tempfile::Builder::new()
    .prefix(&constants().playlist_file_prefix)
    .suffix(".m3u")
    .rand_bytes(8)
    .tempfile_in(dir)?;
  file.write_all(content.as_bytes())?;
  file.flush()?;
  // The player opens the file after we return, so it must outlive the handle.
  let (_, path) = file.keep().map_err(|e| e.error)?;
  Ok(path)
}
