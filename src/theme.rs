use ratatui::style::Color;

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEMES: &[Theme] = &[
  Theme {
    name: "default",
    bg: Color::Reset,
    fg: Color::White,
    accent: Color::Cyan,
    muted: Color::DarkGray,
    border: Color::Gray,
    highlight_fg: Color::Black,
    highlight_bg: Color::Cyan,
    stripe_bg: Color::Rgb(30, 30, 36),
    status: Color::Yellow,
    error: Color::Red,
    key_fg: Color::Black,
    key_bg: Color::Gray,
  },
  Theme {
    name: "nord",
    bg: Color::Rgb(46, 52, 64),
    fg: Color::Rgb(216, 222, 233),
    accent: Color::Rgb(136, 192, 208),
    muted: Color::Rgb(106, 117, 137),
    border: Color::Rgb(76, 86, 106),
    highlight_fg: Color::Rgb(46, 52, 64),
    highlight_bg: Color::Rgb(136, 192, 208),
    stripe_bg: Color::Rgb(52, 59, 72),
    status: Color::Rgb(235, 203, 139),
    error: Color::Rgb(191, 97, 106),
    key_fg: Color::Rgb(46, 52, 64),
    key_bg: Color::Rgb(129, 161, 193),
  },
  Theme {
    name: "gruvbox",
    bg: Color::Rgb(40, 40, 40),
    fg: Color::Rgb(235, 219, 178),
    accent: Color::Rgb(250, 189, 47),
    muted: Color::Rgb(146, 131, 116),
    border: Color::Rgb(102, 92, 84),
    highlight_fg: Color::Rgb(40, 40, 40),
    highlight_bg: Color::Rgb(250, 189, 47),
    stripe_bg: Color::Rgb(50, 48, 47),
    status: Color::Rgb(142, 192, 124),
    error: Color::Rgb(251, 73, 52),
    key_fg: Color::Rgb(40, 40, 40),
    key_bg: Color::Rgb(168, 153, 132),
  },
  Theme {
    name: "rose",
    bg: Color::Rgb(25, 23, 36),
    fg: Color::Rgb(224, 222, 244),
    accent: Color::Rgb(235, 188, 186),
    muted: Color::Rgb(110, 106, 134),
    border: Color::Rgb(64, 61, 82),
    highlight_fg: Color::Rgb(25, 23, 36),
    highlight_bg: Color::Rgb(196, 167, 231),
    stripe_bg: Color::Rgb(31, 29, 46),
    status: Color::Rgb(246, 193, 119),
    error: Color::Rgb(235, 111, 146),
    key_fg: Color::Rgb(25, 23, 36),
    key_bg: Color::Rgb(156, 207, 216),
  },
];

/// Index of the theme called `name`, falling back to the first.
pub fn index_of(name: &str) -> usize {
  THEMES.iter().position(|t| t.name.eq_ignore_ascii_case(name.trim())).unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_by_name() {
    assert_eq!(THEMES[index_of("nord")].name, "nord");
    assert_eq!(THEMES[index_of(" Gruvbox ")].name, "gruvbox");
    assert_eq!(index_of("no-such-theme"), 0);
    assert_eq!(THEMES[0].name, "default");
  }
}
