//! UI theme: palette tokens and style helpers for the project browser

use ratatui::style::{Color, Modifier, Style};

use scout_core::colorize;
use scout_core::session::WatchState;

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Panel border color
    pub panel_border: Color,
    /// Primary text color
    pub text: Color,
    /// Dimmed text (secondary info)
    pub text_dim: Color,
    /// Muted text (unset values, stopped projects)
    pub text_muted: Color,
    /// Accent color (highlights, focus)
    pub accent: Color,
    pub success: Color,
    pub warn: Color,
    pub error: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    /// Key hint text
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255),
            success: Color::Rgb(78, 201, 176),
            warn: Color::Rgb(220, 180, 100),
            error: Color::Rgb(244, 135, 113),
            selection_bg: Color::Rgb(38, 79, 120),
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120),
        }
    }

    /// Plain ANSI colors, for terminals without truecolor
    pub fn basic() -> Self {
        Self {
            panel_border: Color::DarkGray,
            text: Color::White,
            text_dim: Color::Gray,
            text_muted: Color::DarkGray,
            accent: Color::Cyan,
            success: Color::Green,
            warn: Color::Yellow,
            error: Color::Red,
            selection_bg: Color::Blue,
            selection_fg: Color::White,
            key_hint: Color::Yellow,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    /// Picks the palette from `COLORTERM`
    pub fn detect() -> Self {
        let truecolor = std::env::var("COLORTERM")
            .map(|v| v == "truecolor" || v == "24bit")
            .unwrap_or(false);
        if truecolor {
            Self::new(Palette::dark())
        } else {
            Self::new(Palette::basic())
        }
    }

    pub fn state_style(&self, state: WatchState) -> Style {
        let color = match state {
            WatchState::Started => self.palette.success,
            WatchState::Starting | WatchState::Stopping => self.palette.warn,
            WatchState::Stopped => self.palette.text_muted,
        };
        Style::default().fg(color)
    }

    pub fn state_icon(&self, state: WatchState) -> &'static str {
        match state {
            WatchState::Started => "●",
            WatchState::Starting => "◐",
            WatchState::Stopping => "◌",
            WatchState::Stopped => "○",
        }
    }

    /// Style of a colorized compiler output fragment
    pub fn fragment_style(&self, color: Option<colorize::Color>) -> Style {
        match color {
            Some(colorize::Color::Red) => Style::default().fg(self.palette.error),
            Some(colorize::Color::Green) => Style::default().fg(self.palette.success),
            Some(colorize::Color::Yellow) => Style::default().fg(self.palette.warn),
            None => Style::default().fg(self.palette.text),
        }
    }

    pub fn tab_style(&self, active: bool) -> Style {
        if active {
            Style::default()
                .fg(self.palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.palette.text_dim)
        }
    }

    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::detect)
}

/// Shorthands over the global theme
pub mod styles {
    use super::*;

    pub fn state(state: WatchState) -> Style {
        theme().state_style(state)
    }

    pub fn state_icon(state: WatchState) -> &'static str {
        theme().state_icon(state)
    }

    pub fn fragment(color: Option<colorize::Color>) -> Style {
        theme().fragment_style(color)
    }

    pub fn tab(active: bool) -> Style {
        theme().tab_style(active)
    }

    pub fn selection() -> Style {
        theme().selection_style()
    }

    pub fn key_hint() -> Style {
        Style::default().fg(theme().palette.key_hint)
    }

    pub fn border_subtle() -> Style {
        Style::default().fg(theme().palette.panel_border)
    }

    pub fn border_focused() -> Style {
        Style::default().fg(theme().palette.accent)
    }

    pub fn text() -> Style {
        Style::default().fg(theme().palette.text)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(theme().palette.text_dim)
    }

    pub fn text_muted() -> Style {
        Style::default().fg(theme().palette.text_muted)
    }

    pub fn accent_bold() -> Style {
        Style::default()
            .fg(theme().palette.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn success() -> Style {
        Style::default().fg(theme().palette.success)
    }

    pub fn error() -> Style {
        Style::default().fg(theme().palette.error)
    }
}
