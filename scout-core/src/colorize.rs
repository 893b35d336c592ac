//! ANSI color scanning for watcher output
//!
//! Compass colors its action words (`create`, `overwrite`, `error`, ...) with
//! SGR sequences of the form `ESC[<n>m text ESC[0m`. [`colorize`] turns a raw
//! chunk into an ordered list of plain and colored fragments; any escape that
//! is not part of such a span is dropped, the text never is.

use serde::{Deserialize, Serialize};

const ESC: u8 = 0x1b;
const RESET: &[u8] = b"\x1b[0m";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Green,
    Yellow,
}

impl Color {
    /// Map an SGR code to a color. `0` and anything unknown mean no color.
    pub fn from_code(code: &str) -> Option<Color> {
        match code {
            "31" => Some(Color::Red),
            "32" => Some(Color::Green),
            "33" => Some(Color::Yellow),
            _ => None,
        }
    }

    /// Class name the presentation layer styles
    pub fn class(&self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Yellow => "yellow",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragment {
    Plain(String),
    Colored { color: Color, text: String },
}

impl Fragment {
    pub fn text(&self) -> &str {
        match self {
            Fragment::Plain(text) | Fragment::Colored { text, .. } => text,
        }
    }

    pub fn color(&self) -> Option<Color> {
        match self {
            Fragment::Plain(_) => None,
            Fragment::Colored { color, .. } => Some(*color),
        }
    }
}

/// Builder that merges adjacent plain text and skips empty pieces
#[derive(Default)]
struct Fragments(Vec<Fragment>);

impl Fragments {
    fn plain(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Fragment::Plain(last)) = self.0.last_mut() {
            last.push_str(text);
        } else {
            self.0.push(Fragment::Plain(text.to_string()));
        }
    }

    fn colored(&mut self, color: Option<Color>, text: &str) {
        match color {
            Some(color) => self.0.push(Fragment::Colored {
                color,
                text: text.to_string(),
            }),
            None => self.plain(text),
        }
    }
}

/// Parse `ESC [ digits m` at `at`. Returns the digits and the index just past `m`.
fn sgr_at(bytes: &[u8], at: usize) -> Option<(&[u8], usize)> {
    if bytes.get(at) != Some(&ESC) || bytes.get(at + 1) != Some(&b'[') {
        return None;
    }
    let digits_start = at + 2;
    let mut end = digits_start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start || bytes.get(end) != Some(&b'm') {
        return None;
    }
    Some((&bytes[digits_start..end], end + 1))
}

/// Non-empty escape-free text starting at `from` followed by a reset.
/// Returns the end of the text and the index just past the reset.
fn span_body(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    let text_end = bytes[from..]
        .iter()
        .position(|&b| b == ESC)
        .map(|off| from + off)?;
    if text_end == from || !bytes[text_end..].starts_with(RESET) {
        return None;
    }
    Some((text_end, text_end + RESET.len()))
}

/// Split a raw output chunk into plain and colored fragments.
///
/// A color escape with no reset before the next escape (or the end of the
/// chunk) is stripped and its text stays plain. With nested escapes only the
/// innermost `ESC[n]m text ESC[0m` run is colored.
pub fn colorize(raw: &str) -> Vec<Fragment> {
    let bytes = raw.as_bytes();
    let mut out = Fragments::default();
    let mut plain_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let Some((code, after)) = sgr_at(bytes, i) else {
            i += 1;
            continue;
        };

        // Every boundary here sits on an ASCII byte, so slicing `raw` is safe.
        out.plain(&raw[plain_start..i]);
        match span_body(bytes, after) {
            Some((text_end, next)) => {
                let code = std::str::from_utf8(code).unwrap_or_default();
                out.colored(Color::from_code(code), &raw[after..text_end]);
                i = next;
            }
            None => i = after,
        }
        plain_start = i;
    }
    out.plain(&raw[plain_start..]);

    out.0
}

/// Concatenated text with all styling dropped
pub fn plain_text(fragments: &[Fragment]) -> String {
    fragments.iter().map(Fragment::text).collect()
}

fn escape_html(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// Render fragments as HTML, colored runs wrapped in `<span class="...">`
pub fn to_markup(fragments: &[Fragment]) -> String {
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            Fragment::Plain(text) => escape_html(text, &mut out),
            Fragment::Colored { color, text } => {
                out.push_str("<span class=\"");
                out.push_str(color.class());
                out.push_str("\">");
                escape_html(text, &mut out);
                out.push_str("</span>");
            }
        }
    }
    out
}

/// Turn newlines into `<br />` for display in markup
pub fn line_breaks(markup: &str) -> String {
    markup.replace("\r\n", "\n").replace('\n', "<br />")
}
