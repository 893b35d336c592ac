//! Terminal rendering of colorized log output and watch states

use std::time::SystemTime;

use crossterm::style::{Color, Stylize};

use scout_core::colorize::{self, Fragment};
use scout_core::project::ProjectRecord;
use scout_core::session::WatchState;

fn term_color(color: colorize::Color) -> Color {
    match color {
        colorize::Color::Red => Color::Red,
        colorize::Color::Green => Color::Green,
        colorize::Color::Yellow => Color::Yellow,
    }
}

pub fn fragments(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .map(|f| match f {
            Fragment::Plain(text) => text.clone(),
            Fragment::Colored { color, text } => {
                text.as_str().with(term_color(*color)).to_string()
            }
        })
        .collect()
}

/// `[name] ` prefix, one per watched project
pub fn prefix(name: &str) -> String {
    format!("[{}] ", name).dark_cyan().to_string()
}

pub fn state(state: WatchState) -> String {
    let label = state.class();
    match state {
        WatchState::Started => label.green().to_string(),
        WatchState::Starting | WatchState::Stopping => label.yellow().to_string(),
        WatchState::Stopped => label.dark_grey().to_string(),
    }
}

/// HH:MM:SS (UTC) for state lines
pub fn clock(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => {
            let secs = duration.as_secs();
            format!(
                "{:02}:{:02}:{:02}",
                (secs / 3600) % 24,
                (secs / 60) % 60,
                secs % 60
            )
        }
        Err(_) => "??:??:??".to_string(),
    }
}

/// Standalone page around a project's log markup
pub fn html_page(title: &str, markup: &str) -> String {
    let title = title
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>body {{ font-family: monospace; }} .red {{ color: #c33; }} \
         .green {{ color: #393; }} .yellow {{ color: #b80; }}</style>\n</head>\n\
         <body>\n<div class=\"log\">{markup}</div>\n</body>\n</html>\n"
    )
}

fn or_default(dir: &str) -> &str {
    if dir.is_empty() { "(default)" } else { dir }
}

pub fn project_row(p: &ProjectRecord) -> String {
    format!(
        "{:<20} {:<12} {:<11} {}",
        p.name,
        p.environment.as_str(),
        p.output_style.as_str(),
        p.project_dir
    )
}

pub fn project_details(p: &ProjectRecord) -> String {
    use scout_core::project::DirField;

    let mut out = format!(
        "name:         {}\nkey:          {}\nproject dir:  {}\n",
        p.name, p.key, p.project_dir
    );
    for field in DirField::ALL {
        out.push_str(&format!(
            "{:<13} {}\n",
            format!("{} dir:", field.label()),
            or_default(p.dir(field))
        ));
    }
    out.push_str(&format!(
        "environment:  {}\noutput style: {}\n",
        p.environment, p.output_style
    ));
    out
}
