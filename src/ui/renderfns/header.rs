use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::session::Session;
use crate::ui::view::ShortcutInfo;

/// What the header shows besides the shortcuts
pub struct HeaderInfo<'a> {
  pub title: Option<&'a str>,
  pub api_url: &'a str,
  pub session: Option<Session>,
}

/// Draw the header bar with logo, context, and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, info: &HeaderInfo, shortcuts: &[ShortcutInfo]) {
  let context = info.title.unwrap_or_else(|| extract_host(info.api_url));
  let user = match &info.session {
    Some(session) => format!(
      " {} ({}) ",
      session.username.as_deref().unwrap_or("?"),
      session.role.map(|r| r.label()).unwrap_or("unknown role")
    ),
    None => " signed out ".to_string(),
  };

  let mut spans = vec![
    Span::styled(" stockroom ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", context), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(user, Style::default().fg(Color::Yellow).bold()),
    Span::raw(" "),
  ];

  let mut shortcuts: Vec<&ShortcutInfo> = shortcuts.iter().collect();
  shortcuts.sort_by_key(|s| s.priority);
  for shortcut in shortcuts {
    // Keys and brackets highlighted, descriptions dimmed
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Host (and port) part of the API url
fn extract_host(url: &str) -> &str {
  let rest = url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url);
  rest.split('/').next().unwrap_or(rest)
}
