use ratatui::prelude::{Color, Modifier, Style};

use crate::api::{OrderStatus, Product};

/// Truncate to at most `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Truncate, then left-align in a column of `width` characters
pub fn pad(s: &str, width: usize) -> String {
  let text = truncate(s, width);
  let fill = width.saturating_sub(text.chars().count());
  format!("{}{}", text, " ".repeat(fill))
}

pub fn order_status_color(status: OrderStatus) -> Color {
  match status {
    OrderStatus::AwaitingOrder => Color::Yellow,
    OrderStatus::Ordered => Color::Green,
  }
}

/// Quantity style: red and bold at or below the critical value
pub fn stock_style(product: &Product) -> Style {
  if product.is_critical() {
    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
  } else {
    Style::default().fg(Color::Green)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_counts_characters() {
    assert_eq!(truncate("Склад номер один", 8), "Склад...");
  }

  #[test]
  fn test_pad_aligns_multibyte() {
    assert_eq!(pad("Гвозди", 8), "Гвозди  ");
    assert_eq!(pad("Main warehouse", 8).chars().count(), 8);
  }

  #[test]
  fn test_order_status_color() {
    assert_eq!(order_status_color(OrderStatus::Ordered), Color::Green);
    assert_eq!(order_status_color(OrderStatus::AwaitingOrder), Color::Yellow);
  }
}
