//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::domain::models::{Task, TaskStatus};

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
        );
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending
/// "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

pub fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Pending => Color::Yellow,
        TaskStatus::InProgress => Color::Cyan,
        TaskStatus::WaitingForResponse => Color::Magenta,
        TaskStatus::Completed => Color::Green,
        TaskStatus::Failed => Color::Red,
        TaskStatus::Cancelled => Color::DarkGrey,
    }
}

/// Format a list of tasks as a table.
pub fn format_task_table(tasks: &[Task]) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Type").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Waiting on").add_attribute(Attribute::Bold),
        Cell::new("Retries").add_attribute(Attribute::Bold),
        Cell::new("Last activity").add_attribute(Attribute::Bold),
    ]);

    for task in tasks {
        let id_short = &task.id.to_string()[..8];
        let waiting = task
            .waiting_for
            .map(|w| w.as_str().to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(id_short),
            Cell::new(truncate(&task.title, 40)),
            Cell::new(task.task_type.as_str()),
            Cell::new(task.status.as_str()).fg(status_color(task.status)),
            Cell::new(waiting),
            Cell::new(format!("{}/{}", task.retry_count, task.max_retries)),
            Cell::new(task.last_activity_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer string", 10), "a much ...");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate(&"é".repeat(10), 10), "é".repeat(10));
        assert_eq!(truncate(&"é".repeat(11), 10), format!("{}...", "é".repeat(7)));
    }
}
