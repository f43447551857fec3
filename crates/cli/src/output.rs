//! Output formatting for CLI

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Render a single item
pub fn render_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(T::headers());
            table.add_row(item.row());
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(item).unwrap_or_default(),
        OutputFormat::Plain => T::headers()
            .iter()
            .zip(item.row())
            .map(|(header, value)| format!("{}: {}", header, value))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Render a list of items
pub fn render_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(items).unwrap_or_default(),
        _ if items.is_empty() => "No items found.".to_string(),
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            table.to_string()
        }
        OutputFormat::Plain => items
            .iter()
            .map(|item| {
                T::headers()
                    .iter()
                    .zip(item.row())
                    .map(|(header, value)| format!("{}: {}", header, value))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n---\n"),
    }
}

pub fn print_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) {
    println!("{}", render_item(item, format));
}

pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    println!("{}", render_list(items, format));
}

/// Print a simple message
pub fn print_message(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "message": message }));
        }
        _ => {
            println!("{}", message);
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

/// Shorten `text` to at most `max` characters for table cells
pub fn ellipsize(text: &str, max: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() <= max {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        name: String,
        count: usize,
    }

    impl TableDisplay for Row {
        fn headers() -> Vec<&'static str> {
            vec!["Name", "Count"]
        }

        fn row(&self) -> Vec<String> {
            vec![self.name.clone(), self.count.to_string()]
        }
    }

    #[test]
    fn test_plain_item() {
        let row = Row { name: "login".into(), count: 2 };
        assert_eq!(render_item(&row, OutputFormat::Plain), "Name: login\nCount: 2");
    }

    #[test]
    fn test_json_list_empty() {
        let rows: Vec<Row> = vec![];
        assert_eq!(render_list(&rows, OutputFormat::Json), "[]");
        assert_eq!(render_list(&rows, OutputFormat::Table), "No items found.");
    }

    #[test]
    fn test_table_contains_cells() {
        let rows = vec![Row { name: "search".into(), count: 1 }];
        let rendered = render_list(&rows, OutputFormat::Table);
        assert!(rendered.contains("Name"));
        assert!(rendered.contains("search"));
    }

    #[test]
    fn test_ellipsize() {
        assert_eq!(ellipsize("short", 10), "short");
        assert_eq!(ellipsize("first line\nsecond", 20), "first line");
        assert_eq!(ellipsize("abcdefghij", 5), "abcd…");
    }
}
