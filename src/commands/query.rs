/*!
 * Result rendering
 *
 * Turns a `ResultTuple` into text: a comfy-table grid in the session's
 * table format, or the expanded key/value layout for `\G`. Rendering to a
 * string lets the caller fan the output out to tee/once sinks.
 */

use comfy_table::presets::{ASCII_FULL, ASCII_MARKDOWN, NOTHING, UTF8_FULL};
use comfy_table::{Attribute, Cell, ContentArrangement, Table};

use crate::special::ResultTuple;

/// Formats accepted by `.mode`.
pub const SUPPORTED_FORMATS: &[&str] = &["ascii", "utf8", "markdown", "plain", "vertical"];

pub fn is_supported_format(name: &str) -> bool {
    SUPPORTED_FORMATS.contains(&name)
}

pub fn supported_formats() -> Vec<String> {
    SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect()
}

/// Render one result. `vertical` overrides the session format for this
/// result only (a trailing `\G`).
pub fn render(result: &ResultTuple, format: &str, vertical: bool) -> String {
    let mut out = String::new();

    if let Some(title) = &result.title {
        out.push_str(title);
        out.push('\n');
    }

    if !result.rows.is_empty() {
        if vertical || format == "vertical" {
            out.push_str(&render_vertical(&result.headers, &result.rows));
        } else if result.headers.is_empty() {
            // Pre-formatted output (system commands, status listings).
            for row in &result.rows {
                out.push_str(&row.join("\t"));
                out.push('\n');
            }
        } else {
            out.push_str(&render_table(&result.headers, &result.rows, format));
            out.push('\n');
        }
    }

    if let Some(status) = &result.status {
        out.push_str(status);
        out.push('\n');
    }

    out
}

fn render_table(headers: &[String], rows: &[Vec<String>], format: &str) -> String {
    let mut table = Table::new();
    table.load_preset(match format {
        "utf8" => UTF8_FULL,
        "markdown" => ASCII_MARKDOWN,
        "plain" => NOTHING,
        _ => ASCII_FULL,
    });
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    for row in rows {
        table.add_row(row.iter().map(Cell::new).collect::<Vec<_>>());
    }

    table.to_string()
}

fn render_vertical(headers: &[String], rows: &[Vec<String>]) -> String {
    let width = headers.iter().map(|h| h.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!(
            "***************************[ {}. row ]***************************\n",
            i + 1
        ));
        for (header, value) in headers.iter().zip(row.iter()) {
            out.push_str(&format!("{:>width$} | {}\n", header, value));
        }
    }
    out
}
