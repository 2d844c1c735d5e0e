//! Table output formatting for CLI commands
//!
//! Renders generation reports and graph diagnostics using comfy-table.
//! Color is dropped when NO_COLOR is set or the terminal is dumb.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use crate::domain::models::Situation;
use crate::services::report::{FailureRecord, GenerationReport};

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    /// Create a new table formatter
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    /// Create a new table formatter with custom settings
    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Key figures of a finished run
    pub fn format_report(&self, report: &GenerationReport) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);

        let summary = &report.summary;
        let stop = report
            .stop_reason
            .map_or_else(|| "-".to_string(), |r| format!("{r:?}"));
        let rows: Vec<(&str, String)> = vec![
            ("Situations", report.situation_count.to_string()),
            ("Arcs", report.arc_count.to_string()),
            ("Generation steps", report.generation_step.to_string()),
            ("Stop reason", stop),
            ("Cycles injected", report.cycles_injected.to_string()),
            ("Dangling resolved", report.bridges.dangling_resolved.len().to_string()),
            (
                "Bridges built",
                (report.bridges.direct_bridges.len() + report.bridges.forced_bridges.len())
                    .to_string(),
            ),
            ("Bridge situations", report.bridges.bridge_situations.len().to_string()),
            ("Soft-locks resolved", report.soft_locks_resolved.len().to_string()),
            ("Finalize passes", report.finalize_passes.to_string()),
            (
                "Generation calls",
                format!("{}/{} succeeded", summary.successful_steps, summary.total_steps),
            ),
            ("Retries", summary.total_retries.to_string()),
            ("Generation time", format!("{:.2?}", summary.total_duration)),
        ];
        for (name, value) in rows {
            table.add_row(vec![Cell::new(name), Cell::new(value)]);
        }

        let (status, color) = if report.is_clean() {
            ("✓ clean".to_string(), Color::Green)
        } else {
            (
                format!(
                    "✗ {} dangling, {} unreachable, {} soft-locks",
                    report.remaining_dangling.len(),
                    report.unreachable.len(),
                    report.unresolved_soft_locks.len()
                ),
                Color::Red,
            )
        };
        table.add_row(vec![Cell::new("Structure"), self.colored(status, color)]);
        table.to_string()
    }

    /// Failed generation requests
    pub fn format_failures(&self, failures: &[FailureRecord]) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new("Step").add_attribute(Attribute::Bold),
            Cell::new("Situation").add_attribute(Attribute::Bold),
            Cell::new("Choice").add_attribute(Attribute::Bold),
            Cell::new("Error").add_attribute(Attribute::Bold),
        ]);
        for failure in failures {
            table.add_row(vec![
                Cell::new(&failure.step_name),
                Cell::new(failure.situation_id.as_deref().unwrap_or("-")),
                Cell::new(failure.choice_id.as_deref().unwrap_or("-")),
                self.colored(truncate_text(&failure.error, 60), Color::Red),
            ]);
        }
        table.to_string()
    }

    /// Situations that still have dangling choices
    pub fn format_incomplete(&self, situations: &[&Situation]) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new("Situation").add_attribute(Attribute::Bold),
            Cell::new("Depth").add_attribute(Attribute::Bold),
            Cell::new("Arc").add_attribute(Attribute::Bold),
            Cell::new("Dangling").add_attribute(Attribute::Bold),
        ]);
        for situation in situations {
            let dangling: Vec<&str> = situation
                .dangling_choices()
                .map(|c| c.id.as_str())
                .collect();
            table.add_row(vec![
                Cell::new(&situation.id),
                Cell::new(situation.generation_depth),
                Cell::new(situation.arc_id.as_deref().unwrap_or("-")),
                self.colored(dangling.join(", "), Color::Yellow),
            ]);
        }
        table.to_string()
    }

    fn colored(&self, text: impl Into<String>, color: Color) -> Cell {
        let cell = Cell::new(text.into());
        if self.use_colors {
            cell.fg(color)
        } else {
            cell
        }
    }

    /// Create base table with common styling
    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM"), Ok(term) if term == "dumb")
}

fn truncate_text(text: &str, max_len: usize) -> String {
    super::truncate(text, max_len)
}
