//! Human-readable run reports using comfy-table and console styling.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};

use super::truncate;
use crate::domain::models::{
    Decision, DegradationLevel, RunReport, SelectionMethod, WorkerExit,
};

/// Formats a [`RunReport`] for the terminal
pub struct ReportFormatter {
    use_colors: bool,
}

impl ReportFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: console::colors_enabled(),
        }
    }

    pub const fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    pub fn format_report(&self, report: &RunReport) -> String {
        let mut out = Vec::new();

        out.push(format!(
            "Run {} finished in {:.1}s ({})",
            report.run_id,
            report.elapsed.as_secs_f64(),
            report.shutdown_reason
        ));
        out.push(format!(
            "Degradation: {}  ({}/{} waypoints with content, {:.0}%)",
            self.degradation(report.degradation),
            report.successful_decisions(),
            report.decisions.len(),
            report.success_ratio * 100.0
        ));
        if report.forced_terminations > 0 || report.late_results > 0 {
            out.push(format!(
                "Forced terminations: {}  Late results discarded: {}",
                report.forced_terminations, report.late_results
            ));
        }
        out.push(String::new());
        out.push(self.format_decisions(report));
        out.push(String::new());
        out.push(self.format_workers(report));

        out.join("\n")
    }

    pub fn format_decisions(&self, report: &RunReport) -> String {
        let mut table = self.base_table();
        table.set_header(vec![
            header("#"),
            header("Waypoint"),
            header("Selected"),
            header("Method"),
            header("Score"),
            header("Content"),
        ]);

        for (decision, timing) in report.decisions.iter().zip(&report.timings) {
            let score = decision
                .selected
                .and_then(|k| decision.scores.get(&k))
                .map_or_else(|| "-".to_string(), |s| format!("{s:.0}"));
            let title = decision
                .content
                .as_ref()
                .map_or_else(|| "-".to_string(), |c| truncate(&c.title, 48));

            table.add_row(vec![
                Cell::new(decision.unit_id.0 + 1),
                Cell::new(truncate(&timing.waypoint, 32)),
                self.selected_cell(decision),
                self.method_cell(decision.method),
                Cell::new(score),
                Cell::new(title),
            ]);
        }

        table.to_string()
    }

    fn format_workers(&self, report: &RunReport) -> String {
        let mut table = self.base_table();
        table.set_header(vec![header("Worker"), header("Exit")]);
        for (kind, exit) in &report.worker_exits {
            let cell = if self.use_colors && !exit.is_clean() {
                Cell::new(exit.to_string()).fg(Color::Red)
            } else {
                Cell::new(exit.to_string())
            };
            table.add_row(vec![Cell::new(kind.to_string()), cell]);
        }
        table.to_string()
    }

    fn base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if !self.use_colors {
            table.force_no_tty();
        }
        table
    }

    fn selected_cell(&self, decision: &Decision) -> Cell {
        let cell = Cell::new(decision.selected_label());
        if !self.use_colors {
            return cell;
        }
        if decision.has_content() {
            cell.fg(Color::Green)
        } else {
            cell.fg(Color::Red)
        }
    }

    fn method_cell(&self, method: SelectionMethod) -> Cell {
        let cell = Cell::new(method.to_string());
        match method {
            SelectionMethod::Fallback | SelectionMethod::TieBreak if self.use_colors => {
                cell.fg(Color::Yellow)
            }
            _ => cell,
        }
    }

    fn degradation(&self, level: DegradationLevel) -> StyledObject<String> {
        let styled = style(level.to_string()).bold();
        if !self.use_colors {
            return styled.force_styling(false);
        }
        match level {
            DegradationLevel::Full => styled.green(),
            DegradationLevel::Partial => styled.cyan(),
            DegradationLevel::Degraded => styled.yellow(),
            DegradationLevel::Minimal | DegradationLevel::CompleteFailure => styled.red(),
        }
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

/// One-line summary of a worker exit for log lines and progress messages
pub fn exit_summary(exit: &WorkerExit) -> String {
    if exit.is_clean() {
        "ok".to_string()
    } else {
        exit.to_string()
    }
}
