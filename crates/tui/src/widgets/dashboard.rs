//! Dashboard widget for displaying the process list in a table.
//!
//! One row per process: short id, step, sheet, a text progress bar,
//! elapsed time and status.

use ek_core::state::process::format_elapsed;
use ek_protocol::{Process, ProcessStatus};
use ratatui::layout::Constraint;
use ratatui::layout::Rect;
use ratatui::style::Color;
use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::widgets::Block;
use ratatui::widgets::Borders;
use ratatui::widgets::Cell;
use ratatui::widgets::Row;
use ratatui::widgets::Table;
use ratatui::widgets::TableState;
use ratatui::Frame;

const BAR_WIDTH: usize = 10;

/// Renders the dashboard as a table showing all processes.
///
/// # Arguments
/// * `frame` - The frame to render into
/// * `area` - The area to render the table in
/// * `title` - Block title, usually the view name
/// * `processes` - List of all processes to display
/// * `selected` - Index of the currently selected process
pub fn render_dashboard(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    processes: &[Process],
    selected: usize,
) {
    let rows: Vec<Row> = processes
        .iter()
        .map(|p| {
            let status = p.status();
            Row::new(vec![
                Cell::from(short_id(p)),
                Cell::from(p.step_name.as_str()),
                Cell::from(p.sheet_name.clone()),
                Cell::from(progress_bar(p.progress)),
                Cell::from(format_elapsed(p.elapsed_time)),
                Cell::from(format!("{status:?}")).style(status_style(status)),
            ])
        })
        .collect();

    let header = Row::new(vec![
        Cell::from("ID"),
        Cell::from("Step"),
        Cell::from("Sheet"),
        Cell::from("Progress"),
        Cell::from("Elapsed"),
        Cell::from("Status"),
    ])
    .style(
        Style::default()
            .add_modifier(Modifier::BOLD)
            .fg(Color::Cyan),
    );

    let widths = [
        Constraint::Length(8),
        Constraint::Percentage(30),
        Constraint::Percentage(20),
        Constraint::Length(16),
        Constraint::Length(9),
        Constraint::Length(10),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title.to_string())
                .style(Style::default().fg(Color::White)),
        )
        .row_highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");

    let mut table_state = TableState::default();
    if !processes.is_empty() {
        table_state.select(Some(selected));
    }

    frame.render_stateful_widget(table, area, &mut table_state);
}

pub fn status_style(status: ProcessStatus) -> Style {
    match status {
        ProcessStatus::Running => Style::default().fg(Color::Green),
        ProcessStatus::Completed => Style::default().fg(Color::Cyan),
        ProcessStatus::Cancelled => Style::default().fg(Color::DarkGray),
        ProcessStatus::Failed => Style::default().fg(Color::Red),
    }
}

/// Text bar such as `#####.....  50%`.
pub fn progress_bar(progress: f64) -> String {
    let clamped = progress.clamp(0.0, 100.0);
    let filled = ((clamped / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!(
        "{}{} {:>3.0}%",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
        clamped
    )
}

/// First 8 characters of the UUID.
fn short_id(process: &Process) -> String {
    process.id.to_string().chars().take(8).collect()
}
