//! Detail view widget for the selected process.
//!
//! Shows counters, timing, the failure message and the rows the job wrote.
//! Long row lists scroll with PageUp/PageDown.

use ek_core::state::process::format_elapsed;
use ek_protocol::Process;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame,
};

use crate::widgets::dashboard::status_style;

/// Widget for displaying process details with scrolling support.
pub struct DetailView {
    /// Current scroll offset (number of lines scrolled from the top).
    pub scroll_offset: usize,
}

impl DetailView {
    pub fn new() -> Self {
        Self { scroll_offset: 0 }
    }

    /// Render the detail view for a given process.
    ///
    /// # Arguments
    ///
    /// * `frame` - The ratatui frame to render to
    /// * `area` - The area to render within
    /// * `process` - Optional reference to the process to display
    pub fn render(&self, frame: &mut Frame, area: Rect, process: Option<&Process>) {
        let block = Block::default().borders(Borders::ALL).title("Detail");

        let Some(process) = process else {
            frame.render_widget(Paragraph::new("No process selected.").block(block), area);
            return;
        };

        let lines = detail_lines(process);
        let total_lines = lines.len();
        let paragraph = Paragraph::new(lines)
            .block(block)
            .scroll((u16::try_from(self.scroll_offset).unwrap_or(u16::MAX), 0));
        frame.render_widget(paragraph, area);

        let visible_lines = area.height.saturating_sub(2) as usize;
        if total_lines > visible_lines {
            let mut scrollbar_state = ScrollbarState::default()
                .content_length(total_lines)
                .viewport_content_length(visible_lines)
                .position(self.scroll_offset);

            let scrollbar = Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"));

            frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(1);
    }

    /// Scroll down by one line, never past `max`.
    pub fn scroll_down(&mut self, max: usize) {
        self.scroll_offset = (self.scroll_offset + 1).min(max);
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
    }
}

impl Default for DetailView {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of lines the detail panel needs for `process`.
pub fn line_count(process: &Process) -> usize {
    detail_lines(process).len()
}

fn detail_lines(process: &Process) -> Vec<Line<'static>> {
    let stats = &process.stats;
    let status = process.status();
    let label = Style::default().fg(Color::Gray);
    let field = |name: &'static str, value: String| {
        Line::from(vec![Span::styled(format!("{name:<14}"), label), Span::raw(value)])
    };

    let mut lines = vec![
        field("Process", process.id.to_string()),
        field("Step", process.step_name.to_string()),
        field("Sheet", process.sheet_name.clone()),
        field("Launched from", process.origin.to_string()),
        Line::from(vec![
            Span::styled(format!("{:<14}", "Status"), label),
            Span::styled(format!("{status:?}"), status_style(status)),
        ]),
        field("Progress", format!("{:.1}%", process.progress)),
        field("Elapsed", format_elapsed(process.elapsed_time)),
        field(
            "Rows",
            format!(
                "{} total, {} processed, {} succeeded, {} errors, {} skipped",
                stats.total, stats.processed, stats.success, stats.errors, stats.skipped
            ),
        ),
    ];

    if let Some(empty) = stats.initial_empty_rows {
        lines.push(field("Empty at start", empty.to_string()));
    }
    if let Some(error) = &process.error {
        lines.push(Line::from(vec![
            Span::styled(format!("{:<14}", "Error"), label),
            Span::styled(error.clone(), Style::default().fg(Color::Red)),
        ]));
    }
    if !process.filled_row_indices.is_empty() {
        lines.push(field(
            "Filled rows",
            process.filled_row_indices.len().to_string(),
        ));
        lines.extend(
            process
                .filled_row_indices
                .iter()
                .map(|row| Line::from(format!("  row {row}"))),
        );
    }

    lines
}
