//! TUI application state and event loop.
//!
//! This module defines the main `App` struct that manages the TUI state
//! and the event loop using `tokio::select!`, plus [`run_app`], which mounts
//! a view session and drives it from the terminal.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ek_core::backend::HttpBackend;
use ek_core::config::loader::load_config;
use ek_core::engine::ViewSession;
use ek_core::store::FileStore;
use ek_protocol::{Event, Op, Process, ViewRole};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::StreamExt;
use tracing::info;

use crate::event_handler;
use crate::tui::{Tui, TuiEvent};
use crate::widgets::dashboard::render_dashboard;
use crate::widgets::detail_view::{line_count, DetailView};

/// Main TUI application state.
pub struct App {
    /// The view this terminal shows.
    pub role: ViewRole,
    /// Processes as last reported by the session.
    pub processes: Vec<Process>,
    pub selected_index: usize,
    pub command_input: String,
    /// Last notification or command error.
    pub status: Option<String>,
    pub detail: DetailView,
    /// Channel to send operations to the session.
    pub op_tx: UnboundedSender<Op>,
    /// Channel to receive events from the session.
    pub event_rx: UnboundedReceiver<Event>,
    pub should_exit: bool,
}

impl App {
    pub fn new(role: ViewRole, op_tx: UnboundedSender<Op>, event_rx: UnboundedReceiver<Event>) -> Self {
        Self {
            role,
            processes: Vec::new(),
            selected_index: 0,
            command_input: String::new(),
            status: None,
            detail: DetailView::new(),
            op_tx,
            event_rx,
            should_exit: false,
        }
    }

    /// Main event loop.
    ///
    /// Uses `tokio::select!` to handle keyboard input and session events concurrently.
    pub async fn run(&mut self, tui: &mut Tui) -> Result<()> {
        let mut tui_events = tui.event_stream();
        let frames = tui.frame_requester();
        frames.schedule_frame();

        while !self.should_exit {
            select! {
                event = self.event_rx.recv() => {
                    let Some(event) = event else { break };
                    self.handle_core_event(event);
                    frames.schedule_frame();
                }
                Some(tui_event) = tui_events.next() => {
                    match tui_event {
                        TuiEvent::Key(key_event) => {
                            self.handle_key_event(key_event);
                            frames.schedule_frame();
                        }
                        TuiEvent::Draw => tui.draw(|frame| self.render(frame))?,
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_core_event(&mut self, event: Event) {
        event_handler::handle_core_event(&mut self.processes, &mut self.status, event);
        self.selected_index = self
            .selected_index
            .min(self.processes.len().saturating_sub(1));
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) {
        if key_event.kind == KeyEventKind::Press {
            match key_event.code {
                KeyCode::PageUp => return self.detail.scroll_up(),
                KeyCode::PageDown => {
                    let max = self.selected().map_or(0, line_count);
                    return self.detail.scroll_down(max);
                }
                _ => {}
            }
        }

        let previous = self.selected_index;
        self.should_exit = event_handler::handle_keyboard_event(
            key_event,
            &mut self.command_input,
            &mut self.status,
            &mut self.selected_index,
            &self.processes,
            &self.op_tx,
        );
        if previous != self.selected_index {
            self.detail.scroll_to_top();
        }
    }

    fn selected(&self) -> Option<&Process> {
        self.processes.get(self.selected_index)
    }

    fn render(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Percentage(45),
                Constraint::Min(6),
                Constraint::Length(3),
            ])
            .split(frame.area());

        let title = format!("{} - Processes", view_title(self.role));
        render_dashboard(frame, chunks[0], &title, &self.processes, self.selected_index);
        self.detail.render(frame, chunks[1], self.selected());
        self.render_command_input(frame, chunks[2]);
    }

    fn render_command_input(&self, frame: &mut Frame, area: Rect) {
        let title = match &self.status {
            Some(status) => format!("Command - {status}"),
            None => "Command (/run, /cancel, /done, /remove; q to quit)".to_string(),
        };
        let style = if self.status.is_some() {
            Style::default().fg(Color::Red)
        } else {
            Style::default().fg(Color::Yellow)
        };

        let paragraph = Paragraph::new(format!("> {}", self.command_input))
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(style);
        frame.render_widget(paragraph, area);
    }
}

fn view_title(role: ViewRole) -> &'static str {
    match role {
        ViewRole::Home => "Home",
        ViewRole::Monitor => "Monitor",
    }
}

/// Mount `role` for the project at `root` and run it in the terminal.
///
/// Loads `.enrich-kit/`, persists view state under the configured storage
/// directory and talks to the configured backend. Returns once the operator
/// quits; every channel and timer of the view is closed by then.
pub async fn run_app(role: ViewRole, root: &Path) -> Result<()> {
    let config = load_config(root).await?;
    let store = FileStore::open(config.storage_dir(root))?;
    let backend = HttpBackend::new(&config.global.backend)?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let session = ViewSession::mount(
        role,
        config.session_settings(),
        Arc::new(backend),
        Arc::new(store),
        events_tx,
    );
    info!(view = %role, root = %root.display(), "view mounted");

    let (op_tx, mut op_rx) = mpsc::unbounded_channel::<Op>();
    let forward = session.clone();
    tokio::spawn(async move {
        while let Some(op) = op_rx.recv().await {
            if forward.apply_op(op).is_err() {
                break;
            }
        }
    });

    let mut tui = Tui::init()?;
    let mut app = App::new(role, op_tx, events_rx);
    let result = app.run(&mut tui).await;
    tui.restore()?;

    tokio::time::timeout(Duration::from_secs(2), session.shutdown())
        .await
        .ok();
    result
}
