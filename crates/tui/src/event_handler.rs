//! Event handling utilities for the TUI.
//!
//! This module provides functions for handling different types of events:
//! - Core events (from the view session)
//! - Keyboard events (user input)
//! - Command parsing and submission

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ek_protocol::{Event, Op, Process, StepName};
use std::str::FromStr;
use tokio::sync::mpsc::UnboundedSender;

/// Fold an event from the session into the displayed process list.
///
/// Notifications replace the status line.
pub fn handle_core_event(processes: &mut Vec<Process>, status: &mut Option<String>, event: Event) {
    match event {
        Event::ProcessStarted { process }
        | Event::ProcessDiscovered { process }
        | Event::ProcessUpdated { process }
        | Event::ProcessCompleted { process } => upsert(processes, process),
        Event::ProcessCancelled { process_id } => {
            if let Some(process) = processes.iter_mut().find(|p| p.id == process_id) {
                process.is_active = false;
                process.is_cancelled = true;
            }
        }
        Event::ProcessFailed { process_id, error } => {
            if let Some(process) = processes.iter_mut().find(|p| p.id == process_id) {
                process.is_active = false;
                process.error = Some(error);
            }
        }
        Event::ProcessRemoved { process_id } => {
            processes.retain(|p| p.id != process_id);
        }
        Event::Notification { message } => {
            *status = Some(message);
        }
        Event::DashboardState { processes: snapshot } => {
            *processes = snapshot;
        }
    }
}

fn upsert(processes: &mut Vec<Process>, process: Process) {
    match processes.iter_mut().find(|p| p.id == process.id) {
        Some(existing) => *existing = process,
        None => processes.push(process),
    }
}

/// Handle a keyboard event from the user.
///
/// Returns `true` if the application should exit, `false` otherwise.
pub fn handle_keyboard_event(
    key_event: KeyEvent,
    command_input: &mut String,
    status: &mut Option<String>,
    selected_index: &mut usize,
    processes: &[Process],
    op_tx: &UnboundedSender<Op>,
) -> bool {
    if key_event.kind != KeyEventKind::Press {
        return false;
    }

    match key_event.code {
        KeyCode::Char('q') if command_input.is_empty() => {
            return true;
        }
        KeyCode::Esc => {
            command_input.clear();
        }
        KeyCode::Up => {
            *selected_index = selected_index.saturating_sub(1);
        }
        KeyCode::Down => {
            if *selected_index < processes.len().saturating_sub(1) {
                *selected_index += 1;
            }
        }
        KeyCode::Char(c) => {
            command_input.push(c);
        }
        KeyCode::Backspace => {
            command_input.pop();
        }
        KeyCode::Enter => {
            match parse_command(command_input, processes.get(*selected_index)) {
                Ok(op) => {
                    let _ = op_tx.send(op);
                    *status = None;
                }
                Err(message) => *status = Some(message),
            }
            command_input.clear();
        }
        _ => {}
    }

    false
}

/// Parse a slash command into an operation.
///
/// Supported commands:
/// - `/run <step> <sheet-id> [sheet name]`
/// - `/cancel`, `/done`, `/remove` on the selected process
///
/// # Errors
///
/// A message for the status line when the command is malformed.
pub fn parse_command(input: &str, selected: Option<&Process>) -> Result<Op, String> {
    let mut parts = input.split_whitespace();
    let Some(command) = parts.next() else {
        return Err("type a command, e.g. /run ai-data <sheet-id>".to_string());
    };

    let selected_id = || {
        selected
            .map(|process| process.id)
            .ok_or_else(|| "no process selected".to_string())
    };

    match command {
        "/run" => {
            let step = parts
                .next()
                .ok_or_else(|| "usage: /run <step> <sheet-id> [sheet name]".to_string())?;
            let step = StepName::from_str(step).map_err(|e| e.to_string())?;
            let sheet_id = parts
                .next()
                .ok_or_else(|| "usage: /run <step> <sheet-id> [sheet name]".to_string())?;
            let sheet_name = parts.collect::<Vec<_>>().join(" ");

            Ok(Op::LaunchJob {
                sheet_id: sheet_id.to_string(),
                step,
                sheet_name: (!sheet_name.is_empty()).then_some(sheet_name),
                prompt_override: None,
            })
        }
        "/cancel" => Ok(Op::CancelProcess {
            process_id: selected_id()?,
        }),
        "/done" => Ok(Op::MarkCompleted {
            process_id: selected_id()?,
        }),
        "/remove" => Ok(Op::RemoveProcess {
            process_id: selected_id()?,
        }),
        other => Err(format!("unknown command: {other}")),
    }
}
