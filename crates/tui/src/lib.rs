//! # ek-tui
//!
//! Terminal User Interface for enrich-kit.
//!
//! This crate renders one view (Home or Monitor) in the terminal. It talks
//! to the view session in `ek-core` over channels using the `Op` and `Event`
//! protocol defined in `ek-protocol`.

pub mod app;
pub mod event_handler;
pub mod tui;
pub mod widgets;

pub use app::{run_app, App};
pub use tui::Tui;
