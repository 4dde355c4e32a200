//! TUI widgets module.
//!
//! This module contains the widgets a view is drawn from.

pub mod dashboard;
pub mod detail_view;

pub use detail_view::DetailView;
