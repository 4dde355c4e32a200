//! State management for enrichment processes.
//!
//! This module provides:
//! - Process state machine logic
//! - The per-view Process Registry
//! - SessionHandle for driving a mounted view session

pub mod manager;
pub mod process;
pub mod registry;
