//! # ek-protocol
//!
//! Core protocol definitions and data models for enrich-kit.
//!
//! This crate defines all shared data structures used for:
//! - Configuration file parsing (TOML config, Markdown prompt overrides)
//! - The persisted process records both views read and write
//! - Messages pushed by the backend on a process's progress channel
//! - Communication between a view front-end and its session core
//!
//! ## Modules
//!
//! - [`channel_models`]: Push-channel messages
//! - [`config_models`]: Global configuration from config.toml
//! - [`ipc`]: Operations and Events between front-end and session
//! - [`job_models`]: Job submission, history and shared process records
//! - [`process_models`]: Process records, step catalogue, view roles
//! - [`prompt_models`]: Prompt override definitions
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, uuid and chrono
//! - TypeScript generation: All types derive `TS` for the browser front-end
//! - Independent compilation: No dependencies on other enrich-kit crates

pub mod channel_models;
pub mod config_models;
pub mod ipc;
pub mod job_models;
pub mod process_models;
pub mod prompt_models;

// Re-export all public types for convenience
pub use channel_models::*;
pub use config_models::*;
pub use ipc::*;
pub use job_models::*;
pub use process_models::*;
pub use prompt_models::*;
