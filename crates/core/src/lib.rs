//! # ek-core
//!
//! Process tracking core for enrich-kit.
//!
//! This crate provides:
//! - Configuration loading from the `.enrich-kit/` directory
//! - Durable key-value storage shared by the two views
//! - The per-view Process Registry and its state machine
//! - The Progress Channel Adapter over the backend's push channel
//! - The Completion Reconciler (grace period, peer polling)
//! - The view session actor tying them together
//!
//! ## Modules
//!
//! - [`backend`]: Backend trait plus HTTP and in-memory implementations
//! - [`channel`]: Push connections and elapsed-time tickers
//! - [`config`]: Configuration loading and management
//! - [`engine`]: View session actor
//! - [`reconcile`]: Grace timers and cross-view polling
//! - [`state`]: Process state machine, registry and session handle
//! - [`store`]: Key-value storage

pub mod backend;
pub mod channel;
pub mod config;
pub mod engine;
pub mod reconcile;
pub mod state;
pub mod store;
