//! Common test utilities for the session integration tests.
//!
//! This module provides shared functionality across the tests including:
//! - A harness mounting views over one shared store and mock backend
//! - Custom assertions that wait for asynchronous state changes

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
