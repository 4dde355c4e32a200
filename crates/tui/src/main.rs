//! Main entry point for the ek-tui binary.
//!
//! Runs one view against the project in the current directory:
//! `ek-tui [home|monitor]`.

use anyhow::{bail, Result};
use ek_protocol::ViewRole;
use ek_tui::run_app;

#[tokio::main]
async fn main() -> Result<()> {
    let role = match std::env::args().nth(1).as_deref() {
        None | Some("home") => ViewRole::Home,
        Some("monitor") => ViewRole::Monitor,
        Some(other) => bail!("unknown view '{other}', expected home or monitor"),
    };

    let root = std::env::current_dir()?;
    run_app(role, &root).await
}
