//! Completion Reconciler.
//!
//! Guarantees that every process eventually reaches a terminal state and
//! that both views agree on it:
//! - [`grace`]: forces completion when progress sits at 100% but no
//!   terminal message arrives within the grace period
//! - [`peer`]: polls the peer view's registry and the discovery mailbox to
//!   adopt terminal states and pick up processes started elsewhere

pub mod grace;
pub mod peer;

pub use grace::GraceTimers;
pub use peer::{PeerFinding, PeerWatcher};
