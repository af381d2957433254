//! # Ochre History
//!
//! Branching undo/redo history engine for the Ochre pixel editor.
//!
//! Every document owns one [`UndoHistory`], a tree of recorded
//! [`EditCommand`]s. Besides plain undo/redo it supports branches (a new
//! edit made mid-history keeps the abandoned redo path reachable),
//! navigation to any recorded state, command merging, atomic transactions,
//! save-point tracking, and bounded retention.
//!
//! - [`EditTarget`] — marker trait for documents that commands edit
//! - [`EditCommand`] — a reversible edit operation (Command pattern)
//! - [`UndoHistory`] — the branching undo/redo tree
//! - [`Transaction`] — groups several commands into one atomic undo step
//! - [`CommandQueue`] — thread-safe queue for submitting commands from
//!   read-only contexts
//!
//! The history records history: callers apply a command's forward effect
//! to the document first, then [`add`](UndoHistory::add) it. Undo and redo
//! run the recorded commands against the document in the right order, and
//! never move the current position past a failing command.

pub mod command;
pub mod history;
pub mod queue;
pub mod transaction;

pub use command::{AsAny, CommandError, CommandGroup, CommandResult, EditCommand, EditTarget};
pub use history::{
    DEFAULT_MAX_BYTES, DEFAULT_MAX_STATES, HistoryError, HistoryLimits, HistoryResult, StateId,
    UndoHistory, UndoState,
};
pub use queue::CommandQueue;
pub use transaction::Transaction;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
