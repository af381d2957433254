//! Atomic multi-command edits with commit/rollback.
//!
//! A [`Transaction`] groups a sequence of commands into one undo step. The
//! pattern is the classic editor one: open a transaction, run each part of
//! a compound operation through it, and [`commit`](Transaction::commit) at
//! the end. If the transaction is dropped without committing — an early
//! return, a failed step, a propagated error — every command already
//! applied is rolled back, so the document never keeps half an operation.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = Transaction::new(&mut history, &mut sprite, "Crop Sprite");
//! tx.execute(Box::new(ResizeCanvas::new(rect)))?;
//! tx.execute(Box::new(ShiftCels::new(rect.origin())))?;
//! tx.execute(Box::new(TrimMask::new(rect)))?;
//! tx.commit();
//! ```

use crate::command::{CommandGroup, CommandResult, EditCommand, EditTarget};
use crate::history::{StateId, UndoHistory};

/// An in-progress group of edits, recorded as a single undo step on commit
/// and rolled back on drop otherwise.
pub struct Transaction<'a, T: EditTarget> {
    history: &'a mut UndoHistory<T>,
    target: &'a mut T,
    label: String,
    commands: Vec<Box<dyn EditCommand<T>>>,
    committed: bool,
}

impl<'a, T: EditTarget> Transaction<'a, T> {
    /// Opens a transaction over the given history and target.
    ///
    /// `label` becomes the label of the recorded undo step.
    pub fn new(
        history: &'a mut UndoHistory<T>,
        target: &'a mut T,
        label: impl Into<String>,
    ) -> Self {
        Self {
            history,
            target,
            label: label.into(),
            commands: Vec::new(),
            committed: false,
        }
    }

    /// The label this transaction will be recorded under.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of commands applied so far.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no command has been applied yet.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Applies a command to the target and retains it for the group.
    ///
    /// If the command fails to apply it is not retained, and the commands
    /// applied so far stay pending — drop the transaction to roll them
    /// back, or keep going and commit what worked.
    pub fn execute(&mut self, mut cmd: Box<dyn EditCommand<T>>) -> CommandResult {
        cmd.apply(self.target)?;
        self.commands.push(cmd);
        Ok(())
    }

    /// Records the applied commands as one undo step.
    ///
    /// Returns the id of the new history state, or `None` if nothing was
    /// executed or the history is disabled.
    pub fn commit(mut self) -> Option<StateId> {
        self.committed = true;
        let commands = std::mem::take(&mut self.commands);
        if commands.is_empty() {
            return None;
        }
        let mut group = CommandGroup::new(std::mem::take(&mut self.label));
        for cmd in commands {
            group.push(cmd);
        }
        self.history.add(Box::new(group))
    }
}

impl<T: EditTarget> Drop for Transaction<'_, T> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // Uncommitted: revert what was applied, newest first. A failing
        // rollback cannot be propagated out of drop, so it is logged and
        // the remaining commands are still attempted.
        for cmd in self.commands.iter_mut().rev() {
            if let Err(err) = cmd.undo(self.target) {
                log::warn!(
                    "rollback of '{}' in transaction '{}' failed: {err}",
                    cmd.label(),
                    self.label
                );
            }
        }
    }
}
