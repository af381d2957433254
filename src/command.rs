//! Edit targets and reversible editor commands.
//!
//! This module defines the core abstractions of the undo engine:
//!
//! - [`EditTarget`] — marker trait for documents that commands operate on
//! - [`EditCommand`] — a reversible edit operation (Command pattern)
//! - [`CommandError`] / [`CommandResult`] — error handling for commands
//! - [`CommandGroup`] — a sequence of commands applied and undone as one unit
//!
//! Commands are self-contained: each implementation internally stores whatever
//! data it needs to revert and replay its effect (cel indices, old/new pixel
//! runs, palette entries, etc.). The history never applies a command's initial
//! forward effect — callers do that before recording it.

use std::any::Any;
use std::fmt;

/// Helper trait for downcasting trait objects to concrete types.
///
/// Automatically implemented for all `'static` types. Used by
/// [`EditCommand::merge`] to downcast `&dyn EditCommand<T>` to the
/// concrete command type before coalescing.
pub trait AsAny: 'static {
    /// Returns a reference to `self` as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Marker trait for types that serve as editing targets.
///
/// Implement this on whatever a history tracks edits of — a sprite, a
/// palette, a whole document.
///
/// # Example
///
/// ```ignore
/// struct Sprite { /* ... */ }
/// impl EditTarget for Sprite {}
/// ```
pub trait EditTarget: 'static {}

/// Error type for command execution failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The object the command refers to no longer exists.
    TargetNotFound(String),
    /// The target is in an invalid state for this command.
    InvalidState(String),
    /// A custom error with a description.
    Custom(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetNotFound(msg) => write!(f, "target not found: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Result type for command operations.
pub type CommandResult<T = ()> = Result<T, CommandError>;

/// A reversible editor command (Command pattern).
///
/// A command encapsulates a single logical edit and captures enough state to
/// undo the change and apply it again. `apply` and `undo` must be
/// effect-symmetric: running one and then the other leaves the target
/// bit-identical to its state before the pair of calls. Neither is expected
/// to behave correctly when called out of sequence — the
/// [`UndoHistory`](crate::history::UndoHistory) guarantees correct ordering.
///
/// Once recorded, the history exclusively owns the command; resources held by
/// the command are released by `Drop` exactly once, when the owning history
/// state is destroyed.
///
/// # Merging
///
/// Commands that represent incremental changes (e.g. each pixel of a brush
/// drag) can override [`merge`](Self::merge) so that consecutive commands
/// coalesce into one undo step. Use [`AsAny::as_any`] on the `other`
/// command to downcast it to the concrete type.
///
/// # Object Safety
///
/// This trait is dyn-compatible so that different command types can be stored
/// in a single [`UndoHistory`](crate::history::UndoHistory) as
/// `Box<dyn EditCommand<T>>`.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug)]
/// struct SetOpacity {
///     layer: LayerId,
///     old: u8,
///     new: u8,
/// }
///
/// impl EditCommand<Sprite> for SetOpacity {
///     fn apply(&mut self, target: &mut Sprite) -> CommandResult {
///         target.layer_mut(self.layer)?.opacity = self.new;
///         Ok(())
///     }
///
///     fn undo(&mut self, target: &mut Sprite) -> CommandResult {
///         target.layer_mut(self.layer)?.opacity = self.old;
///         Ok(())
///     }
///
///     fn label(&self) -> &str {
///         "Layer Opacity"
///     }
/// }
/// ```
pub trait EditCommand<T: EditTarget>: fmt::Debug + AsAny + Send {
    /// Applies the command to the target (forward / redo direction).
    ///
    /// Returns `Ok(())` on success, or a [`CommandError`] if the command
    /// could not be applied.
    fn apply(&mut self, target: &mut T) -> CommandResult;

    /// Reverses the command (undo direction).
    ///
    /// Must restore the target to the state before [`apply`](Self::apply)
    /// was called.
    fn undo(&mut self, target: &mut T) -> CommandResult;

    /// A short, human-readable label for display in the edit menu and the
    /// history panel.
    ///
    /// Examples: `"Brush Stroke"`, `"Flip Horizontal"`, `"Remap Palette"`.
    fn label(&self) -> &str;

    /// Approximate memory held by this command, in bytes.
    ///
    /// Used by the history's size budget to decide when old states are
    /// evicted. The default reports only the shallow struct size; commands
    /// holding buffers (pixel runs, image backups) should add their heap
    /// payload.
    fn approx_size(&self) -> usize {
        std::mem::size_of_val(self)
    }

    /// Tries to merge `other` into `self`, taking ownership.
    ///
    /// If the commands are compatible (e.g. consecutive strokes of the same
    /// drag), `self` absorbs `other`'s effect and returns `None` (the other
    /// command is consumed). Otherwise returns `Some(other)` back to the
    /// caller.
    ///
    /// Returns `Some(other)` by default (no merging).
    ///
    /// Use [`AsAny::as_any`] on `other` to downcast to the concrete type:
    ///
    /// ```ignore
    /// fn merge(
    ///     &mut self,
    ///     other: Box<dyn EditCommand<Sprite>>,
    /// ) -> Option<Box<dyn EditCommand<Sprite>>> {
    ///     if let Some(other) = other.as_any().downcast_ref::<Self>() {
    ///         // absorb other's data into self
    ///         return None; // consumed
    ///     }
    ///     Some(other) // not mergeable, return it back
    /// }
    /// ```
    fn merge(&mut self, other: Box<dyn EditCommand<T>>) -> Option<Box<dyn EditCommand<T>>> {
        Some(other)
    }
}

/// A sequence of commands recorded as a single undo step.
///
/// Used by [`Transaction`](crate::transaction::Transaction) to make a
/// multi-part operation (e.g. "crop sprite" = resize + shift cels + trim
/// mask) atomic from the user's point of view: one undo reverts all of it.
///
/// `apply` runs the commands in submission order; `undo` reverses them back
/// to front. If `apply` fails partway, the already-applied prefix is rolled
/// back before the error is returned.
pub struct CommandGroup<T: EditTarget> {
    label: String,
    commands: Vec<Box<dyn EditCommand<T>>>,
}

impl<T: EditTarget> CommandGroup<T> {
    /// Creates an empty group with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    /// Appends a command to the group.
    pub fn push(&mut self, cmd: Box<dyn EditCommand<T>>) {
        self.commands.push(cmd);
    }

    /// Returns the number of commands in the group.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if the group contains no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<T: EditTarget> fmt::Debug for CommandGroup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandGroup")
            .field("label", &self.label)
            .field("commands", &self.commands.len())
            .finish()
    }
}

impl<T: EditTarget> EditCommand<T> for CommandGroup<T> {
    fn apply(&mut self, target: &mut T) -> CommandResult {
        for i in 0..self.commands.len() {
            if let Err(err) = self.commands[i].apply(target) {
                // Roll back the applied prefix so the target is left where
                // it started.
                for cmd in self.commands[..i].iter_mut().rev() {
                    if let Err(rollback_err) = cmd.undo(target) {
                        log::warn!(
                            "rollback of '{}' failed after partial group apply: {rollback_err}",
                            cmd.label()
                        );
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn undo(&mut self, target: &mut T) -> CommandResult {
        for cmd in self.commands.iter_mut().rev() {
            cmd.undo(target)?;
        }
        Ok(())
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn approx_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.label.len()
            + self.commands.iter().map(|c| c.approx_size()).sum::<usize>()
    }
}
