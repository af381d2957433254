//! Branching undo/redo history tree.
//!
//! [`UndoHistory`] records applied [`EditCommand`]s as a tree of states.
//! The path from the root to the current state is the classic undo stack;
//! everything else is redo material. When a new edit is made from a
//! mid-history state, the abandoned forward path is either kept as a branch
//! (the default) or discarded like a conventional linear history, depending
//! on [`set_create_branches`](UndoHistory::set_create_branches).
//!
//! States live in a slab-style arena and are addressed by [`StateId`], a
//! slot index paired with an allocation tick (the same scheme the engine
//! uses for entity handles). Pruning a branch removes its arena entries, so
//! a stale id simply fails to resolve — there are no dangling links.
//!
//! The history records history; it does not execute. Callers apply a
//! command's forward effect first and then [`add`](UndoHistory::add) it.
//!
//! # Example
//!
//! ```ignore
//! let mut history = UndoHistory::new();
//! let mut sprite = Sprite::new(32, 32);
//!
//! // The edit is applied by the tool, then recorded.
//! let mut cmd = Box::new(BrushStroke::new(/* ... */));
//! cmd.apply(&mut sprite)?;
//! history.add(cmd);
//!
//! history.undo(&mut sprite)?;
//! history.redo(&mut sprite)?;
//! ```

use std::fmt;

use crate::command::{CommandError, EditCommand, EditTarget};

/// Default maximum number of retained states.
pub const DEFAULT_MAX_STATES: usize = 100;

/// Default memory budget for retained commands, in bytes.
pub const DEFAULT_MAX_BYTES: usize = 1024 * 1024;

/// Error type for history operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// `undo` was called with no command applied.
    NothingToUndo,
    /// `redo` was called with no forward state on the selected branch.
    NothingToRedo,
    /// A [`StateId`] refers to a pruned or never-allocated state.
    UnknownState(StateId),
    /// A command failed while being undone or reapplied.
    Command(CommandError),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToUndo => write!(f, "nothing to undo"),
            Self::NothingToRedo => write!(f, "nothing to redo"),
            Self::UnknownState(id) => write!(f, "unknown history state {id:?}"),
            Self::Command(err) => write!(f, "command failed: {err}"),
        }
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Command(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CommandError> for HistoryError {
    fn from(err: CommandError) -> Self {
        Self::Command(err)
    }
}

/// Result type for history operations.
pub type HistoryResult<T = ()> = Result<T, HistoryError>;

/// Handle to a state in a [`UndoHistory`] arena.
///
/// Pairs a slot index with the allocation tick of the state that was placed
/// there, so a handle kept across pruning never resolves to an unrelated
/// state that happens to reuse the slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId {
    index: u32,
    tick: u64,
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateId({}:{})", self.index, self.tick)
    }
}

/// One recorded command, linked into the history tree.
///
/// - `prev` is the immediate predecessor on this node's own branch (`None`
///   only on the root).
/// - `next` is the *selected* successor: the state `redo` will move to. It
///   is a branch-selection pointer, repointed when another branch becomes
///   current; it is always one of `children`.
/// - `children` records every successor ever created from this state.
pub struct UndoState<T: EditTarget> {
    id: StateId,
    cmd: Box<dyn EditCommand<T>>,
    prev: Option<StateId>,
    next: Option<StateId>,
    children: Vec<StateId>,
}

impl<T: EditTarget> UndoState<T> {
    /// The id of this state.
    pub fn id(&self) -> StateId {
        self.id
    }

    /// The label of the recorded command.
    pub fn label(&self) -> &str {
        self.cmd.label()
    }

    /// The predecessor state on this branch.
    pub fn prev(&self) -> Option<StateId> {
        self.prev
    }

    /// The selected successor state, if any.
    pub fn next(&self) -> Option<StateId> {
        self.next
    }

    /// Every successor ever recorded from this state, oldest first.
    pub fn children(&self) -> &[StateId] {
        &self.children
    }
}

impl<T: EditTarget> fmt::Debug for UndoState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoState")
            .field("id", &self.id)
            .field("label", &self.cmd.label())
            .field("prev", &self.prev)
            .field("next", &self.next)
            .field("children", &self.children.len())
            .finish()
    }
}

/// Retention limits for a history.
///
/// `max_states` bounds the number of retained states; `max_bytes` bounds the
/// total [`approx_size`](EditCommand::approx_size) of retained commands
/// (`0` = unbounded). When a limit is exceeded the oldest states are evicted
/// from the root of the tree — see [`UndoHistory`] for the exact rules.
#[derive(Debug, Clone)]
pub struct HistoryLimits {
    /// Maximum number of retained states.
    pub max_states: usize,
    /// Maximum total command bytes; `0` disables the byte budget.
    pub max_bytes: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_states: DEFAULT_MAX_STATES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl HistoryLimits {
    /// Creates limits with the given bounds.
    pub fn new(max_states: usize, max_bytes: usize) -> Self {
        Self {
            max_states,
            max_bytes,
        }
    }

    /// Limits that never evict anything.
    pub fn unlimited() -> Self {
        Self {
            max_states: usize::MAX,
            max_bytes: 0,
        }
    }
}

/// Where the document was last saved, relative to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SavePoint {
    /// Saved at this position (`None` = before the first command).
    At(Option<StateId>),
    /// The save point was pruned or became unreachable.
    Lost,
}

/// A branching undo/redo history over an [`EditTarget`].
///
/// The history is mutated exclusively from the document-editing thread; it
/// provides no internal locking. Every operation is synchronous and leaves
/// the tree consistent even when a command fails: the current position is
/// never moved past a failing `undo`/`apply`.
///
/// # Positions
///
/// The current position is either a state or the *empty position* — before
/// the first command, when everything has been undone. [`can_undo`] is true
/// whenever a state is current; [`can_redo`] is true whenever the current
/// position has a selected forward state.
///
/// # Branching
///
/// With `create_branches` enabled (the default), an edit recorded from a
/// mid-history state opens a new branch and keeps the old forward path
/// reachable through [`jump_to`](Self::jump_to) and the states' children.
/// Disabled, the abandoned path is discarded, which is the conventional
/// linear undo model.
///
/// [`can_undo`]: Self::can_undo
/// [`can_redo`]: Self::can_redo
pub struct UndoHistory<T: EditTarget> {
    slots: Vec<Option<UndoState<T>>>,
    free: Vec<u32>,
    next_tick: u64,
    first: Option<StateId>,
    last: Option<StateId>,
    current: Option<StateId>,
    create_branches: bool,
    enabled: bool,
    limits: HistoryLimits,
    total_bytes: usize,
    live: usize,
    saved: SavePoint,
}

impl<T: EditTarget> UndoHistory<T> {
    /// Creates an empty history with [default](HistoryLimits::default) limits.
    pub fn new() -> Self {
        Self::with_limits(HistoryLimits::default())
    }

    /// Creates an empty history with the given retention limits.
    pub fn with_limits(limits: HistoryLimits) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_tick: 0,
            first: None,
            last: None,
            current: None,
            create_branches: true,
            enabled: true,
            limits,
            total_bytes: 0,
            live: 0,
            saved: SavePoint::At(None),
        }
    }

    /// The root state — the oldest retained command.
    pub fn first_state(&self) -> Option<StateId> {
        self.first
    }

    /// The tip of the most recently advanced branch.
    pub fn last_state(&self) -> Option<StateId> {
        self.last
    }

    /// The state whose command is currently applied to the document, or
    /// `None` at the empty position.
    pub fn current_state(&self) -> Option<StateId> {
        self.current
    }

    /// Looks up a state by id. Returns `None` for pruned or stale ids.
    pub fn state(&self, id: StateId) -> Option<&UndoState<T>> {
        self.slots
            .get(id.index as usize)
            .and_then(|slot| slot.as_ref())
            .filter(|state| state.id == id)
    }

    /// Returns `true` if there is a command whose effect can be reverted.
    pub fn can_undo(&self) -> bool {
        self.current.is_some()
    }

    /// Returns `true` if there is a forward state on the selected branch.
    pub fn can_redo(&self) -> bool {
        self.selected_next().is_some()
    }

    /// Whether a new edit from mid-history opens a branch (`true`) or
    /// discards the abandoned forward path (`false`).
    pub fn create_branches(&self) -> bool {
        self.create_branches
    }

    /// Sets the branching policy. Existing branches are not altered.
    pub fn set_create_branches(&mut self, create_branches: bool) {
        self.create_branches = create_branches;
    }

    /// Returns `true` if the history is recording commands.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables recording. While disabled, [`add`](Self::add)
    /// drops commands; undo/redo of already-recorded states still work.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// The retention limits in effect.
    pub fn limits(&self) -> &HistoryLimits {
        &self.limits
    }

    /// Number of retained states.
    pub fn state_count(&self) -> usize {
        self.live
    }

    /// Total approximate bytes held by retained commands.
    pub fn memory_usage(&self) -> usize {
        self.total_bytes
    }

    /// Reverts the current command and moves one step back.
    ///
    /// Fails with [`HistoryError::NothingToUndo`] at the empty position. If
    /// the command itself fails, the current position is unchanged and the
    /// error is propagated — the caller decides how to recover.
    pub fn undo(&mut self, target: &mut T) -> HistoryResult {
        let cur = self.current.ok_or(HistoryError::NothingToUndo)?;
        let Some(state) = self.node_mut(cur) else {
            return Err(HistoryError::UnknownState(cur));
        };
        let prev = state.prev;
        state.cmd.undo(target)?;
        log::trace!("undo '{}'", state.cmd.label());
        self.current = prev;
        Ok(())
    }

    /// Reapplies the selected forward command and moves one step forward.
    ///
    /// Fails with [`HistoryError::NothingToRedo`] when the selected branch
    /// has no forward state. If the command itself fails, the current
    /// position is unchanged and the error is propagated.
    pub fn redo(&mut self, target: &mut T) -> HistoryResult {
        let next = self.selected_next().ok_or(HistoryError::NothingToRedo)?;
        let Some(state) = self.node_mut(next) else {
            return Err(HistoryError::UnknownState(next));
        };
        state.cmd.apply(target)?;
        log::trace!("redo '{}'", state.cmd.label());
        self.current = Some(next);
        Ok(())
    }

    /// Records a command whose forward effect has already been applied.
    ///
    /// Takes ownership of the command and returns the id of the state now
    /// holding it, or `None` while recording is disabled. The command is
    /// first offered to the current state's command for
    /// [merging](EditCommand::merge); a merge returns the current state's id
    /// without creating a new state.
    ///
    /// From a mid-history position the abandoned forward path is kept as a
    /// branch or discarded according to
    /// [`set_create_branches`](Self::set_create_branches). From the empty
    /// position there is no state to branch from, so any existing tree is
    /// discarded and the new state becomes the root.
    pub fn add(&mut self, cmd: Box<dyn EditCommand<T>>) -> Option<StateId> {
        if !self.enabled {
            log::trace!("history disabled, dropping command '{}'", cmd.label());
            return None;
        }
        let mut cmd = cmd;

        // Conventional linear history: a new edit from mid-history discards
        // the abandoned forward path.
        if !self.create_branches && self.selected_next().is_some() {
            self.clear_redo();
        }

        // Only leaves may merge: a state with recorded branches must keep
        // its effect stable for them.
        if let Some(cur) = self.current
            && self.state(cur).is_some_and(|s| s.children.is_empty())
        {
            if let Some(state) = self.node_mut(cur) {
                let old_size = state.cmd.approx_size();
                match state.cmd.merge(cmd) {
                    None => {
                        let new_size = state.cmd.approx_size();
                        self.total_bytes =
                            self.total_bytes.saturating_sub(old_size) + new_size;
                        if self.saved == SavePoint::At(Some(cur)) {
                            self.saved = SavePoint::Lost;
                        }
                        self.enforce_limits();
                        return Some(cur);
                    }
                    Some(returned) => cmd = returned,
                }
            }
        }

        // A brand-new edit from before the first state has nothing to
        // branch from; the old tree is discarded wholesale.
        if self.current.is_none()
            && let Some(root) = self.first
        {
            log::debug!(
                "new edit from the empty position, dropping {} state(s)",
                self.live
            );
            self.prune_subtree(root);
            self.first = None;
            self.last = None;
        }

        let size = cmd.approx_size();
        let id = self.alloc(cmd, self.current);
        self.total_bytes += size;
        match self.current {
            Some(cur) => {
                if let Some(state) = self.node_mut(cur) {
                    state.children.push(id);
                    state.next = Some(id);
                }
            }
            None => self.first = Some(id),
        }
        self.current = Some(id);
        self.last = Some(id);
        self.enforce_limits();
        Some(id)
    }

    /// Prunes the selected forward subtree of the current position.
    ///
    /// The commands of the pruned states are dropped. Branches attached to
    /// states *behind* the current position are untouched. The current
    /// position becomes the tip of its branch. Idempotent.
    pub fn clear_redo(&mut self) {
        if let Some(next) = self.selected_next() {
            self.prune_subtree(next);
            match self.current {
                Some(cur) => {
                    if let Some(state) = self.node_mut(cur) {
                        state.next = None;
                        state.children.retain(|c| *c != next);
                    }
                }
                None => self.first = None,
            }
        }
        self.last = self.current;
    }

    /// Drops every state.
    ///
    /// The target is untouched: if the current position was the save point
    /// it still is; otherwise the save point is permanently lost.
    pub fn clear(&mut self) {
        let at_save_point = !self.has_unsaved_changes();
        if let Some(root) = self.first {
            self.prune_subtree(root);
        }
        self.first = None;
        self.last = None;
        self.current = None;
        self.saved = if at_save_point {
            SavePoint::At(None)
        } else {
            SavePoint::Lost
        };
    }

    /// Lowest common ancestor of two states, following `prev` links.
    ///
    /// Walks the deeper side up until both sides are level, then steps both
    /// up in lockstep until they meet. A state is its own ancestor, so the
    /// result may be `a` or `b` itself.
    pub fn find_common_parent(&self, a: StateId, b: StateId) -> HistoryResult<StateId> {
        let mut x = self.get(a)?.id;
        let mut y = self.get(b)?.id;
        let mut dx = self.depth(x);
        let mut dy = self.depth(y);
        while dx > dy {
            x = self.get(x)?.prev.ok_or(HistoryError::UnknownState(x))?;
            dx -= 1;
        }
        while dy > dx {
            y = self.get(y)?.prev.ok_or(HistoryError::UnknownState(y))?;
            dy -= 1;
        }
        while x != y {
            x = self.get(x)?.prev.ok_or(HistoryError::UnknownState(x))?;
            y = self.get(y)?.prev.ok_or(HistoryError::UnknownState(y))?;
        }
        Ok(x)
    }

    /// Navigates to an arbitrary state (`None` = the empty position).
    ///
    /// Undoes up to the common ancestor of the current position and the
    /// destination, then redoes down the destination's branch, repointing
    /// the branch-selection (`next`) pointers along the way — a later
    /// [`redo`](Self::redo) follows the destination's branch.
    ///
    /// If a command fails, navigation stops at the last consistent position
    /// and the error is propagated.
    pub fn jump_to(&mut self, dest: Option<StateId>, target: &mut T) -> HistoryResult {
        if let Some(d) = dest {
            self.get(d)?;
        }
        if dest == self.current {
            return Ok(());
        }
        let meet = match (self.current, dest) {
            (Some(c), Some(d)) => Some(self.find_common_parent(c, d)?),
            _ => None,
        };
        while self.current != meet {
            self.undo(target)?;
        }
        // Path from the destination back up to (excluding) the meeting
        // point, replayed in reverse.
        let mut path = Vec::new();
        let mut walk = dest;
        while walk != meet {
            match walk {
                Some(id) => {
                    path.push(id);
                    walk = self.get(id)?.prev;
                }
                None => break,
            }
        }
        for id in path.into_iter().rev() {
            if let Some(cur) = self.current
                && let Some(state) = self.node_mut(cur)
            {
                state.next = Some(id);
            }
            self.redo(target)?;
        }
        Ok(())
    }

    /// Label of the command the next [`undo`](Self::undo) would revert.
    pub fn undo_label(&self) -> Option<&str> {
        self.current.and_then(|id| self.state(id)).map(|s| s.label())
    }

    /// Label of the command the next [`redo`](Self::redo) would reapply.
    pub fn redo_label(&self) -> Option<&str> {
        self.selected_next()
            .and_then(|id| self.state(id))
            .map(|s| s.label())
    }

    /// Labels along the undo chain, most recent first.
    pub fn undo_labels(&self) -> impl Iterator<Item = &str> {
        std::iter::successors(self.current, |id| self.state(*id).and_then(|s| s.prev))
            .filter_map(|id| self.state(id).map(|s| s.label()))
    }

    /// Labels along the selected redo chain, nearest first.
    pub fn redo_labels(&self) -> impl Iterator<Item = &str> {
        std::iter::successors(self.selected_next(), |id| {
            self.state(*id).and_then(|s| s.next)
        })
        .filter_map(|id| self.state(id).map(|s| s.label()))
    }

    /// Records the current position as the saved state.
    pub fn mark_saved(&mut self) {
        self.saved = SavePoint::At(self.current);
    }

    /// Returns `true` if the current position differs from the last saved
    /// one, or if the save point has been pruned or was never recorded at
    /// this position.
    pub fn has_unsaved_changes(&self) -> bool {
        match self.saved {
            SavePoint::At(pos) => pos != self.current,
            SavePoint::Lost => true,
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    /// The selected forward state of the current position.
    fn selected_next(&self) -> Option<StateId> {
        match self.current {
            Some(cur) => self.state(cur).and_then(|s| s.next),
            None => self.first,
        }
    }

    fn get(&self, id: StateId) -> HistoryResult<&UndoState<T>> {
        self.state(id).ok_or(HistoryError::UnknownState(id))
    }

    fn node_mut(&mut self, id: StateId) -> Option<&mut UndoState<T>> {
        self.slots
            .get_mut(id.index as usize)
            .and_then(|slot| slot.as_mut())
            .filter(|state| state.id == id)
    }

    fn depth(&self, id: StateId) -> usize {
        std::iter::successors(Some(id), |i| self.state(*i).and_then(|s| s.prev)).count()
    }

    fn alloc(&mut self, cmd: Box<dyn EditCommand<T>>, prev: Option<StateId>) -> StateId {
        let tick = self.next_tick;
        self.next_tick += 1;
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(None);
                (self.slots.len() - 1) as u32
            }
        };
        let id = StateId { index, tick };
        self.slots[index as usize] = Some(UndoState {
            id,
            cmd,
            prev,
            next: None,
            children: Vec::new(),
        });
        self.live += 1;
        id
    }

    /// Removes a state from the arena, dropping its command.
    fn dispose(&mut self, id: StateId) {
        let idx = id.index as usize;
        let valid = self
            .slots
            .get(idx)
            .is_some_and(|slot| slot.as_ref().is_some_and(|state| state.id == id));
        if !valid {
            return;
        }
        if let Some(state) = self.slots[idx].take() {
            self.total_bytes = self.total_bytes.saturating_sub(state.cmd.approx_size());
            self.live -= 1;
            self.free.push(id.index);
            if self.saved == SavePoint::At(Some(id)) {
                self.saved = SavePoint::Lost;
            }
        }
    }

    fn prune_subtree(&mut self, root: StateId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(state) = self.state(id) {
                stack.extend(state.children.iter().copied());
            }
            self.dispose(id);
        }
    }

    /// Evicts oldest states while over budget.
    ///
    /// Eviction re-roots the tree to the root's only child, making the
    /// evicted command's effect permanent. It therefore only removes history
    /// strictly behind the current position, and never crosses a branch
    /// point — a root with several children is a shared ancestor of live
    /// branches and stops eviction.
    fn enforce_limits(&mut self) {
        loop {
            let over_states = self.live > self.limits.max_states;
            let over_bytes =
                self.limits.max_bytes > 0 && self.total_bytes > self.limits.max_bytes;
            if !over_states && !over_bytes {
                return;
            }
            let Some(root) = self.first else { return };
            if self.current.is_none() || self.current == Some(root) {
                return;
            }
            let child = match self.get(root).map(|s| s.children.as_slice()) {
                Ok([child]) => *child,
                _ => return,
            };
            // Undoing past the new root becomes impossible, so a save point
            // at the empty position is gone for good.
            if self.saved == SavePoint::At(None) {
                self.saved = SavePoint::Lost;
            }
            log::debug!(
                "evicting oldest state '{}'",
                self.state(root).map(|s| s.label()).unwrap_or_default()
            );
            self.dispose(root);
            if let Some(state) = self.node_mut(child) {
                state.prev = None;
            }
            self.first = Some(child);
        }
    }
}

impl<T: EditTarget> Default for UndoHistory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EditTarget> fmt::Debug for UndoHistory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoHistory")
            .field("states", &self.live)
            .field("first", &self.first)
            .field("last", &self.last)
            .field("current", &self.current)
            .field("create_branches", &self.create_branches)
            .field("enabled", &self.enabled)
            .field("total_bytes", &self.total_bytes)
            .finish()
    }
}
