//! Thread-safe queue for submitting commands from read-only contexts.
//!
//! [`CommandQueue`] uses interior mutability ([`Mutex`]) so that code with
//! only shared `&self` access — tool event handlers, timeline callbacks —
//! can still hand commands to the document thread. The editor drains the
//! queue once per frame and records the commands through
//! [`UndoHistory`](crate::history::UndoHistory).

use std::fmt;
use std::sync::Mutex;

use crate::command::{EditCommand, EditTarget};

/// A thread-safe queue of pending [`EditCommand`]s.
///
/// Because the inner storage is wrapped in a [`Mutex`],
/// [`push()`](Self::push) only requires `&self`. Draining returns the
/// commands in submission order; applying and recording them stays the
/// document thread's job.
pub struct CommandQueue<T: EditTarget> {
    queue: Mutex<Vec<Box<dyn EditCommand<T>>>>,
}

impl<T: EditTarget> CommandQueue<T> {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Enqueues a command. Callable from `&self` thanks to interior
    /// mutability.
    pub fn push(&self, cmd: Box<dyn EditCommand<T>>) {
        self.queue.lock().unwrap().push(cmd);
    }

    /// Drains all queued commands, returning them in submission order.
    pub fn drain(&self) -> Vec<Box<dyn EditCommand<T>>> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }

    /// Returns the number of pending commands.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Returns `true` if there are no pending commands.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

impl<T: EditTarget> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EditTarget> fmt::Debug for CommandQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.queue.lock().unwrap().len();
        f.debug_struct("CommandQueue").field("pending", &len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandResult;

    struct Canvas {
        pixels: Vec<u8>,
    }

    impl EditTarget for Canvas {}

    #[derive(Debug)]
    struct Paint {
        index: usize,
        old: u8,
        new: u8,
    }

    impl EditCommand<Canvas> for Paint {
        fn apply(&mut self, target: &mut Canvas) -> CommandResult {
            target.pixels[self.index] = self.new;
            Ok(())
        }

        fn undo(&mut self, target: &mut Canvas) -> CommandResult {
            target.pixels[self.index] = self.old;
            Ok(())
        }

        fn label(&self) -> &str {
            "Paint"
        }
    }

    #[test]
    fn push_and_drain() {
        let queue = CommandQueue::<Canvas>::new();
        queue.push(Box::new(Paint {
            index: 0,
            old: 0,
            new: 1,
        }));
        queue.push(Box::new(Paint {
            index: 1,
            old: 0,
            new: 2,
        }));

        let commands = queue.drain();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].label(), "Paint");
    }

    #[test]
    fn drain_empties_queue() {
        let queue = CommandQueue::<Canvas>::new();
        queue.push(Box::new(Paint {
            index: 0,
            old: 0,
            new: 1,
        }));
        let _ = queue.drain();
        assert!(queue.is_empty());
        assert_eq!(queue.drain().len(), 0);
    }

    #[test]
    fn len_and_is_empty_reflect_state() {
        let queue = CommandQueue::<Canvas>::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        queue.push(Box::new(Paint {
            index: 0,
            old: 0,
            new: 1,
        }));
        assert!(!queue.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn preserves_submission_order() {
        let queue = CommandQueue::<Canvas>::new();
        for i in 0..3usize {
            queue.push(Box::new(Paint {
                index: i,
                old: 0,
                new: (i + 1) as u8,
            }));
        }

        let mut canvas = Canvas {
            pixels: vec![0; 4],
        };
        for mut cmd in queue.drain() {
            cmd.apply(&mut canvas).unwrap();
        }
        assert_eq!(canvas.pixels, vec![1, 2, 3, 0]);
    }

    #[test]
    fn debug_impl() {
        let queue = CommandQueue::<Canvas>::new();
        queue.push(Box::new(Paint {
            index: 0,
            old: 0,
            new: 1,
        }));
        let debug = format!("{queue:?}");
        assert!(debug.contains("CommandQueue"));
        assert!(debug.contains("pending"));
    }
}
