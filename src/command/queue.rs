// src/command/queue.rs - FIFO of pending command tokens
use std::collections::VecDeque;
use thiserror::Error;

use super::CommandToken;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Command queue is empty")]
    EmptyQueue,
}

/// Pending commands in arrival order. Unbounded: a long program may be queued while an
/// earlier one is still running.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: VecDeque<CommandToken>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: CommandToken) {
        self.pending.push_back(token);
    }

    pub fn pop_front(&mut self) -> Result<CommandToken, QueueError> {
        self.pending.pop_front().ok_or(QueueError::EmptyQueue)
    }

    /// Drop everything pending. Returns how many tokens were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandToken> {
        self.pending.iter()
    }
}

impl Extend<CommandToken> for CommandQueue {
    fn extend<T: IntoIterator<Item = CommandToken>>(&mut self, iter: T) {
        self.pending.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> CommandToken {
        CommandToken::from_raw(s).unwrap()
    }

    #[test]
    fn pops_in_insertion_order() {
        let mut queue = CommandQueue::new();
        queue.push(token("S90"));
        queue.push(token("X10"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_front().unwrap(), token("S90"));
        assert_eq!(queue.pop_front().unwrap(), token("X10"));
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_on_empty_is_an_error() {
        let mut queue = CommandQueue::new();
        assert_eq!(queue.pop_front(), Err(QueueError::EmptyQueue));
    }

    #[test]
    fn clear_reports_discarded_count() {
        let mut queue = CommandQueue::new();
        queue.extend(["A1", "B2", "C3"].map(token));
        assert_eq!(queue.clear(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }
}
