//! Operator command queue.
//!
//! The protocol is pull-based: a command cannot be pushed to the
//! extension outside a reply cycle. Queued commands are therefore
//! delivered FIFO, one per outbound reply of any kind.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::models::message::ExtensionCommand;

/// FIFO queue of pending operator commands.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Mutex<VecDeque<ExtensionCommand>>,
}

impl CommandQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command for delivery on the next reply.
    pub fn push(&self, command: ExtensionCommand) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(command);
    }

    /// Pop the oldest pending command, if any.
    pub fn take(&self) -> Option<ExtensionCommand> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Number of commands awaiting delivery.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no commands are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
