//! Single-slot controller for the operation in flight.
//!
//! The controller is deliberately not a queue: the send worker blocks after
//! the last frame of a request until the slot drains through `poll`, which
//! serializes operations and keeps response ordering trivial.

use std::time::{Duration, Instant};

use super::error::SpeechError;

/// Inactivity budget before an operation is failed with `Timeout`.
pub const DEFAULT_OP_BUDGET: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// Installed, no response seen yet.
    Start,
    /// At least one response frame received.
    Streaming,
    /// Server sent the final frame.
    End,
    Cancelled,
    Error,
}

impl OpStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OpStatus::End | OpStatus::Cancelled | OpStatus::Error)
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub id: i32,
    pub status: OpStatus,
    pub error: Option<SpeechError>,
}

#[derive(Debug)]
pub struct OperationController {
    op: Option<Operation>,
    last_activity: Instant,
    budget: Duration,
}

impl OperationController {
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_OP_BUDGET)
    }

    pub fn with_budget(budget: Duration) -> Self {
        Self {
            op: None,
            last_activity: Instant::now(),
            budget,
        }
    }

    /// Installs a new operation. The caller must have verified the slot is
    /// empty; a leftover operation would break response ordering.
    pub fn new_op(&mut self, id: i32, status: OpStatus) {
        debug_assert!(self.op.is_none(), "operation slot not drained");
        self.op = Some(Operation {
            id,
            status,
            error: None,
        });
        self.last_activity = Instant::now();
    }

    pub fn current_op(&self) -> Option<&Operation> {
        self.op.as_ref()
    }

    pub fn current_op_mut(&mut self) -> Option<&mut Operation> {
        self.op.as_mut()
    }

    pub fn has_op(&self) -> bool {
        self.op.is_some()
    }

    /// Empties the slot. Called once the terminal result has been surfaced
    /// through `poll`.
    pub fn remove_op(&mut self) {
        self.op = None;
    }

    /// Marks the current operation finished (server sent its final frame).
    /// A terminal status already in place is left untouched.
    pub fn finish_op(&mut self) {
        if let Some(op) = &mut self.op
            && !op.status.is_terminal()
        {
            op.status = OpStatus::End;
        }
    }

    /// Cancels the current operation when `id` matches it, or
    /// unconditionally when `id` is 0. Returns whether a transition happened.
    pub fn cancel_op(&mut self, id: i32) -> bool {
        if let Some(op) = &mut self.op
            && (id == 0 || op.id == id)
            && !op.status.is_terminal()
        {
            op.status = OpStatus::Cancelled;
            return true;
        }
        false
    }

    /// Fails the current operation. Returns whether a transition happened.
    pub fn set_op_error(&mut self, error: SpeechError) -> bool {
        if let Some(op) = &mut self.op
            && !op.status.is_terminal()
        {
            op.status = OpStatus::Error;
            op.error = Some(error);
            return true;
        }
        false
    }

    /// True while `id` is the operation in flight and not yet terminal.
    /// Backs the send worker's wait between operations.
    pub fn is_op_active(&self, id: i32) -> bool {
        matches!(&self.op, Some(op) if op.id == id && !op.status.is_terminal())
    }

    /// Time remaining before the live operation times out. With no live
    /// operation the full budget is returned so the receiver wakes up
    /// periodically instead of parking forever.
    pub fn op_timeout(&self) -> Duration {
        match &self.op {
            Some(op) if !op.status.is_terminal() => {
                let deadline = self.last_activity + self.budget;
                deadline.saturating_duration_since(Instant::now())
            }
            _ => self.budget,
        }
    }

    /// Resets the inactivity clock; called when a frame is sent or received.
    pub fn refresh_op_time(&mut self) {
        self.last_activity = Instant::now();
    }
}

impl Default for OperationController {
    fn default() -> Self {
        Self::new()
    }
}
