//! Ordered queue of voice-stream lifecycle items.
//!
//! At most one voice session is open for writing at a time; items already
//! queued for an earlier, closed session keep draining in FIFO order. For a
//! given id the consumer always observes `Start, Data*, (End | Cancelled)`,
//! after which the id is absent from the queue.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

use super::types::VoiceOptions;

/// Option bundles attached to a voice start.
#[derive(Debug, Clone, Default)]
pub struct StartArgs {
    pub framework: Option<VoiceOptions>,
    pub skill: Option<VoiceOptions>,
}

/// One item popped from the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Start(i32),
    Data(i32, Bytes),
    End(i32),
    Cancelled(i32),
}

impl QueueItem {
    pub fn id(&self) -> i32 {
        match *self {
            QueueItem::Start(id)
            | QueueItem::Data(id, _)
            | QueueItem::End(id)
            | QueueItem::Cancelled(id) => id,
        }
    }
}

#[derive(Debug, Default)]
pub struct VoiceStreamQueue {
    items: VecDeque<QueueItem>,
    /// Session currently accepting data, if any.
    open: Option<i32>,
    args: HashMap<i32, StartArgs>,
    closed: bool,
}

impl VoiceStreamQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the write slot for `id`. Fails while another session is open
    /// or after `close`.
    pub fn start(&mut self, id: i32) -> bool {
        if self.closed || self.open.is_some() {
            return false;
        }
        self.open = Some(id);
        self.items.push_back(QueueItem::Start(id));
        true
    }

    pub fn set_arg(&mut self, id: i32, args: StartArgs) -> bool {
        if self.open != Some(id) {
            return false;
        }
        self.args.insert(id, args);
        true
    }

    pub fn get_arg(&self, id: i32) -> Option<StartArgs> {
        self.args.get(&id).cloned()
    }

    /// Appends an audio chunk; fails unless `id` is the open session.
    pub fn stream(&mut self, id: i32, chunk: Bytes) -> bool {
        if self.closed || self.open != Some(id) {
            return false;
        }
        self.items.push_back(QueueItem::Data(id, chunk));
        true
    }

    /// Appends the end sentinel and closes `id` for writing.
    pub fn end(&mut self, id: i32) -> bool {
        if self.closed || self.open != Some(id) {
            return false;
        }
        self.items.push_back(QueueItem::End(id));
        self.open = None;
        true
    }

    /// Cancels `id`: drops its pending items and enqueues a cancel sentinel.
    /// Returns false when the queue holds nothing for `id`.
    pub fn erase(&mut self, id: i32) -> bool {
        let known = self.open == Some(id) || self.items.iter().any(|item| item.id() == id);
        if self.closed || !known {
            return false;
        }
        self.items.retain(|item| item.id() != id);
        self.items.push_back(QueueItem::Cancelled(id));
        if self.open == Some(id) {
            self.open = None;
        }
        true
    }

    /// Cancels every queued session. Returns the (min, max) cancelled ids.
    pub fn clear(&mut self) -> Option<(i32, i32)> {
        if self.closed {
            return None;
        }
        let mut ids: Vec<i32> = self.items.iter().map(QueueItem::id).collect();
        if let Some(open) = self.open {
            ids.push(open);
        }
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return None;
        }
        self.items.clear();
        for &id in &ids {
            self.items.push_back(QueueItem::Cancelled(id));
        }
        self.open = None;
        Some((ids[0], ids[ids.len() - 1]))
    }

    /// Next item in insertion order without consuming it.
    pub fn peek(&self) -> Option<&QueueItem> {
        if self.closed {
            return None;
        }
        self.items.front()
    }

    /// Pops the next item in insertion order. `None` when empty or closed.
    pub fn pop(&mut self) -> Option<QueueItem> {
        if self.closed {
            return None;
        }
        let item = self.items.pop_front()?;
        if matches!(item, QueueItem::End(_) | QueueItem::Cancelled(_)) {
            self.args.remove(&item.id());
        }
        Some(item)
    }

    /// After close every pop returns `None` and every producer call fails.
    pub fn close(&mut self) {
        self.closed = true;
        self.open = None;
        self.items.clear();
        self.args.clear();
    }
}
