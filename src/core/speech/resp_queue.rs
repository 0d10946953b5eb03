//! Ordered queue of recognition results awaiting the poller.
//!
//! Mirror of the request-side stream queue: FIFO across ids, in order for a
//! single id. A server failure replaces an id's pending entries with a
//! single error sentinel.

use std::collections::VecDeque;

use crate::core::speech::protocol::SpeechResponse;

/// Text payload of one server result frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPayload {
    pub asr: String,
    pub nlp: String,
    pub action: String,
    pub extra: String,
}

impl From<&SpeechResponse> for ResultPayload {
    fn from(resp: &SpeechResponse) -> Self {
        Self {
            asr: resp.asr.clone(),
            nlp: resp.nlp.clone(),
            action: resp.action.clone(),
            extra: resp.extra.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RespItem {
    Start(i32),
    Intermediate(i32, ResultPayload),
    End(i32, ResultPayload),
    /// Server-reported failure; carries the raw result code.
    Error(i32, u32),
}

impl RespItem {
    pub fn id(&self) -> i32 {
        match *self {
            RespItem::Start(id)
            | RespItem::Intermediate(id, _)
            | RespItem::End(id, _)
            | RespItem::Error(id, _) => id,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResponseQueue {
    items: VecDeque<RespItem>,
    closed: bool,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, id: i32) {
        if !self.closed {
            self.items.push_back(RespItem::Start(id));
        }
    }

    pub fn stream(&mut self, id: i32, payload: ResultPayload) {
        if !self.closed {
            self.items.push_back(RespItem::Intermediate(id, payload));
        }
    }

    pub fn end(&mut self, id: i32, payload: ResultPayload) {
        if !self.closed {
            self.items.push_back(RespItem::End(id, payload));
        }
    }

    /// Drops everything pending for `id` and enqueues an error sentinel.
    pub fn erase(&mut self, id: i32, server_code: u32) {
        if self.closed {
            return;
        }
        self.items.retain(|item| item.id() != id);
        self.items.push_back(RespItem::Error(id, server_code));
    }

    /// Drops everything pending for `id` without a sentinel. Used when the
    /// client side already decided the terminal result (cancel, local error).
    pub fn remove(&mut self, id: i32) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id() != id);
        before != self.items.len()
    }

    pub fn pop(&mut self) -> Option<RespItem> {
        if self.closed {
            return None;
        }
        self.items.pop_front()
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.items.clear();
    }
}
