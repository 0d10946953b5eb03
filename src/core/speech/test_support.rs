//! Test doubles for exercising the speech client without a network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio_util::sync::CancellationToken;

use super::protocol::{SpeechRequest, SpeechResponse};
use super::transport::{RecvOutcome, SendOutcome, Transport, TransportConfig};

/// Transport stub: records every sent frame and replays scripted receive
/// outcomes pushed by the test.
pub struct ScriptedTransport {
    sent: parking_lot::Mutex<Vec<SpeechRequest>>,
    sent_notify: Notify,
    outcomes: Mutex<mpsc::UnboundedReceiver<RecvOutcome>>,
    outcome_tx: mpsc::UnboundedSender<RecvOutcome>,
    released: parking_lot::Mutex<CancellationToken>,
    fail_sends_with: parking_lot::Mutex<Option<SendOutcome>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        token.cancel();
        Arc::new(Self {
            sent: parking_lot::Mutex::new(Vec::new()),
            sent_notify: Notify::new(),
            outcomes: Mutex::new(outcome_rx),
            outcome_tx,
            released: parking_lot::Mutex::new(token),
            fail_sends_with: parking_lot::Mutex::new(None),
        })
    }

    pub fn push_response(&self, resp: SpeechResponse) {
        let _ = self.outcome_tx.send(RecvOutcome::Message(resp));
    }

    pub fn push_outcome(&self, outcome: RecvOutcome) {
        let _ = self.outcome_tx.send(outcome);
    }

    /// Makes every subsequent send fail with `outcome` (or succeed again
    /// with `None`).
    pub fn fail_sends(&self, outcome: Option<SendOutcome>) {
        *self.fail_sends_with.lock() = outcome;
    }

    pub fn sent(&self) -> Vec<SpeechRequest> {
        self.sent.lock().clone()
    }

    /// Waits until at least `n` frames have been sent and returns them.
    pub async fn wait_for_sent(&self, n: usize) -> Vec<SpeechRequest> {
        let fut = async {
            loop {
                let notified = self.sent_notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                {
                    let sent = self.sent.lock();
                    if sent.len() >= n {
                        return sent.clone();
                    }
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), fut)
            .await
            .expect("expected frames never sent")
    }

    fn token(&self) -> CancellationToken {
        self.released.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn initialize(&self, _config: &TransportConfig) {
        *self.released.lock() = CancellationToken::new();
    }

    async fn send(&self, req: &SpeechRequest, _timeout: Duration) -> SendOutcome {
        if self.token().is_cancelled() {
            return SendOutcome::NotAvailable;
        }
        if let Some(outcome) = *self.fail_sends_with.lock() {
            return outcome;
        }
        self.sent.lock().push(req.clone());
        self.sent_notify.notify_waiters();
        SendOutcome::Success
    }

    async fn recv(&self, timeout: Duration) -> RecvOutcome {
        let token = self.token();
        if token.is_cancelled() {
            return RecvOutcome::NotReady;
        }
        let mut outcomes = self.outcomes.lock().await;
        tokio::select! {
            _ = token.cancelled() => RecvOutcome::NotReady,
            item = outcomes.recv() => item.unwrap_or(RecvOutcome::NotReady),
            _ = tokio::time::sleep(timeout) => RecvOutcome::Timeout,
        }
    }

    async fn release(&self) {
        self.token().cancel();
    }
}
