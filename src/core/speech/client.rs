//! Streaming speech client.
//!
//! The client coordinates a request side (text FIFO + voice stream queue), a
//! response side (response queue + single-slot operation controller) and a
//! pair of worker tasks over the transport:
//!
//! ```text
//! put_text / start_voice ──▶ request queues ──▶ send worker ──▶ Transport
//!                                                                  │
//!        poll ◀── response queue ◀── recv worker ◀─────────────────┘
//! ```
//!
//! At most one operation is in flight at a time: after the last frame of a
//! request the send worker blocks until the operation drains through
//! [`poll`](SpeechClient::poll). Results for an operation are therefore
//! delivered strictly in the order operations were started.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::SpeechConfig;
use super::controller::{OpStatus, OperationController};
use super::error::SpeechError;
use super::protocol::{ReqType, SpeechRequest, SpeechResponse};
use super::req_queue::{QueueItem, StartArgs, VoiceStreamQueue};
use super::resp_queue::{RespItem, ResponseQueue, ResultPayload};
use super::transport::{RecvOutcome, SendOutcome, Transport, TransportConfig};
use super::types::{SpeechResult, SpeechResultKind, VoiceOptions};

/// Budget for pushing a single frame to the transport.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReqKind {
    Text,
    VoiceStart,
    VoiceData,
    VoiceEnd,
    Cancelled,
}

/// One unit of work dequeued by the send worker.
struct ReqInfo {
    id: i32,
    kind: ReqKind,
    text: String,
    data: Bytes,
    args: Option<StartArgs>,
}

struct TextReq {
    id: i32,
    cancelled: bool,
    text: String,
}

#[derive(Default)]
struct ReqState {
    voice: VoiceStreamQueue,
    texts: std::collections::VecDeque<TextReq>,
}

impl ReqState {
    /// Kind and id of the next unit of work, voice queue first (it
    /// guarantees FIFO over the whole voice lifecycle).
    fn peek(&self) -> Option<(ReqKind, i32)> {
        if let Some(item) = self.voice.peek() {
            let kind = match item {
                QueueItem::Start(_) => ReqKind::VoiceStart,
                QueueItem::Data(..) => ReqKind::VoiceData,
                QueueItem::End(_) => ReqKind::VoiceEnd,
                QueueItem::Cancelled(_) => ReqKind::Cancelled,
            };
            return Some((kind, item.id()));
        }
        self.texts.front().map(|text| {
            let kind = if text.cancelled {
                ReqKind::Cancelled
            } else {
                ReqKind::Text
            };
            (kind, text.id)
        })
    }

    fn pop_next(&mut self) -> Option<ReqInfo> {
        if let Some(item) = self.voice.pop() {
            let args = match &item {
                QueueItem::Start(id) => self.voice.get_arg(*id),
                _ => None,
            };
            return Some(req_info_from_item(item, args));
        }
        self.texts.pop_front().map(|text| ReqInfo {
            id: text.id,
            kind: if text.cancelled {
                ReqKind::Cancelled
            } else {
                ReqKind::Text
            },
            text: text.text,
            data: Bytes::new(),
            args: None,
        })
    }
}

#[derive(Default)]
struct RespState {
    responses: ResponseQueue,
    controller: OperationController,
}

struct ClientShared {
    config: SpeechConfig,
    initialized: AtomicBool,
    next_id: AtomicI32,
    req: Mutex<ReqState>,
    req_notify: Notify,
    resp: Mutex<RespState>,
    resp_notify: Notify,
}

/// Outcome of applying a dequeued request to the operation controller.
enum CtlDecision {
    /// Serialize and send the frame.
    Send,
    /// Consume the request without touching the wire.
    Skip,
}

enum RequestOutcome {
    Sent,
    /// The frame was the last of its request; the operation gates the queue.
    LastFrame,
    Failed,
}

/// Condition-variable style wait: registers interest in `notify` before the
/// guard is dropped so a wakeup between unlock and await is not lost.
async fn wait_notified<T>(notify: &Notify, guard: MutexGuard<'_, T>) {
    let notified = notify.notified();
    tokio::pin!(notified);
    notified.as_mut().enable();
    drop(guard);
    notified.await;
}

/// Like [`wait_notified`], releasing two guards (innermost first).
async fn wait_notified2<A, B>(notify: &Notify, inner: MutexGuard<'_, A>, outer: MutexGuard<'_, B>) {
    let notified = notify.notified();
    tokio::pin!(notified);
    notified.as_mut().enable();
    drop(inner);
    drop(outer);
    notified.await;
}

/// Full-duplex client for the cloud speech service.
///
/// Every operation is safe between `prepare` and `release`; calls outside
/// that window are no-ops or return `-1`.
pub struct SpeechClient {
    shared: Arc<ClientShared>,
    transport: Arc<dyn Transport>,
    transport_config: TransportConfig,
    op_budget: Duration,
    /// Also serializes prepare/release against each other.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SpeechClient {
    pub fn new(transport: Arc<dyn Transport>, transport_config: TransportConfig) -> Self {
        Self {
            op_budget: super::controller::DEFAULT_OP_BUDGET,
            shared: Arc::new(ClientShared {
                config: SpeechConfig::new(),
                initialized: AtomicBool::new(false),
                next_id: AtomicI32::new(0),
                req: Mutex::new(ReqState::default()),
                req_notify: Notify::new(),
                resp: Mutex::new(RespState::default()),
                resp_notify: Notify::new(),
            }),
            transport,
            transport_config,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    /// Stores a configuration entry replayed into every outgoing request.
    pub fn config(&self, key: &str, value: &str) {
        self.shared.config.set(key, value);
    }

    /// Initializes the transport and starts the worker tasks. Idempotent.
    pub async fn prepare(&self) -> bool {
        let mut workers = self.workers.lock().await;
        if self.shared.initialized.load(Ordering::Acquire) {
            return true;
        }
        self.shared.next_id.store(0, Ordering::Release);
        *self.shared.req.lock().await = ReqState::default();
        *self.shared.resp.lock().await = RespState {
            responses: ResponseQueue::new(),
            controller: OperationController::with_budget(self.op_budget),
        };
        self.transport.initialize(&self.transport_config).await;
        self.shared.initialized.store(true, Ordering::Release);

        let send = {
            let shared = self.shared.clone();
            let transport = self.transport.clone();
            tokio::spawn(async move { run_send_worker(shared, transport).await })
        };
        let recv = {
            let shared = self.shared.clone();
            let transport = self.transport.clone();
            tokio::spawn(async move { run_recv_worker(shared, transport).await })
        };
        workers.push(send);
        workers.push(recv);
        info!("speech client prepared");
        true
    }

    /// Tears the client down: closes both queues, releases the transport and
    /// joins the workers. Idempotent; after release every public call is
    /// rejected until the next `prepare`.
    pub async fn release(&self) {
        let mut workers = self.workers.lock().await;
        if !self.shared.initialized.load(Ordering::Acquire) {
            return;
        }
        {
            let mut req = self.shared.req.lock().await;
            self.shared.initialized.store(false, Ordering::Release);
            self.transport.release().await;
            req.voice.close();
            req.texts.clear();
            self.shared.req_notify.notify_waiters();
        }
        {
            let mut resp = self.shared.resp.lock().await;
            resp.responses.close();
            resp.controller.finish_op();
            self.shared.resp_notify.notify_waiters();
        }
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "speech worker ended abnormally");
            }
        }
        info!("speech client released");
    }

    fn next_id(&self) -> i32 {
        self.shared.next_id.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Queues a text query. Returns the assigned id, or -1 when released.
    pub async fn put_text(&self, text: &str) -> i32 {
        if !self.is_prepared() {
            return -1;
        }
        let id = self.next_id();
        let mut req = self.shared.req.lock().await;
        req.texts.push_back(TextReq {
            id,
            cancelled: false,
            text: text.to_string(),
        });
        debug!(id, "text request queued");
        self.shared.req_notify.notify_waiters();
        id
    }

    /// Opens a voice session. Returns the assigned id, or -1 when the voice
    /// slot is occupied or the client is released.
    pub async fn start_voice(
        &self,
        framework: Option<VoiceOptions>,
        skill: Option<VoiceOptions>,
    ) -> i32 {
        if !self.is_prepared() {
            return -1;
        }
        let mut req = self.shared.req.lock().await;
        let id = self.next_id();
        if !req.voice.start(id) {
            debug!(id, "voice slot occupied, start rejected");
            return -1;
        }
        req.voice.set_arg(id, StartArgs { framework, skill });
        debug!(id, "voice session opened");
        self.shared.req_notify.notify_waiters();
        id
    }

    /// Appends an audio chunk to an open voice session. Empty chunks and
    /// chunks for anything but the open session are silently dropped.
    pub async fn put_voice(&self, id: i32, data: &[u8]) {
        if !self.is_prepared() || id <= 0 || data.is_empty() {
            return;
        }
        let mut req = self.shared.req.lock().await;
        if req.voice.stream(id, Bytes::copy_from_slice(data)) {
            self.shared.req_notify.notify_waiters();
        }
    }

    /// Closes a voice session; the final frame is sent once the queue drains.
    pub async fn end_voice(&self, id: i32) {
        if !self.is_prepared() || id <= 0 {
            return;
        }
        let mut req = self.shared.req.lock().await;
        if req.voice.end(id) {
            debug!(id, "voice session closed");
            self.shared.req_notify.notify_waiters();
        }
    }

    /// Cancels one request (`id > 0`) or everything pending plus the
    /// operation in flight (`id == 0`). Cancelling an open voice stream
    /// still sends the closing frame so the server can tear down cleanly.
    pub async fn cancel(&self, id: i32) {
        let mut req = self.shared.req.lock().await;
        if !self.is_prepared() {
            return;
        }
        debug!(id, "cancel requested");
        if id > 0 {
            if req.voice.erase(id) {
                self.shared.req_notify.notify_waiters();
                return;
            }
            if let Some(text) = req.texts.iter_mut().find(|t| t.id == id) {
                text.cancelled = true;
                return;
            }
            let mut resp = self.shared.resp.lock().await;
            if resp.controller.cancel_op(id) {
                self.shared.resp_notify.notify_waiters();
            }
        } else {
            if req.voice.clear().is_some() {
                self.shared.req_notify.notify_waiters();
            }
            for text in req.texts.iter_mut() {
                text.cancelled = true;
            }
            let mut resp = self.shared.resp.lock().await;
            resp.controller.cancel_op(0);
            self.shared.resp_notify.notify_waiters();
        }
    }

    /// Blocks until the next result is available. Returns `None` once the
    /// client has been released and nothing remains to surface.
    ///
    /// Results are keyed to the single operation in flight: a client-side
    /// cancel or error synthesizes the terminal result here and drains any
    /// stale responses; otherwise the response queue is popped in order.
    pub async fn poll(&self) -> Option<SpeechResult> {
        loop {
            let mut resp = self.shared.resp.lock().await;
            if !self.is_prepared() {
                debug!("poll exits, client released");
                return None;
            }
            if let Some(op) = resp.controller.current_op() {
                let (id, status, error) = (op.id, op.status, op.error);
                match status {
                    OpStatus::Cancelled => {
                        resp.responses.remove(id);
                        resp.controller.remove_op();
                        self.shared.resp_notify.notify_waiters();
                        debug!(id, "poll surfaces cancelled operation");
                        return Some(SpeechResult::empty(id, SpeechResultKind::Cancelled));
                    }
                    OpStatus::Error => {
                        resp.responses.remove(id);
                        resp.controller.remove_op();
                        self.shared.resp_notify.notify_waiters();
                        let mut result = SpeechResult::empty(id, SpeechResultKind::Error);
                        result.error = Some(error.unwrap_or(SpeechError::Unknown));
                        debug!(id, error = ?result.error, "poll surfaces failed operation");
                        return Some(result);
                    }
                    _ => {
                        if let Some(item) = resp.responses.pop() {
                            debug_assert_eq!(item.id(), id);
                            let result = result_from_item(item);
                            if result.kind.is_terminal() {
                                resp.controller.remove_op();
                                self.shared.resp_notify.notify_waiters();
                            }
                            return Some(result);
                        }
                    }
                }
            }
            wait_notified(&self.shared.resp_notify, resp).await;
        }
    }

    /// Test hook: shrinks the inactivity budget applied at the next
    /// `prepare`.
    #[cfg(test)]
    pub(crate) fn set_op_budget(&mut self, budget: Duration) {
        self.op_budget = budget;
    }
}

fn result_from_item(item: RespItem) -> SpeechResult {
    match item {
        RespItem::Start(id) => SpeechResult::empty(id, SpeechResultKind::Start),
        RespItem::Intermediate(id, p) => result_with_payload(id, SpeechResultKind::Intermediate, p),
        RespItem::End(id, p) => result_with_payload(id, SpeechResultKind::End, p),
        RespItem::Error(id, code) => {
            let mut result = SpeechResult::empty(id, SpeechResultKind::Error);
            result.error = Some(SpeechError::from_server_code(code).unwrap_or(SpeechError::Unknown));
            result
        }
    }
}

fn result_with_payload(id: i32, kind: SpeechResultKind, payload: ResultPayload) -> SpeechResult {
    SpeechResult {
        id,
        kind,
        error: None,
        asr: payload.asr,
        nlp: payload.nlp,
        action: payload.action,
        extra: payload.extra,
    }
}

async fn run_send_worker(shared: Arc<ClientShared>, transport: Arc<dyn Transport>) {
    debug!("send worker started");
    loop {
        // Dequeue and reflect onto the controller under both locks, so a
        // cancel can never slip between the pop and the operation install.
        let work = {
            let mut req = shared.req.lock().await;
            if !shared.initialized.load(Ordering::Acquire) {
                break;
            }
            let Some((kind, id)) = req.peek() else {
                wait_notified(&shared.req_notify, req).await;
                continue;
            };
            let mut resp = shared.resp.lock().await;
            if slot_blocks(kind, id, &resp.controller) {
                // A finished operation still occupies the slot; it drains
                // through poll before the next one may be installed.
                wait_notified2(&shared.resp_notify, resp, req).await;
                continue;
            }
            let Some(info) = req.pop_next() else {
                continue;
            };
            let decision = apply_ctl(&info, &mut resp, &shared.resp_notify);
            (info, decision)
        };

        let (info, decision) = work;
        if matches!(decision, CtlDecision::Send)
            && matches!(
                do_request(&shared, transport.as_ref(), &info).await,
                RequestOutcome::LastFrame
            )
        {
            // Gate the next operation behind this one.
            loop {
                let resp = shared.resp.lock().await;
                if !shared.initialized.load(Ordering::Acquire)
                    || !resp.controller.is_op_active(info.id)
                {
                    break;
                }
                wait_notified(&shared.resp_notify, resp).await;
            }
        }
    }
    debug!("send worker quit");
}

/// Whether the next request has to wait for the operation slot to drain.
fn slot_blocks(kind: ReqKind, id: i32, controller: &OperationController) -> bool {
    match kind {
        // A new operation needs an empty slot.
        ReqKind::Text | ReqKind::VoiceStart => controller.has_op(),
        // A cancel sentinel for anything but the operation in flight waits
        // its turn, then installs a cancelled operation for poll to drain.
        ReqKind::Cancelled => matches!(controller.current_op(), Some(op) if op.id != id),
        ReqKind::VoiceData | ReqKind::VoiceEnd => false,
    }
}

fn req_info_from_item(item: QueueItem, args: Option<StartArgs>) -> ReqInfo {
    let (id, kind, data) = match item {
        QueueItem::Start(id) => (id, ReqKind::VoiceStart, Bytes::new()),
        QueueItem::Data(id, chunk) => (id, ReqKind::VoiceData, chunk),
        QueueItem::End(id) => (id, ReqKind::VoiceEnd, Bytes::new()),
        QueueItem::Cancelled(id) => (id, ReqKind::Cancelled, Bytes::new()),
    };
    ReqInfo {
        id,
        kind,
        text: String::new(),
        data,
        args,
    }
}

/// The decision table for reflecting a dequeued request onto the
/// controller. The caller has already verified via [`slot_blocks`] that the
/// slot can take the request; both locks are held across the two calls.
fn apply_ctl(info: &ReqInfo, resp: &mut RespState, resp_notify: &Notify) -> CtlDecision {
    match info.kind {
        ReqKind::Text | ReqKind::VoiceStart => {
            resp.controller.new_op(info.id, OpStatus::Start);
            CtlDecision::Send
        }
        ReqKind::VoiceData | ReqKind::VoiceEnd => {
            match resp.controller.current_op() {
                Some(op) if op.id == info.id => CtlDecision::Send,
                // The session was cancelled or failed under us.
                _ => CtlDecision::Skip,
            }
        }
        ReqKind::Cancelled => match resp.controller.current_op_mut() {
            Some(op) if op.id == info.id => {
                if !op.status.is_terminal() {
                    op.status = OpStatus::Cancelled;
                }
                debug!(id = info.id, "operation in flight cancelled");
                resp_notify.notify_waiters();
                // The server still needs the closing frame.
                CtlDecision::Send
            }
            Some(_) => CtlDecision::Skip,
            None => {
                resp.controller.new_op(info.id, OpStatus::Cancelled);
                debug!(id = info.id, "cancelled before send, no frame needed");
                resp_notify.notify_waiters();
                CtlDecision::Skip
            }
        },
    }
}

fn apply_req_config(config: &SpeechConfig, req: &mut SpeechRequest, args: Option<&StartArgs>) {
    req.lang = config.get("lang", "zh");
    req.codec = config.get("codec", "pcm");
    req.vt = config.get("vt", "");
    if let Some(args) = args {
        if let Some(framework) = &args.framework {
            req.framework_options = framework.to_json();
        }
        if let Some(skill) = &args.skill {
            req.skill_options = skill.to_json();
        }
    }
}

async fn do_request(
    shared: &Arc<ClientShared>,
    transport: &dyn Transport,
    info: &ReqInfo,
) -> RequestOutcome {
    let mut req = SpeechRequest {
        id: info.id,
        ..Default::default()
    };
    let mut last = false;
    match info.kind {
        ReqKind::Text => {
            req.req_type_raw = ReqType::Text as i32;
            req.asr = info.text.clone();
            apply_req_config(&shared.config, &mut req, None);
            last = true;
            debug!(id = info.id, "sending text request");
        }
        ReqKind::VoiceStart => {
            req.req_type_raw = ReqType::Start as i32;
            apply_req_config(&shared.config, &mut req, info.args.as_ref());
            debug!(id = info.id, "sending voice start");
        }
        ReqKind::VoiceData => {
            req.req_type_raw = ReqType::Voice as i32;
            req.voice = info.data.to_vec();
        }
        ReqKind::VoiceEnd => {
            req.req_type_raw = ReqType::End as i32;
            last = true;
            debug!(id = info.id, "sending voice end");
        }
        ReqKind::Cancelled => {
            req.req_type_raw = ReqType::End as i32;
            debug!(id = info.id, "sending voice end for cancelled stream");
        }
    }

    match transport.send(&req, SEND_TIMEOUT).await {
        SendOutcome::Success => {
            if last {
                let mut resp = shared.resp.lock().await;
                resp.controller.refresh_op_time();
                RequestOutcome::LastFrame
            } else {
                RequestOutcome::Sent
            }
        }
        outcome => {
            let err = match outcome {
                SendOutcome::NotAvailable => SpeechError::ServiceUnavailable,
                _ => SpeechError::Unknown,
            };
            warn!(id = info.id, ?outcome, "request send failed");
            let mut resp = shared.resp.lock().await;
            resp.controller.set_op_error(err);
            shared.resp_notify.notify_waiters();
            RequestOutcome::Failed
        }
    }
}

async fn run_recv_worker(shared: Arc<ClientShared>, transport: Arc<dyn Transport>) {
    debug!("recv worker started");
    loop {
        let timeout = shared.resp.lock().await.controller.op_timeout();
        match transport.recv(timeout).await {
            RecvOutcome::NotReady => break,
            RecvOutcome::Message(msg) => {
                let mut resp = shared.resp.lock().await;
                resp.controller.refresh_op_time();
                gen_result_by_resp(&mut resp, &shared.resp_notify, msg);
            }
            RecvOutcome::Timeout => {
                let mut resp = shared.resp.lock().await;
                if resp.controller.op_timeout().is_zero()
                    && resp.controller.set_op_error(SpeechError::Timeout)
                {
                    warn!("operation timed out waiting for the server");
                    shared.resp_notify.notify_waiters();
                }
            }
            RecvOutcome::Broken => {
                let mut resp = shared.resp.lock().await;
                if resp.controller.set_op_error(SpeechError::ServiceUnavailable) {
                    shared.resp_notify.notify_waiters();
                }
            }
            RecvOutcome::Unknown => {
                let mut resp = shared.resp.lock().await;
                if resp.controller.set_op_error(SpeechError::Unknown) {
                    shared.resp_notify.notify_waiters();
                }
            }
        }
    }
    debug!("recv worker quit");
}

/// Routes one server response into the response queue, keyed to the
/// operation in flight. Responses for anything else are dropped.
fn gen_result_by_resp(resp: &mut RespState, resp_notify: &Notify, msg: SpeechResponse) {
    let (op_id, op_status) = match resp.controller.current_op() {
        Some(op) => (op.id, op.status),
        None => return,
    };
    if op_id != msg.id || matches!(op_status, OpStatus::Cancelled | OpStatus::Error) {
        debug!(
            id = msg.id,
            "response does not match the operation in flight, dropped"
        );
        return;
    }

    if op_status == OpStatus::Start {
        resp.responses.start(msg.id);
        if let Some(op) = resp.controller.current_op_mut() {
            op.status = OpStatus::Streaming;
        }
        debug!(id = msg.id, "first response, operation streaming");
    }

    match SpeechError::from_server_code(msg.result) {
        None => {
            let payload = ResultPayload::from(&msg);
            if msg.finish {
                resp.responses.end(msg.id, payload);
                resp.controller.finish_op();
                debug!(id = msg.id, "final response, operation finished");
            } else {
                resp.responses.stream(msg.id, payload);
            }
        }
        Some(err) => {
            warn!(id = msg.id, code = msg.result, error = %err, "server reported failure");
            resp.responses.erase(msg.id, msg.result);
            resp.controller.finish_op();
        }
    }
    resp_notify.notify_waiters();
}
