//! In-process message broker with named queues.
//!
//! Each queue is a bounded `tokio::mpsc` channel carrying MsgPack-encoded
//! [`Message`] envelopes. The broker doubles as the [`ReplyTransport`] used
//! by the dispatcher, so a reply is just a publish to the reply queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_core::{messages, Message};
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session::{ReplySession, ReplyTransport, TransportError};
use crate::dispatch::MessageDispatcher;
use crate::lifecycle::AdapterState;

/// Default per-queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

type QueueMap = DashMap<String, mpsc::Sender<Vec<u8>>>;

/// Named bounded queues shared by producers and consumers in one process.
#[derive(Debug)]
pub struct InProcessBroker {
    queues: Arc<QueueMap>,
    capacity: usize,
    sessions_opened: AtomicU64,
    sessions_closed: Arc<AtomicU64>,
}

impl InProcessBroker {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            sessions_opened: AtomicU64::new(0),
            sessions_closed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Declares `queue` and returns its receiving end.
    ///
    /// Re-declaring a queue replaces it; the previous receiver sees the
    /// channel close once in-flight sends complete.
    pub fn declare(&self, queue: &str) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.queues.insert(queue.to_string(), tx);
        debug!(queue, capacity = self.capacity, "queue declared");
        rx
    }

    /// Encodes and enqueues `message`, waiting for space if the queue is full.
    ///
    /// # Errors
    ///
    /// `UnknownDestination` if the queue was never declared or its consumer
    /// is gone; `Encode` if the envelope cannot be serialized.
    pub async fn publish(&self, queue: &str, message: &Message) -> Result<(), TransportError> {
        publish_to(&self.queues, queue, message).await
    }

    /// Enqueues without waiting.
    ///
    /// # Errors
    ///
    /// As [`publish`](Self::publish), plus `DestinationFull` when the queue
    /// has no free slot.
    pub fn try_publish(&self, queue: &str, message: &Message) -> Result<(), TransportError> {
        let sender = sender_for(&self.queues, queue)?;
        let bytes = messages::encode(message)?;
        sender.try_send(bytes).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::DestinationFull(queue.to_string()),
            mpsc::error::TrySendError::Closed(_) => {
                TransportError::UnknownDestination(queue.to_string())
            }
        })
    }

    #[must_use]
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sessions_closed(&self) -> u64 {
        self.sessions_closed.load(Ordering::Relaxed)
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

fn sender_for(queues: &QueueMap, queue: &str) -> Result<mpsc::Sender<Vec<u8>>, TransportError> {
    queues
        .get(queue)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| TransportError::UnknownDestination(queue.to_string()))
}

async fn publish_to(queues: &QueueMap, queue: &str, message: &Message) -> Result<(), TransportError> {
    let sender = sender_for(queues, queue)?;
    let bytes = messages::encode(message)?;
    sender
        .send(bytes)
        .await
        .map_err(|_| TransportError::UnknownDestination(queue.to_string()))
}

// ---------------------------------------------------------------------------
// Reply sessions
// ---------------------------------------------------------------------------

struct BrokerSession {
    queues: Arc<QueueMap>,
    closed: Arc<AtomicU64>,
    open: bool,
}

#[async_trait]
impl ReplySession for BrokerSession {
    async fn send(&mut self, destination: &str, message: &Message) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        publish_to(&self.queues, destination, message).await
    }

    fn close(&mut self) {
        if std::mem::replace(&mut self.open, false) {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl ReplyTransport for InProcessBroker {
    fn open_session(&self) -> Result<Box<dyn ReplySession>, TransportError> {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(BrokerSession {
            queues: Arc::clone(&self.queues),
            closed: Arc::clone(&self.sessions_closed),
            open: true,
        }))
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Spawns a consumer loop feeding `queue` into `dispatcher`.
///
/// Every delivered message runs in its own task, so there is no ordering
/// between messages. The loop stops when the queue closes or the adapter
/// state moves to shutdown; tasks already spawned run to completion.
pub fn consume(
    queue: String,
    mut rx: mpsc::Receiver<Vec<u8>>,
    dispatcher: MessageDispatcher,
    mut state: watch::Receiver<AdapterState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(queue = %queue, "consumer started");
        if state.borrow_and_update().is_shutting_down() {
            return;
        }
        loop {
            tokio::select! {
                changed = state.changed() => {
                    if changed.is_err() || state.borrow_and_update().is_shutting_down() {
                        break;
                    }
                }
                delivery = rx.recv() => {
                    let Some(bytes) = delivery else { break };
                    let message = match messages::decode(&bytes) {
                        Ok(message) => message,
                        Err(err) => {
                            warn!(queue = %queue, error = %err, "undecodable delivery dropped");
                            metrics::counter!("bridge_delivery_failures_total", "reason" => "decode")
                                .increment(1);
                            continue;
                        }
                    };
                    let dispatcher = dispatcher.clone();
                    let queue = queue.clone();
                    tokio::spawn(async move {
                        let message_id = message.id.clone();
                        if let Err(err) = dispatcher.on_message(message).await {
                            warn!(queue = %queue, message_id = %message_id, error = %err, "delivery failed");
                            metrics::counter!("bridge_delivery_failures_total", "reason" => "dispatch")
                                .increment(1);
                        }
                    });
                }
            }
        }
        info!(queue = %queue, "consumer stopped");
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
