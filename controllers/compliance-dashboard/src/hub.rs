//! Broadcast hub.
//!
//! Fans every published [`Message`] out to every connected observer. The
//! observer registry is owned by the hub's run loop; register, unregister and
//! broadcast requests all travel through one command channel, so the hot path
//! takes no locks.
//!
//! Back-pressure policy: an observer whose outbound queue is full is dropped,
//! never waited on. A publisher that finds the command channel full drops the
//! message and counts it.

use crate::metrics::DashboardMetrics;
use compliance_types::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capacity of the command channel between publishers and the run loop
pub const COMMAND_CAPACITY: usize = 256;

enum Command {
    Register {
        id: Uuid,
        queue: mpsc::Sender<Arc<str>>,
    },
    Unregister(Uuid),
    Broadcast(Message),
}

/// The hub's coordination loop and the registry it owns
pub struct Hub {
    commands: mpsc::Receiver<Command>,
    observers: HashMap<Uuid, mpsc::Sender<Arc<str>>>,
    metrics: DashboardMetrics,
}

/// Cloneable front end used by publishers and connection handlers
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    metrics: DashboardMetrics,
    observer_queue: usize,
}

/// A registered observer's end of its outbound queue.
///
/// `recv` yields serialized messages in broadcast order and returns `None`
/// once the hub has closed the observer.
pub struct Subscription {
    pub id: Uuid,
    queue: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.queue.recv().await
    }
}

impl Hub {
    pub fn new(metrics: DashboardMetrics, command_capacity: usize, observer_queue: usize) -> (Hub, HubHandle) {
        let (tx, rx) = mpsc::channel(command_capacity);
        let hub = Hub {
            commands: rx,
            observers: HashMap::new(),
            metrics: metrics.clone(),
        };
        let handle = HubHandle {
            commands: tx,
            metrics,
            observer_queue,
        };
        (hub, handle)
    }

    /// Runs until `cancel` fires or every handle is dropped, then closes all observers.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Broadcast hub started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        let closed = self.observers.len();
        self.observers.clear();
        self.metrics.hub_observers.set(0);
        info!(closed, "Broadcast hub stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { id, queue } => {
                self.observers.insert(id, queue);
                debug!(observer = %id, total = self.observers.len(), "Observer registered");
            }
            Command::Unregister(id) => {
                // Dropping the sender closes the observer's queue
                if self.observers.remove(&id).is_some() {
                    debug!(observer = %id, total = self.observers.len(), "Observer unregistered");
                }
            }
            Command::Broadcast(message) => self.fan_out(&message),
        }
        self.metrics.hub_observers.set(i64::try_from(self.observers.len()).unwrap_or(i64::MAX));
    }

    fn fan_out(&mut self, message: &Message) {
        let payload: Arc<str> = match serde_json::to_string(message) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(kind = %message.kind(), error = %e, "Failed to serialize message, dropping");
                return;
            }
        };
        let dropped = &self.metrics.hub_dropped_messages;
        self.observers.retain(|id, queue| match queue.try_send(Arc::clone(&payload)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(observer = %id, "Observer queue full, disconnecting slow observer");
                dropped.with_label_values(&["observer_full"]).inc();
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(observer = %id, "Observer went away");
                false
            }
        });
    }
}

impl HubHandle {
    /// Registers a new observer with the configured queue depth
    pub async fn register(&self) -> Subscription {
        self.register_with_capacity(self.observer_queue).await
    }

    /// Registers a new observer. If the hub has stopped the subscription is
    /// returned already closed.
    pub async fn register_with_capacity(&self, capacity: usize) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        if self.commands.send(Command::Register { id, queue: tx }).await.is_err() {
            debug!(observer = %id, "Hub stopped, subscription closed on arrival");
        }
        Subscription { id, queue: rx }
    }

    /// Removes an observer and closes its queue. Unknown ids are ignored.
    pub async fn unregister(&self, id: Uuid) {
        let _ = self.commands.send(Command::Unregister(id)).await;
    }

    /// Queues `message` for fan-out without waiting. Dropped if the hub is saturated.
    pub fn broadcast(&self, message: Message) {
        match self.commands.try_send(Command::Broadcast(message)) {
            Ok(()) => {}
            Err(TrySendError::Full(Command::Broadcast(message))) => {
                warn!(kind = %message.kind(), "Hub command queue full, dropping message");
                self.metrics.hub_dropped_messages.with_label_values(&["publisher_full"]).inc();
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.hub_dropped_messages.with_label_values(&["publisher_full"]).inc();
            }
            Err(TrySendError::Closed(_)) => debug!("Hub stopped, dropping message"),
        }
    }
}
