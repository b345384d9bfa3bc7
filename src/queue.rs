use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::events::Event;

/// How many accepted events may sit between the endpoint and the consumer
/// before publishes start parking.
pub const QUEUE_CAPACITY: usize = 10;

pub type EventReceiver = mpsc::Receiver<Event>;

/// Producer half of the dispatch queue, handed to the webhook routes as
/// managed state.
#[derive(Clone)]
pub struct EventSender(mpsc::Sender<Event>);

/// Creates the bounded FIFO hand-off between request handling and the
/// consumer. Events are delivered in publish order and read exactly once;
/// nothing is persisted, so whatever sits in the queue at shutdown is lost.
pub fn dispatch_queue() -> (EventSender, EventReceiver) {
    let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
    (EventSender(sender), receiver)
}

impl EventSender {
    /// Hands an event to the consumer without ever blocking the caller.
    ///
    /// The fast path is a non-blocking send. When the queue is full the
    /// event is moved into a detached task that waits for capacity, so the
    /// HTTP response completes promptly while the backlog shows up in the
    /// log instead of accumulating silently.
    pub fn publish(&self, event: Event) {
        match self.0.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(
                    "dispatch queue is full ({} events), parking delivery for {}/{}",
                    QUEUE_CAPACITY, event.owner, event.repo
                );
                let sender = self.0.clone();
                tokio::spawn(async move {
                    if sender.send(event).await.is_err() {
                        warn!("dispatch queue consumer is gone, dropping parked event");
                    }
                });
            }
            Err(TrySendError::Closed(_)) => {
                warn!("dispatch queue consumer is gone, dropping event");
            }
        }
    }
}
