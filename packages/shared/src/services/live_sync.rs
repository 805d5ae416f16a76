//! In-process change notification.
//!
//! Every committed match document and every appended chat message is published
//! to a `broadcast` topic keyed by match id. Subscribers hold a [`Listener`]
//! on the topic; the last listener to go away removes the topic.
//!
//! ```text
//!   MatchService::apply_move ──► LiveSync::publish_match ──► topic "m-1"
//!                                                              │
//!                                  ┌───────────────────────────┤
//!                                  ▼                           ▼
//!                         subscription task A          subscription task B
//!                          (mpsc ► Subscription)       (mpsc ► Subscription)
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::chat::ChatMessage;
use crate::models::match_record::Match;

pub const DEFAULT_TOPIC_CAPACITY: usize = 64;
pub const SUBSCRIPTION_BUFFER: usize = 32;

struct Topics<T> {
    kind: &'static str,
    capacity: usize,
    senders: Mutex<HashMap<String, broadcast::Sender<T>>>,
}

impl<T: Clone + Send + 'static> Topics<T> {
    fn new(kind: &'static str, capacity: usize) -> Self {
        Topics {
            kind,
            capacity,
            senders: Mutex::new(HashMap::new()),
        }
    }

    fn listen(self: &Arc<Self>, key: &str) -> Listener<T> {
        let receiver = self
            .senders
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        Listener {
            topics: Arc::clone(self),
            key: key.to_string(),
            receiver: Some(receiver),
        }
    }

    fn publish(&self, key: &str, value: T) -> usize {
        match self.senders.lock().get(key) {
            Some(sender) => sender.send(value).unwrap_or(0),
            None => 0,
        }
    }

    fn release(&self, key: &str) {
        let mut senders = self.senders.lock();
        if senders
            .get(key)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            senders.remove(key);
            debug!("Released {} topic {}", self.kind, key);
        }
    }

    fn len(&self) -> usize {
        self.senders.lock().len()
    }
}

/// A registration on one topic. Dropping it unregisters and, for the last
/// listener, removes the topic.
pub struct Listener<T: Clone + Send + 'static> {
    topics: Arc<Topics<T>>,
    key: String,
    receiver: Option<broadcast::Receiver<T>>,
}

impl<T: Clone + Send + 'static> Listener<T> {
    /// Next published value. A lagging listener skips what it missed; `None`
    /// once the topic is gone.
    pub async fn recv(&mut self) -> Option<T> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(value) => return Some(value),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(
                        "Listener on {} topic {} skipped {} updates",
                        self.topics.kind, self.key, skipped
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Listener<T> {
    fn drop(&mut self) {
        // the receiver must be gone before the count is checked
        drop(self.receiver.take());
        self.topics.release(&self.key);
    }
}

/// Hub shared by the match and chat services.
pub struct LiveSync {
    matches: Arc<Topics<Match>>,
    chats: Arc<Topics<ChatMessage>>,
}

impl Default for LiveSync {
    fn default() -> Self {
        LiveSync::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }
}

impl LiveSync {
    pub fn new() -> Self {
        LiveSync::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        LiveSync {
            matches: Arc::new(Topics::new("match", capacity.max(1))),
            chats: Arc::new(Topics::new("chat", capacity.max(1))),
        }
    }

    pub fn listen_match(&self, match_id: &str) -> Listener<Match> {
        self.matches.listen(match_id)
    }

    pub fn listen_chat(&self, match_id: &str) -> Listener<ChatMessage> {
        self.chats.listen(match_id)
    }

    /// Returns how many listeners received the document.
    pub fn publish_match(&self, record: &Match) -> usize {
        self.matches.publish(&record.match_id, record.clone())
    }

    pub fn publish_chat(&self, message: &ChatMessage) -> usize {
        self.chats.publish(&message.match_id, message.clone())
    }

    /// Number of match ids with at least one live listener, per kind.
    pub fn topic_counts(&self) -> (usize, usize) {
        (self.matches.len(), self.chats.len())
    }
}

/// Stream of updates produced by a background task.
///
/// Cancelling or dropping the subscription stops the task, which releases its
/// listener.
pub struct Subscription<T> {
    receiver: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Subscription<T> {
    pub fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task = tokio::spawn(producer(sender));
        Subscription { receiver, task }
    }

    /// `None` once the producer has finished.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Stops delivery and waits until the producer task is gone.
    pub async fn cancel(mut self) {
        self.receiver.close();
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
