//! Lifecycle event fan-out.
//!
//! Each subscriber gets its own unbounded queue drained by a dedicated
//! worker task, so one listener's slow callback never delays another
//! listener, while each listener still receives events strictly in emission
//! order and never concurrently with itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};

use crate::domain::events::{EngineEvent, EventListener};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    sender: mpsc::UnboundedSender<EngineEvent>,
    pending: Arc<AtomicUsize>,
}

struct BusInner {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

/// Cheaply cloneable handle; clones share subscribers.
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe a listener to every event.
    pub async fn subscribe(&self, listener: Arc<dyn EventListener>) -> SubscriptionId {
        self.attach(listener, None).await
    }

    /// Subscribe a listener that fires at most once, for the first event the
    /// filter matches, then removes itself.
    pub async fn subscribe_once<F>(
        &self,
        filter: F,
        listener: Arc<dyn EventListener>,
    ) -> SubscriptionId
    where
        F: Fn(&EngineEvent) -> bool + Send + Sync + 'static,
    {
        self.attach(listener, Some(Box::new(filter))).await
    }

    async fn attach(
        &self,
        listener: Arc<dyn EventListener>,
        once_filter: Option<Box<dyn Fn(&EngineEvent) -> bool + Send + Sync>>,
    ) -> SubscriptionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, mut receiver) = mpsc::unbounded_channel::<EngineEvent>();
        let pending = Arc::new(AtomicUsize::new(0));
        self.inner.subscribers.write().await.insert(
            id,
            Subscriber {
                sender,
                pending: Arc::clone(&pending),
            },
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match &once_filter {
                    Some(filter) => {
                        let matched = filter(&event);
                        if matched {
                            listener.on_event(&event).await;
                        }
                        pending.fetch_sub(1, Ordering::Release);
                        if matched {
                            inner.subscribers.write().await.remove(&id);
                            break;
                        }
                    }
                    None => {
                        listener.on_event(&event).await;
                        pending.fetch_sub(1, Ordering::Release);
                    }
                }
            }
        });

        SubscriptionId(id)
    }

    /// Removes the subscription; its worker drains nothing further.
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.subscribers.write().await.remove(&id.0);
    }

    /// Queues the event for every current subscriber. Does not wait for any
    /// listener callback.
    pub async fn emit(&self, event: EngineEvent) {
        let subscribers = self.inner.subscribers.read().await;
        for subscriber in subscribers.values() {
            subscriber.pending.fetch_add(1, Ordering::Acquire);
            if subscriber.sender.send(event.clone()).is_err() {
                subscriber.pending.fetch_sub(1, Ordering::Release);
            }
        }
    }

    /// Waits until every subscriber has processed everything emitted so far.
    pub async fn flush(&self) {
        loop {
            let drained = {
                let subscribers = self.inner.subscribers.read().await;
                subscribers
                    .values()
                    .all(|s| s.pending.load(Ordering::Acquire) == 0)
            };
            if drained {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
