// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-subscription outbound WebSocket queue (spec §4.7 step 2): bounded,
//! drop-oldest on overflow, FIFO within a subscription. `tokio::sync::mpsc`
//! gives FIFO and boundedness but not drop-oldest-on-full, so delivery uses a
//! small ring buffer behind a mutex instead, matching the drop-oldest
//! behavior the teacher's bridge achieves differently (unbounded, since a
//! terminal session has no overflow policy to enforce).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};
use tracing::warn;

use crate::model::Killmail;

const QUEUE_CAPACITY: usize = 256;

struct Queue {
    items: Mutex<VecDeque<Arc<Killmail>>>,
    notify: Notify,
}

impl Queue {
    fn new() -> Self {
        Self { items: Mutex::new(VecDeque::new()), notify: Notify::new() }
    }

    async fn push(&self, killmail: Arc<Killmail>, subscription_id: &str) {
        let mut items = self.items.lock().await;
        if items.len() >= QUEUE_CAPACITY {
            items.pop_front();
            warn!(subscription_id, "websocket outbound queue full, dropped oldest entry");
        }
        items.push_back(killmail);
        self.notify.notify_waiters();
    }

    async fn pop(&self) -> Arc<Killmail> {
        loop {
            {
                let mut items = self.items.lock().await;
                if let Some(item) = items.pop_front() {
                    return item;
                }
            }
            self.notify.notified().await;
        }
    }
}

/// A handle a WebSocket connection holds to drain its subscription's queue.
pub struct QueueHandle {
    queue: Arc<Queue>,
}

impl QueueHandle {
    /// Waits for and removes the next killmail, FIFO.
    pub async fn recv(&self) -> Arc<Killmail> {
        self.queue.pop().await
    }
}

/// Registers one outbound queue per subscription id currently bound to a
/// live WebSocket connection. Subscriptions with no connected socket are
/// simply absent; `push` on an absent id is a silent no-op (the dispatch is
/// webhook/pubsub-only for that subscriber at that moment).
#[derive(Default)]
pub struct WsHub {
    queues: RwLock<HashMap<String, Arc<Queue>>>,
}

impl WsHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `subscription_id` to a fresh queue for the lifetime of a
    /// WebSocket connection. Replaces any prior queue for the same id (a
    /// reconnect supersedes the previous socket).
    pub async fn register(&self, subscription_id: &str) -> QueueHandle {
        let queue = Arc::new(Queue::new());
        self.queues.write().await.insert(subscription_id.to_owned(), Arc::clone(&queue));
        QueueHandle { queue }
    }

    pub async fn unregister(&self, subscription_id: &str) {
        self.queues.write().await.remove(subscription_id);
    }

    /// Pushes onto `subscription_id`'s queue if a socket is currently bound.
    pub async fn push(&self, subscription_id: &str, killmail: Arc<Killmail>) {
        let queue = self.queues.read().await.get(subscription_id).cloned();
        if let Some(queue) = queue {
            queue.push(killmail, subscription_id).await;
        }
    }

    pub async fn is_registered(&self, subscription_id: &str) -> bool {
        self.queues.read().await.contains_key(subscription_id)
    }
}
