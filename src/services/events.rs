//! Change propagation to subscribed clients
//!
//! Fans committed state deltas out to per-topic subscribers. Delivery is
//! best-effort: a subscriber whose channel is gone is pruned, and consumers
//! are expected to re-fetch the canonical record rather than trust the
//! stream as a source of truth.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{BookAvailability, Checkout, CheckoutStatus};

/// Subscription topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    BookAvailability(Uuid),
    Checkout(Uuid),
    UserCheckouts(Uuid),
}

/// Status slice of a checkout, published after every committed transition
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutDelta {
    pub checkout_id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub status: CheckoutStatus,
    pub due_date: DateTime<Utc>,
}

impl From<&Checkout> for CheckoutDelta {
    fn from(checkout: &Checkout) -> Self {
        Self {
            checkout_id: checkout.id,
            user_id: checkout.user_id,
            book_id: checkout.book_id,
            status: checkout.status,
            due_date: checkout.due_date,
        }
    }
}

/// A committed state delta
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChangeEvent {
    BookAvailability(BookAvailability),
    CheckoutStatus(CheckoutDelta),
}

impl ChangeEvent {
    fn topics(&self) -> Vec<Topic> {
        match self {
            ChangeEvent::BookAvailability(delta) => {
                vec![Topic::BookAvailability(delta.book_id)]
            }
            ChangeEvent::CheckoutStatus(delta) => vec![
                Topic::Checkout(delta.checkout_id),
                Topic::UserCheckouts(delta.user_id),
            ],
        }
    }
}

/// Handle returned by [`ChangePropagator::subscribe`]; pass it back to
/// `unsubscribe` to tear the subscription down.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionHandle {
    topic: Topic,
    id: u64,
}

type Subscribers = HashMap<Topic, HashMap<u64, mpsc::UnboundedSender<ChangeEvent>>>;

/// Per-process fan-out of committed deltas, owned by [`crate::services::Services`]
pub struct ChangePropagator {
    subscribers: RwLock<Subscribers>,
    next_id: AtomicU64,
    running: AtomicBool,
}

impl Default for ChangePropagator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangePropagator {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Stop delivering and drop every registered subscriber.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.subscribers.write().await.clear();
    }

    pub async fn subscribe(
        &self,
        topic: Topic,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<ChangeEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .write()
            .await
            .entry(topic)
            .or_default()
            .insert(id, tx);
        (SubscriptionHandle { topic, id }, rx)
    }

    /// Idempotent: unsubscribing twice, or after `stop`, is a no-op.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(topic_subscribers) = subscribers.get_mut(&handle.topic) {
            topic_subscribers.remove(&handle.id);
            if topic_subscribers.is_empty() {
                subscribers.remove(&handle.topic);
            }
        }
    }

    /// Deliver to every live subscriber of the event's topics, pruning
    /// subscribers whose receiving end is gone.
    pub async fn publish(&self, event: ChangeEvent) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let mut subscribers = self.subscribers.write().await;
        for topic in event.topics() {
            if let Some(topic_subscribers) = subscribers.get_mut(&topic) {
                topic_subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
                if topic_subscribers.is_empty() {
                    subscribers.remove(&topic);
                }
            }
        }
    }

    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .read()
            .await
            .get(&topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn availability(book_id: Uuid, available_copies: i32) -> ChangeEvent {
        ChangeEvent::BookAvailability(BookAvailability {
            book_id,
            available_copies,
        })
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber_of_a_topic() {
        let propagator = ChangePropagator::new();
        propagator.start();
        let book_id = Uuid::new_v4();

        let (_h1, mut rx1) = propagator.subscribe(Topic::BookAvailability(book_id)).await;
        let (_h2, mut rx2) = propagator.subscribe(Topic::BookAvailability(book_id)).await;

        propagator.publish(availability(book_id, 3)).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn does_not_cross_topics() {
        let propagator = ChangePropagator::new();
        propagator.start();

        let (_h, mut rx) = propagator
            .subscribe(Topic::BookAvailability(Uuid::new_v4()))
            .await;
        propagator.publish(availability(Uuid::new_v4(), 1)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let propagator = ChangePropagator::new();
        propagator.start();
        let book_id = Uuid::new_v4();
        let topic = Topic::BookAvailability(book_id);

        let (handle, _rx) = propagator.subscribe(topic).await;
        assert_eq!(propagator.subscriber_count(topic).await, 1);

        propagator.unsubscribe(&handle).await;
        propagator.unsubscribe(&handle).await;
        assert_eq!(propagator.subscriber_count(topic).await, 0);

        // Safe on a torn-down propagator, too.
        propagator.stop().await;
        propagator.unsubscribe(&handle).await;
    }

    #[tokio::test]
    async fn prunes_dropped_subscribers() {
        let propagator = ChangePropagator::new();
        propagator.start();
        let book_id = Uuid::new_v4();
        let topic = Topic::BookAvailability(book_id);

        let (_handle, rx) = propagator.subscribe(topic).await;
        drop(rx);

        propagator.publish(availability(book_id, 2)).await;
        assert_eq!(propagator.subscriber_count(topic).await, 0);
    }

    #[tokio::test]
    async fn publishes_nothing_when_stopped() {
        let propagator = ChangePropagator::new();
        propagator.start();
        let book_id = Uuid::new_v4();

        let (_handle, mut rx) = propagator.subscribe(Topic::BookAvailability(book_id)).await;
        propagator.stop().await;
        propagator.publish(availability(book_id, 1)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn checkout_events_reach_both_checkout_and_user_topics() {
        let propagator = ChangePropagator::new();
        propagator.start();

        let checkout_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let (_h1, mut by_id) = propagator.subscribe(Topic::Checkout(checkout_id)).await;
        let (_h2, mut by_user) = propagator.subscribe(Topic::UserCheckouts(user_id)).await;

        propagator
            .publish(ChangeEvent::CheckoutStatus(CheckoutDelta {
                checkout_id,
                user_id,
                book_id: Uuid::new_v4(),
                status: CheckoutStatus::Active,
                due_date: Utc::now(),
            }))
            .await;

        assert!(by_id.try_recv().is_ok());
        assert!(by_user.try_recv().is_ok());
    }
}
