//! Awaitable and pull-based views over handler delivery

use crate::error::HandlerError;
use crate::handler::Subscription;
use crate::subscriptions::SubscriptionRegistry;
use claimbridge_types::{Alias, Event, SubscriptionId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Future-style wait for one ticket's event
pub struct TicketWaiter {
    receiver: oneshot::Receiver<Event>,
}

impl TicketWaiter {
    /// Create a waiter and the one-shot subscription that feeds it.
    pub fn channel() -> (Subscription, TicketWaiter) {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let subscription = Subscription::one_shot(move |event: &Event| {
            if let Some(tx) = slot.lock().take() {
                // The waiter may have been dropped; nothing to report then.
                let _ = tx.send(event.clone());
            }
            Ok(())
        });
        (subscription, TicketWaiter { receiver: rx })
    }

    /// Wait for the event. Returns `None` if the subscription was dropped
    /// without firing (for example after the ticket was abandoned).
    pub async fn wait(self) -> Option<Event> {
        self.receiver.await.ok()
    }

    /// Take the event if it has already arrived.
    pub fn try_take(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

/// Pull-based durable subscription for one alias
///
/// Detaches itself from the registry when dropped.
pub struct EventInbox {
    receiver: mpsc::UnboundedReceiver<Event>,
    registry: Arc<SubscriptionRegistry>,
    alias: Alias,
    subscription_id: SubscriptionId,
}

impl EventInbox {
    pub fn attach(registry: Arc<SubscriptionRegistry>, alias: Alias) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = Subscription::durable(move |event: &Event| {
            tx.send(event.clone())
                .map_err(|_| HandlerError::new("inbox receiver dropped"))
        });
        let subscription_id = registry.subscribe(&alias, subscription);
        Self {
            receiver: rx,
            registry,
            alias,
            subscription_id,
        }
    }

    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    /// Next event, waiting if none is queued. `None` once the alias has been
    /// torn down and the queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Next queued event, if any.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for EventInbox {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.alias, &self.subscription_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimbridge_types::{Outcome, Ticket, TicketKind};
    use serde_json::json;

    fn event(alias: &str) -> Event {
        let ticket = Ticket::new(TicketKind::ClaimIssuanceRequest, Alias::from(alias));
        Event::new(&ticket, Outcome::Delivered(json!({"n": 1})))
    }

    #[tokio::test]
    async fn waiter_resolves_once() {
        let (sub, waiter) = TicketWaiter::channel();
        let e = event("alice");
        sub.invoke(&e);
        sub.invoke(&event("alice"));
        assert_eq!(waiter.wait().await, Some(e));
    }

    #[tokio::test]
    async fn waiter_without_delivery_yields_none() {
        let (sub, waiter) = TicketWaiter::channel();
        drop(sub);
        assert_eq!(waiter.wait().await, None);
    }

    #[tokio::test]
    async fn inbox_receives_in_order_and_detaches() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let alice = Alias::from("alice");
        let mut inbox = EventInbox::attach(registry.clone(), alice.clone());
        assert_eq!(registry.count(&alice), 1);

        let (a, b) = (event("alice"), event("alice"));
        for sub in registry.snapshot(&alice) {
            sub.invoke(&a);
            sub.invoke(&b);
        }

        assert_eq!(inbox.recv().await, Some(a));
        assert_eq!(inbox.try_recv(), Some(b));
        assert_eq!(inbox.try_recv(), None);

        drop(inbox);
        assert_eq!(registry.count(&alice), 0);
    }
}
