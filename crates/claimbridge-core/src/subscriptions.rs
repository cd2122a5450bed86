//! Durable alias-scoped subscriptions

use crate::handler::{Lifetime, Subscription};
use claimbridge_types::{Alias, SubscriptionId};
use dashmap::DashMap;
use tracing::debug;

/// Alias → durable subscriptions
pub struct SubscriptionRegistry {
    by_alias: DashMap<Alias, Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            by_alias: DashMap::new(),
        }
    }

    /// Attach a durable subscription to `alias`.
    ///
    /// One-shot subscriptions are promoted: an alias channel fires for every
    /// ticket until it is removed.
    pub fn subscribe(&self, alias: &Alias, subscription: Subscription) -> SubscriptionId {
        let subscription = match subscription.lifetime() {
            Lifetime::Durable => subscription,
            Lifetime::OneShot => Subscription::promote(subscription),
        };
        let id = subscription.id();
        self.by_alias
            .entry(alias.clone())
            .or_default()
            .push(subscription);
        debug!(alias = %alias, subscription_id = %id, "Subscribed");
        id
    }

    /// Remove one subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, alias: &Alias, id: &SubscriptionId) -> bool {
        let mut removed = false;
        if let Some(mut subs) = self.by_alias.get_mut(alias) {
            let before = subs.len();
            subs.retain(|s| &s.id() != id);
            removed = subs.len() != before;
        }
        self.by_alias.remove_if(alias, |_, subs| subs.is_empty());
        removed
    }

    /// Drop every subscription of `alias`. Returns how many were removed.
    pub fn teardown(&self, alias: &Alias) -> usize {
        let removed = self
            .by_alias
            .remove(alias)
            .map(|(_, subs)| subs.len())
            .unwrap_or(0);
        if removed > 0 {
            debug!(alias = %alias, removed, "Subscriptions torn down");
        }
        removed
    }

    /// Copy of the current subscriptions of `alias`.
    ///
    /// Delivery schedules from this copy, so a handler may subscribe or
    /// unsubscribe without deadlocking the registry.
    pub fn snapshot(&self, alias: &Alias) -> Vec<Subscription> {
        self.by_alias
            .get(alias)
            .map(|subs| subs.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, alias: &Alias) -> usize {
        self.by_alias.get(alias).map(|subs| subs.len()).unwrap_or(0)
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
