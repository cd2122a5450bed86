//! Response dispatcher
//!
//! Receives engine results tagged with a ticket id, retires the ticket in the
//! store and routes the event to whoever is listening: the ticket's one-shot
//! handler first, then every durable subscription of the ticket's alias.

use crate::error::StoreError;
use crate::store::TicketStore;
use crate::subscriptions::SubscriptionRegistry;
use chrono::Utc;
use claimbridge_types::{EngineError, Outcome, TicketId};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to a delivered result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handed to listeners
    Dispatched { one_shot: bool, durable: usize },
    /// Ticket terminated but nobody was listening; kept for catch-up
    Retained,
    /// No such ticket; result dropped
    UnknownTicket,
    /// Ticket had already terminated; result dropped
    AlreadyTerminal,
}

impl DeliveryOutcome {
    /// Whether the result moved a ticket to its terminal state.
    pub fn accepted(&self) -> bool {
        matches!(
            self,
            DeliveryOutcome::Dispatched { .. } | DeliveryOutcome::Retained
        )
    }
}

const NEITHER_PAYLOAD_NOR_ERROR: &str = "engine reported neither payload nor error";

/// Routes engine results to handlers
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<TicketStore>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl Dispatcher {
    pub fn new(store: Arc<TicketStore>, subscriptions: Arc<SubscriptionRegistry>) -> Self {
        Self {
            store,
            subscriptions,
        }
    }

    pub fn store(&self) -> &Arc<TicketStore> {
        &self.store
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    /// Deliver the terminal result of a ticket.
    ///
    /// Never fails towards the engine: consistency violations are logged and
    /// reported through the returned [`DeliveryOutcome`].
    pub fn deliver(
        &self,
        ticket_id: &TicketId,
        result: Result<Value, EngineError>,
    ) -> DeliveryOutcome {
        let transitioned = match self.store.transition(ticket_id, Outcome::from_result(result)) {
            Ok(t) => t,
            Err(StoreError::UnknownTicket(_)) => {
                warn!(ticket_id = %ticket_id, "Result for unknown ticket dropped");
                return DeliveryOutcome::UnknownTicket;
            }
            Err(e) => {
                warn!(ticket_id = %ticket_id, error = %e, "Duplicate result dropped");
                return DeliveryOutcome::AlreadyTerminal;
            }
        };

        // Store lock is released here; handlers may call back into the bridge.
        let event = transitioned.event;
        let durable = self.subscriptions.snapshot(&event.alias);

        let one_shot = match transitioned.handler {
            Some(handler) => {
                let handed_off = handler.schedule(event.clone());
                if !handed_off {
                    // Keep the result for whoever registers next.
                    if let Err(e) = self.store.release(ticket_id) {
                        warn!(ticket_id = %ticket_id, error = %e, "Could not release handler slot");
                    }
                }
                handed_off
            }
            None => false,
        };

        for subscription in &durable {
            subscription.schedule(event.clone());
        }

        debug!(
            ticket_id = %ticket_id,
            alias = %event.alias,
            event_type = event.event_type(),
            one_shot,
            durable = durable.len(),
            "Result dispatched"
        );

        if !one_shot && durable.is_empty() {
            DeliveryOutcome::Retained
        } else {
            DeliveryOutcome::Dispatched {
                one_shot,
                durable: durable.len(),
            }
        }
    }

    /// Engine-facing completion callback.
    ///
    /// When both a payload and an error are reported the error wins.
    pub fn on_operation_complete(
        &self,
        ticket_id: &TicketId,
        payload: Option<Value>,
        error: Option<EngineError>,
    ) -> DeliveryOutcome {
        let result = match (payload, error) {
            (_, Some(error)) => Err(error),
            (Some(payload), None) => Ok(payload),
            (None, None) => Err(EngineError::new(NEITHER_PAYLOAD_NOR_ERROR)),
        };
        self.deliver(ticket_id, result)
    }

    /// Record an engine status check. Returns `false` for unknown tickets.
    pub fn touch(&self, ticket_id: &TicketId) -> bool {
        match self.store.touch(ticket_id, Utc::now()) {
            Ok(()) => true,
            Err(e) => {
                warn!(ticket_id = %ticket_id, error = %e, "Status check for unknown ticket");
                false
            }
        }
    }
}
