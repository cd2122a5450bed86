//! Ticket store
//!
//! The single shared mutable structure of the bridge: ticket id → ticket
//! state plus its pending registration. All synchronization is internal.
//!
//! Policy for `register` racing `transition`: both run under the same write
//! lock, so one of them wins outright.
//! - `register` first: the handler is attached and `transition` hands it
//!   back to the dispatcher to fire.
//! - `transition` first: the outcome is kept, and the later `register`
//!   receives it as [`Registration::CatchUp`] to run synchronously
//!   (late-registration catch-up).
//!
//! Nothing returned from here runs while the lock is held.

use crate::error::StoreError;
use crate::handler::Subscription;
use chrono::{DateTime, Utc};
use claimbridge_types::{Alias, Event, Outcome, Ticket, TicketId, TicketKind, TicketState};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Handler slot of a ticket
enum Slot {
    /// Nobody is waiting (never registered, or abandoned)
    Empty,
    /// A handler waits for the outcome
    Attached(Subscription),
    /// The handler already received the outcome
    Consumed,
}

struct Entry {
    ticket: Ticket,
    slot: Slot,
    outcome: Option<Outcome>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<TicketId, Entry>,
    /// Insertion order; append-only
    order: Vec<TicketId>,
}

/// Result of [`TicketStore::register`]
#[derive(Debug)]
pub enum Registration {
    /// Handler attached; it fires when the ticket terminates
    Attached,
    /// Ticket already terminal; run the handler now with this event
    CatchUp {
        subscription: Subscription,
        event: Event,
    },
}

/// Result of a successful [`TicketStore::transition`]
#[derive(Debug)]
pub struct Transitioned {
    /// Event describing the terminal result
    pub event: Event,
    /// Handler that was waiting, if any
    pub handler: Option<Subscription>,
}

/// Concurrent ticket registry
#[derive(Default)]
pub struct TicketStore {
    inner: RwLock<Inner>,
}

impl TicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh pending ticket with an empty handler slot.
    pub fn create(&self, kind: TicketKind, alias: Alias) -> Ticket {
        self.insert(Ticket::new(kind, alias), Slot::Empty)
    }

    /// Insert a fresh pending ticket with `handler` already attached.
    pub fn create_with(&self, kind: TicketKind, alias: Alias, handler: Subscription) -> Ticket {
        self.insert(Ticket::new(kind, alias), Slot::Attached(handler))
    }

    fn insert(&self, ticket: Ticket, slot: Slot) -> Ticket {
        let snapshot = ticket.clone();
        let mut inner = self.inner.write();
        inner.order.push(ticket.id);
        inner.entries.insert(
            ticket.id,
            Entry {
                ticket,
                slot,
                outcome: None,
            },
        );
        debug!(ticket_id = %snapshot.id, kind = %snapshot.kind, alias = %snapshot.alias, "Ticket created");
        snapshot
    }

    /// Attach exactly one handler to a ticket.
    pub fn register(
        &self,
        ticket_id: &TicketId,
        handler: Subscription,
    ) -> Result<Registration, StoreError> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(ticket_id)
            .ok_or(StoreError::UnknownTicket(*ticket_id))?;

        match entry.slot {
            Slot::Attached(_) | Slot::Consumed => Err(StoreError::AlreadyRegistered(*ticket_id)),
            Slot::Empty => match &entry.outcome {
                None => {
                    entry.slot = Slot::Attached(handler);
                    Ok(Registration::Attached)
                }
                Some(outcome) => {
                    let event = Event::new(&entry.ticket, outcome.clone());
                    entry.slot = Slot::Consumed;
                    debug!(ticket_id = %ticket_id, "Late registration catches up");
                    Ok(Registration::CatchUp {
                        subscription: handler,
                        event,
                    })
                }
            },
        }
    }

    /// Detach the waiting handler without touching the ticket state.
    ///
    /// Returns `true` if a handler was detached. A later outcome is kept and
    /// can be picked up by a new registration.
    pub fn abandon(&self, ticket_id: &TicketId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(ticket_id)
            .ok_or(StoreError::UnknownTicket(*ticket_id))?;

        if matches!(entry.slot, Slot::Attached(_)) {
            entry.slot = Slot::Empty;
            debug!(ticket_id = %ticket_id, "Handler abandoned");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Read-only snapshot of one ticket.
    pub fn lookup(&self, ticket_id: &TicketId) -> Option<Ticket> {
        self.inner
            .read()
            .entries
            .get(ticket_id)
            .map(|e| e.ticket.clone())
    }

    /// Terminal outcome of a ticket, if it has one.
    pub fn outcome(&self, ticket_id: &TicketId) -> Option<Outcome> {
        self.inner
            .read()
            .entries
            .get(ticket_id)
            .and_then(|e| e.outcome.clone())
    }

    /// Point-in-time snapshot of every ticket, in insertion order.
    pub fn list(&self) -> TicketSnapshot {
        let inner = self.inner.read();
        let tickets: Vec<Ticket> = inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(|e| e.ticket.clone())
            .collect();
        TicketSnapshot {
            tickets: tickets.into(),
        }
    }

    /// Snapshot of tickets still pending, in insertion order.
    pub fn pending(&self) -> Vec<Ticket> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .filter(|e| e.ticket.state == TicketState::Pending)
            .map(|e| e.ticket.clone())
            .collect()
    }

    /// Record that the engine checked on a ticket.
    pub fn touch(&self, ticket_id: &TicketId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(ticket_id)
            .ok_or(StoreError::UnknownTicket(*ticket_id))?;
        entry.ticket.touch(at);
        Ok(())
    }

    /// Move a pending ticket to its terminal state.
    ///
    /// Only the dispatcher calls this. Runs at most once per ticket; later
    /// calls fail with `AlreadyTerminal`.
    pub(crate) fn transition(
        &self,
        ticket_id: &TicketId,
        outcome: Outcome,
    ) -> Result<Transitioned, StoreError> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(ticket_id)
            .ok_or(StoreError::UnknownTicket(*ticket_id))?;

        if entry.ticket.is_terminal() {
            return Err(StoreError::AlreadyTerminal(*ticket_id));
        }

        entry.ticket.state = outcome.state();
        entry.ticket.touch(Utc::now());
        let event = Event::new(&entry.ticket, outcome.clone());
        entry.outcome = Some(outcome);

        let handler = match std::mem::replace(&mut entry.slot, Slot::Empty) {
            Slot::Attached(handler) => {
                entry.slot = Slot::Consumed;
                Some(handler)
            }
            Slot::Empty => None,
            Slot::Consumed => {
                entry.slot = Slot::Consumed;
                None
            }
        };

        debug!(
            ticket_id = %ticket_id,
            state = %entry.ticket.state,
            has_handler = handler.is_some(),
            "Ticket transitioned"
        );

        Ok(Transitioned { event, handler })
    }

    /// Detach the consumed handler of a terminal ticket whose event could
    /// not be handed off, so a later registration catches up.
    pub(crate) fn release(&self, ticket_id: &TicketId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let entry = inner
            .entries
            .get_mut(ticket_id)
            .ok_or(StoreError::UnknownTicket(*ticket_id))?;
        if matches!(entry.slot, Slot::Consumed) {
            entry.slot = Slot::Empty;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable, restartable view of the store at one instant
#[derive(Debug, Clone)]
pub struct TicketSnapshot {
    tickets: Arc<[Ticket]>,
}

impl TicketSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, Ticket> {
        self.tickets.iter()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Keep only the tickets matching `predicate`.
    pub fn filter(&self, predicate: impl Fn(&Ticket) -> bool) -> TicketSnapshot {
        let tickets: Vec<Ticket> = self.tickets.iter().filter(|t| predicate(t)).cloned().collect();
        TicketSnapshot {
            tickets: tickets.into(),
        }
    }

    pub fn to_vec(&self) -> Vec<Ticket> {
        self.tickets.to_vec()
    }
}

impl<'a> IntoIterator for &'a TicketSnapshot {
    type Item = &'a Ticket;
    type IntoIter = std::slice::Iter<'a, Ticket>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
