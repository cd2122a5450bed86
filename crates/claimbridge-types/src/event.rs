//! Events handed to one-shot handlers and alias subscribers

use crate::{Alias, EngineError, Outcome, Ticket, TicketId, TicketKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a finished operation, as seen by handlers
///
/// One-shot handlers read it as `(ticket_id, payload, error)`; alias
/// subscribers as `(event_type, payload, error)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Ticket the result belongs to
    pub ticket_id: TicketId,

    /// Operation kind (doubles as the alias event type)
    pub kind: TicketKind,

    /// Identity that issued the request
    pub alias: Alias,

    /// When the ticket reached its terminal state
    pub completed_at: DateTime<Utc>,

    /// Success payload or engine error
    pub outcome: Outcome,
}

impl Event {
    pub fn new(ticket: &Ticket, outcome: Outcome) -> Self {
        Self {
            ticket_id: ticket.id,
            kind: ticket.kind,
            alias: ticket.alias.clone(),
            completed_at: ticket.last_checked,
            outcome,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.outcome.payload()
    }

    pub fn error(&self) -> Option<&EngineError> {
        self.outcome.error()
    }
}
