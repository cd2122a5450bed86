//! Ticket entity and its lifecycle

use crate::{Alias, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of asynchronous operation a ticket tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketKind {
    /// Request a claim from an issuer
    ClaimIssuanceRequest,
    /// Send a proof derived from a held claim to a verifier
    ClaimVerificationRequest,
}

impl TicketKind {
    /// Event type name delivered to alias-scoped subscribers.
    pub fn event_type(&self) -> &'static str {
        match self {
            TicketKind::ClaimIssuanceRequest => "RequestClaim",
            TicketKind::ClaimVerificationRequest => "ProveClaim",
        }
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

/// Lifecycle state of a ticket
///
/// `Pending` moves exactly once to one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketState {
    Pending,
    Delivered,
    Errored,
}

impl TicketState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TicketState::Pending)
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketState::Pending => "pending",
            TicketState::Delivered => "delivered",
            TicketState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Opaque failure reported by the identity engine
///
/// Passed through to handlers verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for EngineError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for EngineError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Terminal result of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Delivered(serde_json::Value),
    Errored(EngineError),
}

impl Outcome {
    pub fn from_result(result: Result<serde_json::Value, EngineError>) -> Self {
        match result {
            Ok(payload) => Outcome::Delivered(payload),
            Err(error) => Outcome::Errored(error),
        }
    }

    /// Terminal state this outcome moves a ticket into.
    pub fn state(&self) -> TicketState {
        match self {
            Outcome::Delivered(_) => TicketState::Delivered,
            Outcome::Errored(_) => TicketState::Errored,
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Outcome::Delivered(payload) => Some(payload),
            Outcome::Errored(_) => None,
        }
    }

    pub fn error(&self) -> Option<&EngineError> {
        match self {
            Outcome::Delivered(_) => None,
            Outcome::Errored(error) => Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Errored(_))
    }
}

/// Correlation token plus metadata for one asynchronous operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier
    pub id: TicketId,

    /// Operation this ticket tracks
    pub kind: TicketKind,

    /// Identity that issued the request
    pub alias: Alias,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last time the engine reported on this ticket
    pub last_checked: DateTime<Utc>,

    /// Current lifecycle state
    pub state: TicketState,
}

impl Ticket {
    /// Create a fresh pending ticket.
    pub fn new(kind: TicketKind, alias: Alias) -> Self {
        let now = Utc::now();
        Self {
            id: TicketId::generate(),
            kind,
            alias,
            created_at: now,
            last_checked: now,
            state: TicketState::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Advance `last_checked`; never moves it backwards.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_checked {
            self.last_checked = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_ticket_is_pending() {
        let ticket = Ticket::new(TicketKind::ClaimIssuanceRequest, Alias::from("alice"));
        assert_eq!(ticket.state, TicketState::Pending);
        assert!(!ticket.is_terminal());
        assert_eq!(ticket.created_at, ticket.last_checked);
    }

    #[test]
    fn touch_is_monotonic() {
        let mut ticket = Ticket::new(TicketKind::ClaimIssuanceRequest, Alias::from("alice"));
        let later = ticket.last_checked + Duration::seconds(5);
        ticket.touch(later);
        assert_eq!(ticket.last_checked, later);

        ticket.touch(later - Duration::seconds(60));
        assert_eq!(ticket.last_checked, later);
    }

    #[test]
    fn outcome_maps_to_terminal_state() {
        let ok = Outcome::from_result(Ok(serde_json::json!({"ok": true})));
        assert_eq!(ok.state(), TicketState::Delivered);
        assert!(ok.payload().is_some());

        let err = Outcome::from_result(Err(EngineError::new("network timeout")));
        assert_eq!(err.state(), TicketState::Errored);
        assert_eq!(err.error().map(|e| e.message.as_str()), Some("network timeout"));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(TicketKind::ClaimIssuanceRequest.event_type(), "RequestClaim");
        assert_eq!(TicketKind::ClaimVerificationRequest.to_string(), "ProveClaim");
    }
}
