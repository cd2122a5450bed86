//! Error types for the bridge

use claimbridge_types::{Alias, ClaimId, TicketId};
use thiserror::Error;

/// Ticket store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown ticket: {0}")]
    UnknownTicket(TicketId),

    #[error("handler already registered for {0}")]
    AlreadyRegistered(TicketId),

    #[error("ticket already terminal: {0}")]
    AlreadyTerminal(TicketId),
}

/// Caller argument errors, raised before any ticket exists
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required field is empty: {0}")]
    EmptyField(&'static str),

    #[error("{field} exceeds its length limit of {max}")]
    TooLong { field: &'static str, max: usize },

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("no claim at index {index} for {alias}")]
    UnknownClaim { alias: Alias, index: usize },

    #[error("invalid alias {alias:?}: {reason}")]
    InvalidAlias { alias: String, reason: &'static str },
}

/// Claim cache errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("claim already stored: {0}")]
    Duplicate(ClaimId),

    #[error("claim not found: {0}")]
    NotFound(ClaimId),
}

/// Execution context errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("execution context {0} is closed")]
    Closed(String),
}

/// Failure reported by an event handler
///
/// Logged by whoever ran the handler; never propagated to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by the identity facade
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("identity already active: {0}")]
    AliasInUse(Alias),

    #[error("no active identity: {0}")]
    UnknownAlias(Alias),

    #[error("engine refused identity operation: {0}")]
    Engine(#[from] claimbridge_types::EngineError),
}

/// Result type for facade operations
pub type Result<T> = std::result::Result<T, BridgeError>;
