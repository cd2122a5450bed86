//! Identity engine contract
//!
//! The engine performs the actual issuance and verification work. The bridge
//! hands it an [`Operation`] together with a [`CompletionSink`]; the engine
//! later reports status checks and the terminal result through the sink,
//! from whatever thread it likes.

pub mod simulated;

use crate::claims::ClaimCache;
use crate::dispatcher::{DeliveryOutcome, Dispatcher};
use crate::error::ClaimError;
use claimbridge_types::{Alias, Claim, EngineError, Ticket, TicketId};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

pub use simulated::{Script, ScriptBook, SimulatedEngine};

/// Work submitted to the engine
#[derive(Debug, Clone)]
pub enum Operation {
    /// Ask an issuer for a claim over `data`
    RequestClaim {
        ticket: Ticket,
        issuer_url: Url,
        data: String,
    },
    /// Prove a held claim to a verifier
    ProveClaim {
        ticket: Ticket,
        verifier_url: Url,
        claim: Claim,
    },
}

impl Operation {
    pub fn ticket(&self) -> &Ticket {
        match self {
            Operation::RequestClaim { ticket, .. } | Operation::ProveClaim { ticket, .. } => ticket,
        }
    }

    /// Remote endpoint the operation talks to.
    pub fn endpoint(&self) -> &Url {
        match self {
            Operation::RequestClaim { issuer_url, .. } => issuer_url,
            Operation::ProveClaim { verifier_url, .. } => verifier_url,
        }
    }
}

/// The external identity engine
///
/// Implementations must not block: `submit` queues the work and returns.
pub trait IdentityEngine: Send + Sync {
    fn create_identity(&self, alias: &Alias) -> Result<(), EngineError>;

    fn submit(&self, operation: Operation, sink: CompletionSink) -> Result<(), EngineError>;

    fn discard_identity(&self, alias: &Alias) -> Result<(), EngineError>;
}

/// Engine-facing side of the bridge
#[derive(Clone)]
pub struct CompletionSink {
    dispatcher: Dispatcher,
    claims: Arc<ClaimCache>,
}

impl CompletionSink {
    pub fn new(dispatcher: Dispatcher, claims: Arc<ClaimCache>) -> Self {
        Self { dispatcher, claims }
    }

    /// Report the terminal result of a ticket.
    pub fn complete(
        &self,
        ticket_id: &TicketId,
        payload: Option<Value>,
        error: Option<EngineError>,
    ) -> DeliveryOutcome {
        self.dispatcher
            .on_operation_complete(ticket_id, payload, error)
    }

    /// Same as [`complete`](Self::complete), from a `Result`.
    pub fn deliver(
        &self,
        ticket_id: &TicketId,
        result: Result<Value, EngineError>,
    ) -> DeliveryOutcome {
        self.dispatcher.deliver(ticket_id, result)
    }

    /// Report a status check on a still-running ticket.
    pub fn touch(&self, ticket_id: &TicketId) -> bool {
        self.dispatcher.touch(ticket_id)
    }

    /// Store a claim issued for `ticket` in the local claim cache.
    pub fn record_claim(
        &self,
        ticket: &Ticket,
        issuer: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Claim, ClaimError> {
        self.claims.record(&ticket.id, &ticket.alias, issuer, bytes)
    }
}
