//! In-memory identity engine
//!
//! Stands in for the external engine in tests and the CLI demo. Every
//! submitted operation follows a [`Script`] and needs a configured number of
//! status checks before it completes. Checks happen either through the
//! [`TicketProbe`] impl (driven by the pending poller) or through
//! [`SimulatedEngine::advance`].

use super::{CompletionSink, IdentityEngine, Operation};
use crate::poller::{ProbeStatus, TicketProbe};
use async_trait::async_trait;
use claimbridge_types::{Alias, EngineError, Ticket, TicketId};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// How a simulated operation ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Issuer issues the claim / verifier accepts the proof
    Approve,
    /// Issuer or verifier says no
    Reject,
    /// The operation fails with this message (e.g. a network timeout)
    Fail(String),
    /// `submit` itself refuses the operation with this message
    Refuse(String),
}

/// Scripts keyed by request data (issuance) or verifier URL (verification)
#[derive(Debug, Clone)]
pub struct ScriptBook {
    default: Script,
    by_key: HashMap<String, Script>,
    checks_before_completion: u32,
}

impl ScriptBook {
    pub fn new(default: Script) -> Self {
        Self {
            default,
            by_key: HashMap::new(),
            checks_before_completion: 0,
        }
    }

    /// Script operations whose data or verifier URL equals `key`.
    pub fn on(mut self, key: impl Into<String>, script: Script) -> Self {
        self.by_key.insert(key.into(), script);
        self
    }

    /// Status checks that report "pending" before an operation completes.
    pub fn with_checks(mut self, checks: u32) -> Self {
        self.checks_before_completion = checks;
        self
    }

    fn script_for(&self, operation: &Operation) -> Script {
        let key = match operation {
            Operation::RequestClaim { data, .. } => data.as_str(),
            Operation::ProveClaim { verifier_url, .. } => verifier_url.as_str(),
        };
        self.by_key
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

impl Default for ScriptBook {
    fn default() -> Self {
        Self::new(Script::Approve)
    }
}

struct InFlight {
    operation: Operation,
    sink: CompletionSink,
    script: Script,
    checks_left: u32,
}

/// Scripted stand-in for the identity engine
pub struct SimulatedEngine {
    book: RwLock<ScriptBook>,
    identities: RwLock<HashSet<Alias>>,
    in_flight: DashMap<TicketId, InFlight>,
}

impl SimulatedEngine {
    pub fn new(book: ScriptBook) -> Self {
        Self {
            book: RwLock::new(book),
            identities: RwLock::new(HashSet::new()),
            in_flight: DashMap::new(),
        }
    }

    /// Replace the script book for operations submitted from now on.
    pub fn set_book(&self, book: ScriptBook) {
        *self.book.write() = book;
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Run one status check on every in-flight operation and report through
    /// each operation's sink. Returns how many operations completed.
    pub fn advance(&self) -> usize {
        let ids: Vec<TicketId> = self.in_flight.iter().map(|e| *e.key()).collect();
        let mut completed = 0;
        for id in ids {
            let Some((status, sink)) = self.check(&id) else {
                continue;
            };
            match status {
                ProbeStatus::Done(result) => {
                    sink.deliver(&id, result);
                    completed += 1;
                }
                ProbeStatus::Pending => {
                    sink.touch(&id);
                }
                ProbeStatus::Untracked => {}
            }
        }
        completed
    }

    /// Keep calling [`advance`](Self::advance) until nothing is in flight.
    pub fn run_to_completion(&self) -> usize {
        let mut completed = 0;
        while !self.in_flight.is_empty() {
            completed += self.advance();
        }
        completed
    }

    /// One status check. Finishing removes the operation.
    fn check(&self, ticket_id: &TicketId) -> Option<(ProbeStatus, CompletionSink)> {
        {
            let mut entry = self.in_flight.get_mut(ticket_id)?;
            if entry.checks_left > 0 {
                entry.checks_left -= 1;
                return Some((ProbeStatus::Pending, entry.sink.clone()));
            }
        }

        let (_, flight) = self.in_flight.remove(ticket_id)?;
        let result = finish(&flight);
        Some((ProbeStatus::Done(result), flight.sink))
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(ScriptBook::default())
    }
}

fn finish(flight: &InFlight) -> Result<Value, EngineError> {
    match (&flight.script, &flight.operation) {
        (Script::Approve, Operation::RequestClaim { ticket, issuer_url, data }) => {
            let claim = flight
                .sink
                .record_claim(ticket, issuer_url.as_str(), data.as_bytes().to_vec())
                .map_err(|e| EngineError::new(e.to_string()))?;
            Ok(json!({ "status": "approved", "claim_id": claim.id }))
        }
        (Script::Approve, Operation::ProveClaim { verifier_url, claim, .. }) => Ok(json!({
            "status": "verified",
            "claim_id": claim.id,
            "verifier": verifier_url.as_str(),
        })),
        (Script::Reject, Operation::RequestClaim { .. }) => {
            Err(EngineError::new("claim request rejected by issuer"))
        }
        (Script::Reject, Operation::ProveClaim { .. }) => {
            Err(EngineError::new("proof rejected by verifier"))
        }
        (Script::Fail(message), _) | (Script::Refuse(message), _) => {
            Err(EngineError::new(message.clone()))
        }
    }
}

impl IdentityEngine for SimulatedEngine {
    fn create_identity(&self, alias: &Alias) -> Result<(), EngineError> {
        if !self.identities.write().insert(alias.clone()) {
            return Err(EngineError::new(format!("identity {alias} already exists")));
        }
        info!(alias = %alias, "Simulated identity created");
        Ok(())
    }

    fn submit(&self, operation: Operation, sink: CompletionSink) -> Result<(), EngineError> {
        let ticket: &Ticket = operation.ticket();
        if !self.identities.read().contains(&ticket.alias) {
            return Err(EngineError::new(format!("no identity {}", ticket.alias)));
        }

        let book = self.book.read();
        let script = book.script_for(&operation);
        if let Script::Refuse(message) = &script {
            return Err(EngineError::new(message.clone()));
        }

        let ticket_id = ticket.id;
        debug!(
            ticket_id = %ticket_id,
            endpoint = %operation.endpoint(),
            script = ?script,
            "Simulated operation accepted"
        );
        self.in_flight.insert(
            ticket_id,
            InFlight {
                operation,
                sink,
                script,
                checks_left: book.checks_before_completion,
            },
        );
        Ok(())
    }

    fn discard_identity(&self, alias: &Alias) -> Result<(), EngineError> {
        if !self.identities.write().remove(alias) {
            return Err(EngineError::new(format!("no identity {alias}")));
        }
        info!(alias = %alias, "Simulated identity discarded");
        Ok(())
    }
}

#[async_trait]
impl TicketProbe for SimulatedEngine {
    async fn probe(&self, ticket: &Ticket) -> ProbeStatus {
        match self.check(&ticket.id) {
            Some((status, _)) => status,
            None => ProbeStatus::Untracked,
        }
    }
}
