//! Identity facade
//!
//! The narrow call surface presentation layers use. Every request creates a
//! ticket, hands the work to the engine and returns at once; results arrive
//! later through handlers, waiters or inboxes.

use crate::claims::ClaimCache;
use crate::config::{BridgeConfig, ValidationConfig};
use crate::dispatcher::Dispatcher;
use crate::engine::{CompletionSink, IdentityEngine, Operation};
use crate::error::{BridgeError, Result, StoreError, ValidationError};
use crate::handler::Subscription;
use crate::poller::{PendingPoller, PollerHandle, TicketProbe};
use crate::store::{Registration, TicketSnapshot, TicketStore};
use crate::subscriptions::SubscriptionRegistry;
use crate::waiter::{EventInbox, TicketWaiter};
use claimbridge_types::{Alias, Claim, SubscriptionId, Ticket, TicketId, TicketKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Lifecycle of an alias in the bridge; the engine is called outside the
/// lock while an alias is `Creating` or `Discarding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentityState {
    Creating,
    Active,
    Discarding,
}

struct BridgeInner {
    config: BridgeConfig,
    engine: Arc<dyn IdentityEngine>,
    dispatcher: Dispatcher,
    claims: Arc<ClaimCache>,
    identities: RwLock<HashMap<Alias, IdentityState>>,
}

/// Entry point owning the store, dispatcher and claim cache
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, engine: Arc<dyn IdentityEngine>) -> Self {
        let store = Arc::new(TicketStore::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        Self {
            inner: Arc::new(BridgeInner {
                config,
                engine,
                dispatcher: Dispatcher::new(store, subscriptions),
                claims: Arc::new(ClaimCache::new()),
                identities: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Sink the engine reports results through.
    pub fn sink(&self) -> CompletionSink {
        CompletionSink::new(self.inner.dispatcher.clone(), self.inner.claims.clone())
    }

    fn store(&self) -> &Arc<TicketStore> {
        self.inner.dispatcher.store()
    }

    /// Create an identity in the engine and activate it here.
    pub fn create_identity(&self, alias: impl Into<Alias>) -> Result<Identity> {
        let alias = alias.into();
        validate_alias(&alias, &self.inner.config.validation)?;

        {
            let mut identities = self.inner.identities.write();
            if identities.contains_key(&alias) {
                return Err(BridgeError::AliasInUse(alias));
            }
            identities.insert(alias.clone(), IdentityState::Creating);
        }

        if let Err(e) = self.inner.engine.create_identity(&alias) {
            self.inner.identities.write().remove(&alias);
            return Err(e.into());
        }
        self.inner
            .identities
            .write()
            .insert(alias.clone(), IdentityState::Active);

        info!(alias = %alias, "Identity created");
        Ok(self.handle(alias))
    }

    /// Handle to an active identity.
    pub fn identity(&self, alias: impl Into<Alias>) -> Result<Identity> {
        let alias = alias.into();
        if !self.is_active(&alias) {
            return Err(BridgeError::UnknownAlias(alias));
        }
        Ok(self.handle(alias))
    }

    /// Discard an identity: tears down its subscriptions and claims. Its
    /// tickets stay queryable and in-flight results are still retained.
    pub fn discard_identity(&self, alias: impl Into<Alias>) -> Result<()> {
        let alias = alias.into();
        {
            let mut identities = self.inner.identities.write();
            match identities.get_mut(&alias) {
                Some(state) if *state == IdentityState::Active => {
                    *state = IdentityState::Discarding;
                }
                _ => return Err(BridgeError::UnknownAlias(alias)),
            }
        }

        if let Err(e) = self.inner.engine.discard_identity(&alias) {
            self.inner
                .identities
                .write()
                .insert(alias.clone(), IdentityState::Active);
            return Err(e.into());
        }
        self.inner.identities.write().remove(&alias);

        let subscriptions = self.inner.dispatcher.subscriptions().teardown(&alias);
        let claims = self.inner.claims.remove_alias(&alias);
        info!(alias = %alias, subscriptions, claims, "Identity discarded");
        Ok(())
    }

    /// Active aliases, sorted.
    pub fn aliases(&self) -> Vec<Alias> {
        let mut aliases: Vec<Alias> = self
            .inner
            .identities
            .read()
            .iter()
            .filter(|(_, state)| **state == IdentityState::Active)
            .map(|(alias, _)| alias.clone())
            .collect();
        aliases.sort();
        aliases
    }

    /// Snapshot of every ticket of every alias.
    pub fn list_tickets(&self) -> TicketSnapshot {
        self.store().list()
    }

    /// Start the pending poller against `probe`, if enabled in the config.
    pub fn spawn_poller(&self, probe: Arc<dyn TicketProbe>) -> Option<PollerHandle> {
        let config = self.inner.config.poller.clone();
        if !config.enabled {
            return None;
        }
        Some(PendingPoller::new(self.inner.dispatcher.clone(), probe, config).spawn())
    }

    fn is_active(&self, alias: &Alias) -> bool {
        self.inner.identities.read().get(alias) == Some(&IdentityState::Active)
    }

    fn handle(&self, alias: Alias) -> Identity {
        Identity {
            alias,
            bridge: self.clone(),
        }
    }
}

/// Per-identity view of the bridge
#[derive(Clone)]
pub struct Identity {
    alias: Alias,
    bridge: Bridge,
}

impl Identity {
    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    /// Ask `issuer_url` for a claim over `data`.
    pub fn request_claim(&self, issuer_url: &str, data: &str) -> Result<Ticket> {
        self.request(issuer_url, data, None)
    }

    /// [`request_claim`](Self::request_claim) with a one-shot handler attached
    /// before the engine sees the request.
    pub fn request_claim_with(
        &self,
        issuer_url: &str,
        data: &str,
        handler: Subscription,
    ) -> Result<Ticket> {
        self.request(issuer_url, data, Some(handler))
    }

    /// Prove the claim at `claim_index` to `verifier_url`.
    pub fn prove_claim(&self, verifier_url: &str, claim_index: usize) -> Result<Ticket> {
        self.prove(verifier_url, claim_index, None)
    }

    pub fn prove_claim_with(
        &self,
        verifier_url: &str,
        claim_index: usize,
        handler: Subscription,
    ) -> Result<Ticket> {
        self.prove(verifier_url, claim_index, Some(handler))
    }

    fn request(&self, issuer_url: &str, data: &str, handler: Option<Subscription>) -> Result<Ticket> {
        self.ensure_active()?;
        let issuer_url = parse_endpoint(issuer_url)?;
        validate_data(data, &self.bridge.inner.config.validation)?;

        let data = data.to_string();
        Ok(self.submit(TicketKind::ClaimIssuanceRequest, handler, |ticket| {
            Operation::RequestClaim {
                ticket,
                issuer_url,
                data,
            }
        }))
    }

    fn prove(
        &self,
        verifier_url: &str,
        claim_index: usize,
        handler: Option<Subscription>,
    ) -> Result<Ticket> {
        self.ensure_active()?;
        let verifier_url = parse_endpoint(verifier_url)?;
        let claim = self
            .bridge
            .inner
            .claims
            .get(&self.alias, claim_index)
            .ok_or_else(|| ValidationError::UnknownClaim {
                alias: self.alias.clone(),
                index: claim_index,
            })?;

        Ok(self.submit(TicketKind::ClaimVerificationRequest, handler, |ticket| {
            Operation::ProveClaim {
                ticket,
                verifier_url,
                claim,
            }
        }))
    }

    /// Create the ticket and hand the operation to the engine. A synchronous
    /// refusal is delivered as the ticket's error outcome.
    fn submit(
        &self,
        kind: TicketKind,
        handler: Option<Subscription>,
        build: impl FnOnce(Ticket) -> Operation,
    ) -> Ticket {
        let store = self.bridge.store();
        let ticket = match handler {
            Some(handler) => store.create_with(kind, self.alias.clone(), handler),
            None => store.create(kind, self.alias.clone()),
        };

        let operation = build(ticket.clone());
        if let Err(e) = self.bridge.inner.engine.submit(operation, self.bridge.sink()) {
            warn!(ticket_id = %ticket.id, alias = %self.alias, error = %e, "Engine refused operation");
            self.bridge.inner.dispatcher.deliver(&ticket.id, Err(e));
        }
        ticket
    }

    /// Attach a one-shot handler to one of this identity's tickets.
    ///
    /// If the ticket already finished, the handler runs before this returns.
    pub fn register_handler(&self, ticket_id: &TicketId, handler: Subscription) -> Result<()> {
        self.own_ticket(ticket_id)?;
        match self.bridge.store().register(ticket_id, handler)? {
            Registration::Attached => {}
            Registration::CatchUp {
                subscription,
                event,
            } => subscription.invoke(&event),
        }
        Ok(())
    }

    /// Stop waiting on a ticket. Returns `true` if a handler was detached.
    pub fn abandon(&self, ticket_id: &TicketId) -> Result<bool> {
        self.own_ticket(ticket_id)?;
        Ok(self.bridge.store().abandon(ticket_id)?)
    }

    /// Await a ticket's event instead of supplying a handler.
    pub fn wait_for(&self, ticket_id: &TicketId) -> Result<TicketWaiter> {
        let (subscription, waiter) = TicketWaiter::channel();
        self.register_handler(ticket_id, subscription)?;
        Ok(waiter)
    }

    /// Attach a durable handler that fires for every ticket of this identity.
    pub fn subscribe(&self, subscription: Subscription) -> Result<SubscriptionId> {
        self.ensure_active()?;
        Ok(self
            .bridge
            .inner
            .dispatcher
            .subscriptions()
            .subscribe(&self.alias, subscription))
    }

    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        self.bridge
            .inner
            .dispatcher
            .subscriptions()
            .unsubscribe(&self.alias, id)
    }

    /// Pull-based event stream for this identity.
    pub fn inbox(&self) -> Result<EventInbox> {
        self.ensure_active()?;
        Ok(EventInbox::attach(
            self.bridge.inner.dispatcher.subscriptions().clone(),
            self.alias.clone(),
        ))
    }

    /// Snapshot of this identity's tickets, in creation order.
    pub fn list_tickets(&self) -> TicketSnapshot {
        self.bridge
            .store()
            .list()
            .filter(|ticket| ticket.alias == self.alias)
    }

    pub fn ticket(&self, ticket_id: &TicketId) -> Option<Ticket> {
        self.bridge
            .store()
            .lookup(ticket_id)
            .filter(|ticket| ticket.alias == self.alias)
    }

    pub fn list_claims(&self) -> Vec<Claim> {
        self.bridge.inner.claims.list(&self.alias)
    }

    pub fn received_claim(&self, index: usize) -> Option<Claim> {
        self.bridge.inner.claims.get(&self.alias, index)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.bridge.is_active(&self.alias) {
            Ok(())
        } else {
            Err(BridgeError::UnknownAlias(self.alias.clone()))
        }
    }

    fn own_ticket(&self, ticket_id: &TicketId) -> Result<()> {
        match self.ticket(ticket_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::UnknownTicket(*ticket_id).into()),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity").field("alias", &self.alias).finish()
    }
}

fn validate_alias(alias: &Alias, limits: &ValidationConfig) -> std::result::Result<(), ValidationError> {
    let raw = alias.as_str();
    if raw.is_empty() {
        return Err(ValidationError::EmptyField("alias"));
    }
    if raw.chars().count() > limits.max_alias_len {
        return Err(ValidationError::TooLong {
            field: "alias",
            max: limits.max_alias_len,
        });
    }
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidAlias {
            alias: raw.to_string(),
            reason: "contains whitespace or control characters",
        });
    }
    Ok(())
}

fn validate_data(data: &str, limits: &ValidationConfig) -> std::result::Result<(), ValidationError> {
    if data.is_empty() {
        return Err(ValidationError::EmptyField("data"));
    }
    // The engine stores claim data in a fixed-size byte slot.
    if data.len() > limits.max_claim_data_len {
        return Err(ValidationError::TooLong {
            field: "data",
            max: limits.max_claim_data_len,
        });
    }
    Ok(())
}

fn parse_endpoint(raw: &str) -> std::result::Result<Url, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::EmptyField("url"));
    }
    let invalid = |reason: &str| ValidationError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(url)
}
