//! Local claim cache
//!
//! Holds the claims issued to each alias, in the order they arrived. Claim
//! indices used by `prove_claim` refer to this order.

use crate::error::ClaimError;
use chrono::Utc;
use claimbridge_types::{Alias, Claim, ClaimId, TicketId};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Bytes of the SHA-256 digest kept in a claim id (160 bits)
const CLAIM_ID_LEN: usize = 20;

/// Derive the cache key of a claim issued for `ticket_id`.
pub fn derive_claim_id(ticket_id: &TicketId, bytes: &[u8]) -> ClaimId {
    let mut hasher = Sha256::new();
    hasher.update(ticket_id.as_bytes());
    hasher.update(bytes);
    let digest = hasher.finalize();
    ClaimId::new(hex::encode(&digest[..CLAIM_ID_LEN]))
}

#[derive(Default)]
struct Inner {
    by_alias: HashMap<Alias, Vec<Claim>>,
    ids: HashSet<ClaimId>,
}

/// Claims per alias, insertion-ordered
#[derive(Default)]
pub struct ClaimCache {
    inner: RwLock<Inner>,
}

impl ClaimCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a claim issued for `ticket_id`.
    pub fn record(
        &self,
        ticket_id: &TicketId,
        alias: &Alias,
        issuer: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Claim, ClaimError> {
        let claim = Claim {
            id: derive_claim_id(ticket_id, &bytes),
            alias: alias.clone(),
            issuer: issuer.into(),
            bytes,
            received_at: Utc::now(),
        };
        self.insert(claim.clone())?;
        Ok(claim)
    }

    /// Insert a prebuilt claim; ids must be unique across the cache.
    pub fn insert(&self, claim: Claim) -> Result<(), ClaimError> {
        let mut inner = self.inner.write();
        if !inner.ids.insert(claim.id.clone()) {
            return Err(ClaimError::Duplicate(claim.id));
        }
        debug!(alias = %claim.alias, claim_id = %claim.id, issuer = %claim.issuer, "Claim stored");
        inner
            .by_alias
            .entry(claim.alias.clone())
            .or_default()
            .push(claim);
        Ok(())
    }

    pub fn list(&self, alias: &Alias) -> Vec<Claim> {
        self.inner
            .read()
            .by_alias
            .get(alias)
            .cloned()
            .unwrap_or_default()
    }

    /// Claim at `index` in arrival order.
    pub fn get(&self, alias: &Alias, index: usize) -> Option<Claim> {
        self.inner
            .read()
            .by_alias
            .get(alias)
            .and_then(|claims| claims.get(index))
            .cloned()
    }

    pub fn find(&self, id: &ClaimId) -> Result<Claim, ClaimError> {
        self.inner
            .read()
            .by_alias
            .values()
            .flat_map(|claims| claims.iter())
            .find(|c| &c.id == id)
            .cloned()
            .ok_or_else(|| ClaimError::NotFound(id.clone()))
    }

    pub fn count(&self, alias: &Alias) -> usize {
        self.inner
            .read()
            .by_alias
            .get(alias)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Drop every claim of `alias`. Returns how many were removed.
    pub fn remove_alias(&self, alias: &Alias) -> usize {
        let mut inner = self.inner.write();
        let Some(claims) = inner.by_alias.remove(alias) else {
            return 0;
        };
        for claim in &claims {
            inner.ids.remove(&claim.id);
        }
        claims.len()
    }
}
