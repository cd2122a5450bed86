//! Claims received from issuers

use crate::{Alias, ClaimId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A claim held in the local claim cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Content-derived cache key
    pub id: ClaimId,

    /// Identity holding the claim
    pub alias: Alias,

    /// Issuer the claim came from
    pub issuer: String,

    /// Opaque claim bytes as produced by the engine
    pub bytes: Vec<u8>,

    /// When the claim was stored
    pub received_at: DateTime<Utc>,
}
