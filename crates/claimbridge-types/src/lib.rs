//! Claimbridge Types - Core types for ticket correlation
//!
//! Claimbridge sits between a long-running identity engine and the
//! presentation layers that start claim issuance and verification requests.
//! Requests are fire-and-forget; their results come back later, on another
//! thread, tagged with a ticket.
//!
//! ## Key Concepts
//!
//! - **Ticket**: Correlation handle for one asynchronous operation
//! - **Outcome**: Terminal result (payload or engine error)
//! - **Event**: What handlers and alias subscribers receive
//! - **Alias**: Local identity name scoping durable subscriptions
//! - **Claim**: Issuer-provided data held in the local claim cache

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod claim;
pub mod event;
pub mod ids;
pub mod ticket;

// Re-export main types
pub use claim::Claim;
pub use event::Event;
pub use ids::{Alias, ClaimId, SubscriptionId, TicketId};
pub use ticket::{EngineError, Outcome, Ticket, TicketKind, TicketState};
