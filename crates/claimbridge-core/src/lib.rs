//! Claimbridge Core - ticket correlation and event delivery
//!
//! Bridges a long-running identity engine and the presentation layers that
//! start claim issuance and verification requests.
//!
//! ## Architecture
//!
//! ```text
//! caller ─► Identity ─► TicketStore (create + register)
//!              │
//!              └──────► IdentityEngine::submit(op, CompletionSink)
//!                                  │
//!            engine thread ◄───────┘
//!                  │
//!                  ▼
//!            Dispatcher ─► transition ─► one-shot handler
//!                                    └─► durable alias subscriptions
//!                                           │
//!                                           ▼
//!                                  inline or ExecutionContext
//! ```
//!
//! ## Delivery guarantees
//!
//! - A ticket leaves `Pending` exactly once.
//! - Its one-shot handler fires at most once, never under a store lock.
//! - A handler registered after the result arrived runs immediately
//!   (late-registration catch-up).
//! - Failing or panicking handlers are logged and contained.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod claims;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod facade;
pub mod handler;
pub mod poller;
pub mod store;
pub mod subscriptions;
pub mod waiter;

pub use claims::{derive_claim_id, ClaimCache};
pub use crate::config::{BridgeConfig, LoggingConfig, PollerConfig, ValidationConfig};
pub use context::{ContextHandle, ContextPump, ExecutionContext, Job};
pub use dispatcher::{DeliveryOutcome, Dispatcher};
pub use engine::{
    CompletionSink, IdentityEngine, Operation, Script, ScriptBook, SimulatedEngine,
};
pub use error::{
    BridgeError, ClaimError, ContextError, HandlerError, Result, StoreError, ValidationError,
};
pub use facade::{Bridge, Identity};
pub use handler::{EventHandler, Lifetime, Subscription};
pub use poller::{PendingPoller, PollerHandle, ProbeStatus, SweepReport, TicketProbe};
pub use store::{Registration, TicketSnapshot, TicketStore, Transitioned};
pub use subscriptions::SubscriptionRegistry;
pub use waiter::{EventInbox, TicketWaiter};

// Re-export the data model
pub use claimbridge_types::{
    Alias, Claim, ClaimId, EngineError, Event, Outcome, SubscriptionId, Ticket, TicketId,
    TicketKind, TicketState,
};
