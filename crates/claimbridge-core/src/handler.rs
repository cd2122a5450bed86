//! Handler abstraction shared by one-shot ticket callbacks and durable
//! alias subscriptions

use crate::context::ContextHandle;
use crate::error::HandlerError;
use claimbridge_types::{Event, SubscriptionId};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Receives finished-operation events
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &Event) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_event(&self, event: &Event) -> Result<(), HandlerError> {
        self(event)
    }
}

/// How long a subscription stays attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Fires at most once, for a single ticket
    OneShot,
    /// Fires for every ticket of an alias until torn down
    Durable,
}

/// A handler plus the execution context it must run on
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    lifetime: Lifetime,
    handler: Arc<dyn EventHandler>,
    context: Option<ContextHandle>,
}

impl Subscription {
    /// One-shot closure handler invoked on the delivering thread.
    pub fn one_shot<F>(f: F) -> Self
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::new(Lifetime::OneShot, Arc::new(f), None)
    }

    /// Durable closure handler invoked on the delivering thread.
    pub fn durable<F>(f: F) -> Self
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::new(Lifetime::Durable, Arc::new(f), None)
    }

    pub fn new(
        lifetime: Lifetime,
        handler: Arc<dyn EventHandler>,
        context: Option<ContextHandle>,
    ) -> Self {
        Self {
            id: SubscriptionId::generate(),
            lifetime,
            handler,
            context,
        }
    }

    /// Run the handler on `context` instead of the delivering thread.
    pub fn on(mut self, context: ContextHandle) -> Self {
        self.context = Some(context);
        self
    }

    pub(crate) fn promote(mut self) -> Self {
        self.lifetime = Lifetime::Durable;
        self
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn context(&self) -> Option<&ContextHandle> {
        self.context.as_ref()
    }

    /// Invoke the handler right here, containing errors and panics.
    pub fn invoke(&self, event: &Event) {
        invoke_handler(self.id, self.handler.as_ref(), event);
    }

    /// Hand the event to the target context, or run it inline when the
    /// subscription has none. Never waits for a scheduled handler.
    ///
    /// Returns `false` when the context is closed and the event was not
    /// handed off.
    pub fn schedule(&self, event: Event) -> bool {
        match &self.context {
            None => {
                self.invoke(&event);
                true
            }
            Some(context) => {
                let id = self.id;
                let handler = Arc::clone(&self.handler);
                let ticket_id = event.ticket_id;
                let job = Box::new(move || invoke_handler(id, handler.as_ref(), &event));
                match context.submit(job) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            subscription_id = %id,
                            ticket_id = %ticket_id,
                            error = %e,
                            "Execution context closed; event not handed off"
                        );
                        false
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("lifetime", &self.lifetime)
            .field("context", &self.context.as_ref().map(|c| c.name()))
            .finish()
    }
}

fn invoke_handler(id: SubscriptionId, handler: &dyn EventHandler, event: &Event) {
    match catch_unwind(AssertUnwindSafe(|| handler.on_event(event))) {
        Ok(Ok(())) => {
            debug!(subscription_id = %id, ticket_id = %event.ticket_id, "Handler completed");
        }
        Ok(Err(e)) => {
            error!(
                subscription_id = %id,
                ticket_id = %event.ticket_id,
                error = %e,
                "Handler returned an error"
            );
        }
        Err(_) => {
            error!(
                subscription_id = %id,
                ticket_id = %event.ticket_id,
                "Handler panicked"
            );
        }
    }
}
