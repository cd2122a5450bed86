//! Scripted session against the simulated engine

use crate::error::{CliError, CliResult};
use crate::output::{self, print_info, print_success, short_id, OutputFormat};
use chrono::{DateTime, Utc};
use claimbridge_core::{
    Bridge, BridgeConfig, Claim, Event, ExecutionContext, Identity, Outcome, Script, ScriptBook,
    SimulatedEngine, Subscription, Ticket, TicketId,
};
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;
use tokio::time::timeout;

/// Demo arguments
#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Identity alias to create
    #[arg(long, default_value = "alice")]
    pub alias: String,

    /// Issuer endpoint
    #[arg(long, default_value = "https://issuer.example/claims")]
    pub issuer: String,

    /// Verifier endpoint
    #[arg(long, default_value = "https://verifier.example/proofs")]
    pub verifier: String,

    /// Status checks each operation reports as pending before finishing
    #[arg(long, default_value_t = 1)]
    pub checks: u32,

    /// Poller period in milliseconds (overrides the configuration)
    #[arg(long, default_value_t = 50)]
    pub period_ms: u64,

    /// Seconds to wait for any single ticket
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

/// Table row for ticket display
#[derive(Debug, Serialize, Tabled)]
struct TicketRow {
    /// Ticket ID (short form)
    id: String,
    /// Operation
    kind: String,
    /// Lifecycle state
    state: String,
    /// Creation time
    created: String,
    /// Last status check
    checked: String,
}

impl From<&Ticket> for TicketRow {
    fn from(t: &Ticket) -> Self {
        Self {
            id: short_id(&t.id.as_uuid().to_string()),
            kind: t.kind.to_string(),
            state: t.state.to_string(),
            created: clock(&t.created_at),
            checked: clock(&t.last_checked),
        }
    }
}

/// Table row for claim display
#[derive(Debug, Serialize, Tabled)]
struct ClaimRow {
    id: String,
    issuer: String,
    data: String,
    received: String,
}

impl From<Claim> for ClaimRow {
    fn from(c: Claim) -> Self {
        Self {
            id: short_id(c.id.as_str()),
            issuer: c.issuer,
            data: String::from_utf8_lossy(&c.bytes).into_owned(),
            received: clock(&c.received_at),
        }
    }
}

fn clock(at: &DateTime<Utc>) -> String {
    at.format("%H:%M:%S%.3f").to_string()
}

/// Scripts used by the demo: most requests are approved, "minor" is
/// rejected and "slowpoke" fails like a network timeout.
fn script_book(checks: u32) -> ScriptBook {
    ScriptBook::default()
        .on("minor", Script::Reject)
        .on("slowpoke", Script::Fail("network timeout".into()))
        .with_checks(checks)
}

fn describe(source: &str, event: &Event) {
    let result = match &event.outcome {
        Outcome::Delivered(payload) => format!("delivered {payload}"),
        Outcome::Errored(error) => format!("errored: {error}"),
    };
    print_info(&format!(
        "[{source}] {} {} {result}",
        event.event_type(),
        event.ticket_id
    ));
}

fn printing_handler(source: &'static str) -> Subscription {
    Subscription::one_shot(move |event: &Event| {
        describe(source, event);
        Ok(())
    })
}

async fn await_ticket(identity: &Identity, ticket_id: &TicketId, wait: Duration) -> CliResult<Event> {
    let waiter = identity.wait_for(ticket_id)?;
    timeout(wait, waiter.wait())
        .await
        .map_err(|_| CliError::Timeout(ticket_id.to_string()))?
        .ok_or_else(|| CliError::NoEvent(ticket_id.to_string()))
}

/// Run the demo session
pub async fn execute(args: DemoArgs, mut config: BridgeConfig, format: OutputFormat) -> CliResult<()> {
    let wait = Duration::from_secs(args.timeout_secs);
    config.poller.enabled = true;
    config.poller.check_period_ms = args.period_ms;

    let engine = Arc::new(SimulatedEngine::new(script_book(args.checks)));
    let bridge = Bridge::new(config, engine.clone());
    let identity = bridge.create_identity(args.alias.as_str())?;
    print_success(&format!("Identity {} created", identity.alias()));

    // Handlers marked with this context run on the presentation task.
    let (ui, ui_task) = ExecutionContext::new("presentation").spawn();
    let mut inbox = identity.inbox()?;
    let poller = bridge.spawn_poller(engine.clone());

    let approved = identity.request_claim_with(
        &args.issuer,
        "over-18",
        printing_handler("handler").on(ui.clone()),
    )?;
    let rejected = identity.request_claim(&args.issuer, "minor")?;
    let failed = identity.request_claim(&args.issuer, "slowpoke")?;
    print_info(&format!(
        "Requested claims: {}, {}, {}",
        approved.id, rejected.id, failed.id
    ));

    for _ in 0..3 {
        let event = timeout(wait, inbox.recv())
            .await
            .map_err(|_| CliError::Timeout("inbox".into()))?
            .ok_or_else(|| CliError::NoEvent("inbox".into()))?;
        describe("inbox", &event);
    }

    // Both already finished: these run straight away.
    identity.register_handler(&failed.id, printing_handler("late handler"))?;
    let event = await_ticket(&identity, &rejected.id, wait).await?;
    describe("waiter", &event);

    let proof = identity.prove_claim(&args.verifier, 0)?;
    let event = await_ticket(&identity, &proof.id, wait).await?;
    describe("waiter", &event);

    if let Some(poller) = poller {
        poller.shutdown().await;
    }
    drop(ui);
    if timeout(wait, ui_task).await.is_err() {
        output::print_error("Presentation context did not drain");
    }

    let tickets: Vec<TicketRow> = identity.list_tickets().iter().map(TicketRow::from).collect();
    output::print_output(tickets, format)?;

    let claims: Vec<ClaimRow> = identity.list_claims().into_iter().map(ClaimRow::from).collect();
    output::print_output(claims, format)?;

    bridge.discard_identity(identity.alias().clone())?;
    print_success("Demo finished");
    Ok(())
}
