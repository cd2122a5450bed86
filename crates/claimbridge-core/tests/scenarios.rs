//! End-to-end delivery scenarios through the public API

use claimbridge_core::{
    Alias, Bridge, BridgeConfig, CompletionSink, DeliveryOutcome, EngineError, Event,
    ExecutionContext, HandlerError, IdentityEngine, Operation, PollerConfig, Script, ScriptBook,
    SimulatedEngine, StoreError, Subscription, TicketState,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// Accepts every operation and never completes any; tests deliver by hand
struct IdleEngine;

impl IdentityEngine for IdleEngine {
    fn create_identity(&self, _alias: &Alias) -> Result<(), EngineError> {
        Ok(())
    }

    fn submit(&self, _operation: Operation, _sink: CompletionSink) -> Result<(), EngineError> {
        Ok(())
    }

    fn discard_identity(&self, _alias: &Alias) -> Result<(), EngineError> {
        Ok(())
    }
}

const ISSUER: &str = "https://issuer.example/claims";
const VERIFIER: &str = "https://verifier.example/proofs";

fn idle_bridge() -> Bridge {
    Bridge::new(BridgeConfig::default(), Arc::new(IdleEngine))
}

fn recorder() -> (Subscription, Arc<Mutex<Vec<Event>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let sub = Subscription::one_shot(move |e: &Event| {
        s.lock().push(e.clone());
        Ok(())
    });
    (sub, seen)
}

#[test]
fn registered_handler_fires_once_and_duplicates_are_dropped() {
    let bridge = idle_bridge();
    let alice = bridge.create_identity("alice").unwrap();
    let (handler, seen) = recorder();

    let t1 = alice.request_claim(ISSUER, "over-18").unwrap();
    alice.register_handler(&t1.id, handler).unwrap();

    let sink = bridge.sink();
    let first = sink.complete(&t1.id, Some(json!({"claim": "P"})), None);
    assert_eq!(first, DeliveryOutcome::Dispatched { one_shot: true, durable: 0 });

    let second = sink.complete(&t1.id, Some(json!({"claim": "Q"})), None);
    assert_eq!(second, DeliveryOutcome::AlreadyTerminal);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].ticket_id, t1.id);
    assert_eq!(seen[0].payload(), Some(&json!({"claim": "P"})));
    assert!(seen[0].error().is_none());
    assert_eq!(alice.ticket(&t1.id).unwrap().state, TicketState::Delivered);
}

#[test]
fn late_registration_runs_synchronously() {
    let bridge = idle_bridge();
    let alice = bridge.create_identity("alice").unwrap();

    let t2 = alice.request_claim(ISSUER, "over-18").unwrap();
    let outcome = bridge
        .sink()
        .complete(&t2.id, None, Some(EngineError::new("network timeout")));
    assert_eq!(outcome, DeliveryOutcome::Retained);

    // The handler targets a context nobody pumps; catch-up still runs it
    // right here, before register_handler returns.
    let (ui, _pump) = ExecutionContext::new("ui").into_pump();
    let (handler, seen) = recorder();
    alice.register_handler(&t2.id, handler.on(ui)).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].ticket_id, t2.id);
    assert!(seen[0].payload().is_none());
    assert_eq!(seen[0].error().unwrap().message, "network timeout");
    drop(seen);

    let (again, _) = recorder();
    assert!(matches!(
        alice.register_handler(&t2.id, again),
        Err(claimbridge_core::BridgeError::Store(StoreError::AlreadyRegistered(_)))
    ));
}

#[test]
fn out_of_order_results_do_not_block_each_other() {
    let bridge = idle_bridge();
    let alice = bridge.create_identity("alice").unwrap();

    // A dedicated "UI" thread pumps the context.
    let (ui, pump) = ExecutionContext::new("ui").into_pump();
    let ui_thread = thread::spawn(move || futures::executor::block_on(pump.run()));

    // Alias channel on the UI context sees every ticket of alice.
    let alias_order = Arc::new(Mutex::new(Vec::new()));
    let o = alias_order.clone();
    alice
        .subscribe(
            Subscription::durable(move |e: &Event| {
                o.lock().push(e.ticket_id);
                Ok(())
            })
            .on(ui.clone()),
        )
        .unwrap();

    let handler_order = Arc::new(Mutex::new(Vec::new()));
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);

    let o = handler_order.clone();
    let t3_handler = Subscription::one_shot(move |e: &Event| {
        o.lock().push(e.ticket_id);
        Ok(())
    })
    .on(ui.clone());

    let o = handler_order.clone();
    let t4_handler = Subscription::one_shot(move |e: &Event| {
        // Hold the UI thread until T3's delivery call has returned.
        release_rx
            .lock()
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| HandlerError::new("T3 delivery blocked"))?;
        o.lock().push(e.ticket_id);
        Ok(())
    })
    .on(ui.clone());

    let creators: Vec<_> = [("a", t3_handler), ("b", t4_handler)]
        .into_iter()
        .map(|(data, handler)| {
            let alice = alice.clone();
            thread::spawn(move || alice.request_claim_with(ISSUER, data, handler).unwrap().id)
        })
        .collect();
    let mut ids = creators.into_iter().map(|c| c.join().unwrap());
    let (t3, t4) = (ids.next().unwrap(), ids.next().unwrap());
    assert_ne!(t3, t4);

    let sink = bridge.sink();
    let engine_thread = thread::spawn(move || {
        let four = sink.deliver(&t4, Ok(json!("four")));
        let three = sink.deliver(&t3, Ok(json!("three")));
        (four, three)
    });
    let (four, three) = engine_thread.join().unwrap();
    release_tx.send(()).unwrap();

    let dispatched = DeliveryOutcome::Dispatched { one_shot: true, durable: 1 };
    assert_eq!(four, dispatched);
    assert_eq!(three, dispatched);

    drop(ui);
    drop(bridge);
    drop(alice);
    // Two one-shot handlers plus two alias-channel deliveries.
    assert_eq!(ui_thread.join().unwrap(), 4);
    assert_eq!(*handler_order.lock(), vec![t4, t3]);
    assert_eq!(*alias_order.lock(), vec![t4, t3]);
}

#[test]
fn result_survives_a_closed_handler_context() {
    let bridge = idle_bridge();
    let alice = bridge.create_identity("alice").unwrap();
    let t = alice.request_claim(ISSUER, "over-18").unwrap();

    let (ui, pump) = ExecutionContext::new("ui").into_pump();
    let (stale, stale_seen) = recorder();
    alice.register_handler(&t.id, stale.on(ui)).unwrap();
    drop(pump);

    let outcome = bridge.sink().deliver(&t.id, Ok(json!("P")));
    assert_eq!(outcome, DeliveryOutcome::Retained);
    assert_eq!(alice.ticket(&t.id).unwrap().state, TicketState::Delivered);
    assert!(stale_seen.lock().is_empty());

    let (fresh, fresh_seen) = recorder();
    alice.register_handler(&t.id, fresh).unwrap();
    let seen = fresh_seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].payload(), Some(&json!("P")));
}

#[test]
fn unknown_ticket_delivery_is_a_no_op() {
    let bridge = idle_bridge();
    let alice = bridge.create_identity("alice").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    alice
        .subscribe(Subscription::durable(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();

    let stray = claimbridge_core::TicketId::generate();
    let outcome = bridge.dispatcher().deliver(&stray, Ok(json!(1)));

    assert_eq!(outcome, DeliveryOutcome::UnknownTicket);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(bridge.list_tickets().is_empty());
}

#[test]
fn abandoned_ticket_keeps_its_result() {
    let bridge = idle_bridge();
    let alice = bridge.create_identity("alice").unwrap();
    let (handler, seen) = recorder();

    let ticket = alice.request_claim_with(ISSUER, "over-18", handler).unwrap();
    assert!(alice.abandon(&ticket.id).unwrap());

    let outcome = bridge.sink().complete(&ticket.id, Some(json!("late")), None);
    assert_eq!(outcome, DeliveryOutcome::Retained);
    assert!(seen.lock().is_empty());
    assert_eq!(alice.ticket(&ticket.id).unwrap().state, TicketState::Delivered);

    let mut waiter = alice.wait_for(&ticket.id).unwrap();
    assert_eq!(waiter.try_take().unwrap().payload(), Some(&json!("late")));
}

#[test]
fn failing_durable_handlers_do_not_block_later_events() {
    let bridge = idle_bridge();
    let alice = bridge.create_identity("alice").unwrap();

    alice
        .subscribe(Subscription::durable(|_| panic!("subscriber bug")))
        .unwrap();
    alice
        .subscribe(Subscription::durable(|_| Err(HandlerError::new("rejected"))))
        .unwrap();
    let (recording, seen) = recorder();
    alice.subscribe(recording).unwrap();

    let a = alice.request_claim(ISSUER, "a").unwrap();
    let b = alice.request_claim(ISSUER, "b").unwrap();
    let sink = bridge.sink();
    assert_eq!(
        sink.deliver(&a.id, Ok(json!(1))),
        DeliveryOutcome::Dispatched { one_shot: false, durable: 3 }
    );
    sink.deliver(&b.id, Err(EngineError::new("issuer offline")));

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].event_type(), "RequestClaim");
    assert_eq!(seen[1].error().unwrap().message, "issuer offline");
}

#[test]
fn manual_pump_runs_handlers_on_the_pumping_thread() {
    let bridge = idle_bridge();
    let alice = bridge.create_identity("alice").unwrap();
    let (ui, mut pump) = ExecutionContext::new("ui").into_pump();

    let ran_on = Arc::new(Mutex::new(None));
    let r = ran_on.clone();
    let handler = Subscription::one_shot(move |_| {
        *r.lock() = Some(thread::current().id());
        Ok(())
    })
    .on(ui);

    let ticket = alice.request_claim_with(ISSUER, "x", handler).unwrap();
    let sink = bridge.sink();
    thread::spawn(move || sink.deliver(&ticket.id, Ok(json!(null))))
        .join()
        .unwrap();

    assert!(ran_on.lock().is_none());
    assert_eq!(pump.run_pending(), 1);
    assert_eq!(*ran_on.lock(), Some(thread::current().id()));
}

#[test]
fn synchronous_refusal_arrives_as_an_error_event() {
    let engine = SimulatedEngine::new(ScriptBook::new(Script::Refuse("engine busy".into())));
    let bridge = Bridge::new(BridgeConfig::default(), Arc::new(engine));
    let alice = bridge.create_identity("alice").unwrap();
    let (handler, seen) = recorder();

    let ticket = alice.request_claim_with(ISSUER, "x", handler).unwrap();

    assert_eq!(alice.ticket(&ticket.id).unwrap().state, TicketState::Errored);
    assert_eq!(seen.lock()[0].error().unwrap().message, "engine busy");
}

#[tokio::test]
async fn inbox_collects_alias_events() {
    let engine = Arc::new(SimulatedEngine::new(
        ScriptBook::default().on("minor", Script::Reject),
    ));
    let bridge = Bridge::new(BridgeConfig::default(), engine.clone());
    let alice = bridge.create_identity("alice").unwrap();
    let mut inbox = alice.inbox().unwrap();

    let ok = alice.request_claim(ISSUER, "over-18").unwrap();
    let rejected = alice.request_claim(ISSUER, "minor").unwrap();
    assert_eq!(engine.run_to_completion(), 2);

    let mut events = Vec::new();
    while let Some(event) = inbox.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    let by_id = |id| events.iter().find(|e| e.ticket_id == id).unwrap();
    assert_eq!(by_id(ok.id).payload().unwrap()["status"], "approved");
    assert!(by_id(rejected.id).outcome.is_error());

    assert_eq!(alice.list_claims().len(), 1);

    bridge.discard_identity("alice").unwrap();
    assert_eq!(inbox.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn poller_drives_issuance_then_proof() {
    let engine = Arc::new(SimulatedEngine::new(ScriptBook::default().with_checks(1)));
    let config = BridgeConfig {
        poller: PollerConfig {
            check_period_ms: 100,
            ..PollerConfig::default()
        },
        ..BridgeConfig::default()
    };
    let bridge = Bridge::new(config, engine.clone());
    let alice = bridge.create_identity(Alias::from("alice")).unwrap();
    let poller = bridge.spawn_poller(engine.clone()).unwrap();

    let issued = alice.request_claim(ISSUER, "over-18").unwrap();
    let waiter = alice.wait_for(&issued.id).unwrap();
    let event = waiter.wait().await.unwrap();
    assert_eq!(event.payload().unwrap()["status"], "approved");

    let claim = alice.received_claim(0).unwrap();
    assert_eq!(event.payload().unwrap()["claim_id"], claim.id.as_str());

    let proof = alice.prove_claim(VERIFIER, 0).unwrap();
    let waiter = alice.wait_for(&proof.id).unwrap();
    let event = waiter.wait().await.unwrap();
    assert_eq!(event.event_type(), "ProveClaim");
    assert_eq!(event.payload().unwrap()["status"], "verified");

    let checked = alice.ticket(&proof.id).unwrap();
    assert!(checked.last_checked >= checked.created_at);
    assert_eq!(alice.list_tickets().len(), 2);

    poller.shutdown().await;
}
