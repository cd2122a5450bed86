//! Pending-ticket poller
//!
//! Periodically asks a [`TicketProbe`] about every pending ticket and feeds
//! the answers back through the dispatcher: still running tickets are
//! touched, finished ones are delivered.

use crate::config::PollerConfig;
use crate::dispatcher::Dispatcher;
use async_trait::async_trait;
use claimbridge_types::{EngineError, Ticket};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Answer to a status check
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeStatus {
    /// Still running
    Pending,
    /// Finished with this result
    Done(Result<Value, EngineError>),
    /// The prober knows nothing about the ticket
    Untracked,
}

/// Something that can check on a pending ticket
#[async_trait]
pub trait TicketProbe: Send + Sync {
    async fn probe(&self, ticket: &Ticket) -> ProbeStatus;
}

/// Counters of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub touched: usize,
    pub delivered: usize,
}

/// Periodic status checker for pending tickets
pub struct PendingPoller {
    dispatcher: Dispatcher,
    probe: Arc<dyn TicketProbe>,
    config: PollerConfig,
}

impl PendingPoller {
    pub fn new(dispatcher: Dispatcher, probe: Arc<dyn TicketProbe>, config: PollerConfig) -> Self {
        Self {
            dispatcher,
            probe,
            config,
        }
    }

    /// Probe every ticket that is pending right now, concurrently.
    pub async fn sweep(&self) -> SweepReport {
        let pending = self.dispatcher.store().pending();
        let limit = self.config.max_concurrent_probes.max(1);

        let statuses: Vec<(Ticket, ProbeStatus)> = stream::iter(pending)
            .map(|ticket| {
                let probe = Arc::clone(&self.probe);
                async move {
                    let status = probe.probe(&ticket).await;
                    (ticket, status)
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for (ticket, status) in statuses {
            report.probed += 1;
            match status {
                ProbeStatus::Pending => {
                    if self.dispatcher.touch(&ticket.id) {
                        report.touched += 1;
                    }
                }
                ProbeStatus::Done(result) => {
                    if self.dispatcher.deliver(&ticket.id, result).accepted() {
                        report.delivered += 1;
                    }
                }
                ProbeStatus::Untracked => {
                    debug!(ticket_id = %ticket.id, "Probe does not track ticket");
                }
            }
        }

        if report.probed > 0 {
            debug!(
                probed = report.probed,
                touched = report.touched,
                delivered = report.delivered,
                "Pending sweep finished"
            );
        }
        report
    }

    /// Run sweeps every `check_period` until the returned handle is shut down.
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = self.config.check_period();

        let task = tokio::spawn(async move {
            info!(period_ms = period.as_millis() as u64, "Pending poller started");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Pending poller stopped");
        });

        PollerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Running poller
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the poller and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Pending poller task failed");
        }
    }
}
