// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! The engine task that owns the trace store.
//!
//! All mutation (ingestion, gap-filling, pruning, snapshot replacement) runs
//! on one task that drains a bounded mailbox, so commands are handled one at
//! a time and every query observes a whole number of ingested batches. The
//! collaborator fetch of a counter refresh is the only operation that waits
//! on anything outside the engine; it is polled as its own `select!` branch
//! so the mailbox keeps draining while a fetch is pending.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};

use crate::clock::Clock;
use crate::config::PeriodFormat;
use crate::error::Result;
use crate::query::{self, GrainTracing, PeriodRollups, TopGrainMethods};
use crate::snapshot::{ClusterReading, CountersSnapshot, SnapshotBuilder};
use crate::trace::{Ingestor, MethodReport, TraceStore};

pub(crate) type FetchFuture = Pin<Box<dyn Future<Output = Result<ClusterReading>> + Send>>;
pub(crate) type Fetcher = Box<dyn Fn() -> FetchFuture + Send + Sync>;

/// Commands accepted by the engine mailbox.
#[derive(Debug)]
pub(crate) enum Command {
    SubmitTracing {
        agent_address: String,
        reports: Vec<MethodReport>,
        reply: oneshot::Sender<()>,
    },
    GrainTracing {
        grain_type: String,
        reply: oneshot::Sender<GrainTracing>,
    },
    ClusterTracing {
        reply: oneshot::Sender<PeriodRollups>,
    },
    AgentTracing {
        agent_address: String,
        reply: oneshot::Sender<PeriodRollups>,
    },
    TopGrainMethods {
        take: usize,
        reply: oneshot::Sender<TopGrainMethods>,
    },
    StopGracefully,
}

/// Sent on the dedicated single-slot channel to stop the engine immediately.
#[derive(Debug)]
pub(crate) enum ControlSignal {
    Terminate,
}

/// Final state reported by the engine's `JoinHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shutdown {
    /// `true` when stopped through [`DashboardRef::kill`](crate::DashboardRef::kill).
    pub killed: bool,
    /// Number of trace entries still retained when the engine stopped.
    pub retained_entries: usize,
}

pub(crate) struct Engine {
    id: usize,
    store: TraceStore,
    ingestor: Ingestor,
    builder: SnapshotBuilder,
    format: PeriodFormat,
    clock: Arc<dyn Clock>,
    counters: watch::Sender<Arc<CountersSnapshot>>,
}

fn reply<T>(id: usize, tx: oneshot::Sender<T>, value: T) {
    if tx.send(value).is_err() {
        debug!("Dashboard {} failed to send reply: receiver dropped.", id);
    }
}

async fn next_tick(cadence: &mut Option<Interval>) {
    match cadence.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn settle(in_flight: &mut Option<FetchFuture>) -> Result<ClusterReading> {
    match in_flight.as_mut() {
        Some(fetch) => fetch.await,
        None => std::future::pending().await,
    }
}

impl Engine {
    pub(crate) fn new(
        id: usize,
        ingestor: Ingestor,
        builder: SnapshotBuilder,
        format: PeriodFormat,
        clock: Arc<dyn Clock>,
        counters: watch::Sender<Arc<CountersSnapshot>>,
    ) -> Self {
        Self {
            id,
            store: TraceStore::new(),
            ingestor,
            builder,
            format,
            clock,
            counters,
        }
    }

    fn handle(&mut self, command: Command) {
        trace!("Dashboard {} received command: {:?}", self.id, command);
        match command {
            Command::SubmitTracing {
                agent_address,
                reports,
                reply: tx,
            } => {
                let now = self.clock.now();
                let stats = self
                    .ingestor
                    .submit(&mut self.store, &agent_address, reports, now);
                trace!(
                    "Dashboard {} ingested batch from {}: {} reported, {} gap-filled, {} pruned.",
                    self.id,
                    agent_address,
                    stats.reported,
                    stats.gap_filled,
                    stats.pruned
                );
                reply(self.id, tx, ());
            }
            Command::GrainTracing {
                grain_type,
                reply: tx,
            } => {
                let result = query::grain_tracing(self.store.entries(), &grain_type, &self.format);
                reply(self.id, tx, result);
            }
            Command::ClusterTracing { reply: tx } => {
                let result = query::cluster_tracing(self.store.entries(), &self.format);
                reply(self.id, tx, result);
            }
            Command::AgentTracing {
                agent_address,
                reply: tx,
            } => {
                let result = query::agent_tracing(self.store.entries(), &agent_address, &self.format);
                reply(self.id, tx, result);
            }
            Command::TopGrainMethods { take, reply: tx } => {
                let result = query::top_grain_methods(self.store.entries(), take);
                reply(self.id, tx, result);
            }
            Command::StopGracefully => {}
        }
    }

    fn publish(&mut self, reading: ClusterReading) {
        let now = self.clock.now();
        let snapshot = self.builder.build(reading, self.store.entries(), now);
        debug!(
            "Dashboard {} published counters: {} activations on {} active hosts, {} grain statistics",
            self.id,
            snapshot.total_activation_count,
            snapshot.total_active_host_count,
            snapshot.simple_grain_stats.len()
        );
        self.counters.send_replace(Arc::new(snapshot));
    }

    // Runs until stopped, killed, or every handle is dropped. An in-flight
    // collaborator fetch is dropped with the loop and never re-queued.
    pub(crate) async fn run(
        mut self,
        mut receiver: mpsc::Receiver<Command>,
        mut terminate_receiver: mpsc::Receiver<ControlSignal>,
        fetcher: Option<Fetcher>,
        refresh_interval: Duration,
    ) -> Shutdown {
        let id = self.id;

        let mut cadence = fetcher.as_ref().map(|_| {
            let mut interval = tokio::time::interval(refresh_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        if cadence.is_none() {
            info!(
                "Dashboard {} has no cluster collaborators; counters will not refresh.",
                id
            );
        }

        let mut in_flight: Option<FetchFuture> = None;
        let mut killed = false;

        debug!(
            "Dashboard {} engine is running (retention {:?}, history length {}, {} periods).",
            id,
            self.ingestor.retention_window(),
            self.builder.history_length(),
            self.format.name()
        );

        loop {
            tokio::select! {
                biased;

                signal = terminate_receiver.recv() => {
                    match signal {
                        Some(ControlSignal::Terminate) => {
                            info!("Dashboard {} received Terminate signal. Stopping immediately.", id);
                            killed = true;
                        }
                        None => {
                            debug!("Dashboard {} terminate channel closed: all handles dropped.", id);
                        }
                    }
                    break;
                }

                // Refresh branches precede the mailbox; each is ready at most
                // once per tick.
                reading = settle(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    match reading {
                        Ok(reading) => self.publish(reading),
                        Err(e) => {
                            warn!("Dashboard {} counter refresh abandoned, keeping previous snapshot: {}", id, e);
                        }
                    }
                }

                _ = next_tick(&mut cadence), if cadence.is_some() => {
                    if in_flight.is_some() {
                        debug!("Dashboard {} skipping refresh tick: previous fetch still pending.", id);
                    } else if let Some(fetch) = fetcher.as_ref() {
                        trace!("Dashboard {} starting counter refresh.", id);
                        in_flight = Some(fetch());
                    }
                }

                command = receiver.recv() => {
                    match command {
                        Some(Command::StopGracefully) => {
                            info!("Dashboard {} received StopGracefully.", id);
                            break;
                        }
                        Some(command) => self.handle(command),
                        None => {
                            debug!("Dashboard {} mailbox closed: all handles dropped.", id);
                            break;
                        }
                    }
                }
            }
        }

        if in_flight.take().is_some() {
            debug!("Dashboard {} abandoned an in-flight counter refresh.", id);
        }

        receiver.close();
        terminate_receiver.close();

        info!(
            "Dashboard {} stopped with {} retained trace entries (killed: {}).",
            id,
            self.store.len(),
            killed
        );

        Shutdown {
            killed,
            retained_entries: self.store.len(),
        }
    }
}
