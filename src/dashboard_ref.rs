// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot, watch};

use crate::dashboard::{Command, ControlSignal};
use crate::error::{Error, Result};
use crate::query::{GrainTracing, PeriodRollups, TopGrainMethods};
use crate::snapshot::CountersSnapshot;
use crate::trace::MethodReport;

/// A handle to a running dashboard engine.
///
/// `DashboardRef` is cheap to clone and can be shared between the tasks that
/// receive agent reports and the ones serving queries. Tracing commands go
/// through the engine mailbox and are answered in arrival order; the counter
/// snapshot is read straight from the last published value without involving
/// the engine.
///
/// ## Methods
///
/// - **Ingestion**: [`submit_tracing`](DashboardRef::submit_tracing)
/// - **Queries**: [`grain_tracing`](DashboardRef::grain_tracing),
///   [`cluster_tracing`](DashboardRef::cluster_tracing),
///   [`agent_tracing`](DashboardRef::agent_tracing),
///   [`top_grain_methods`](DashboardRef::top_grain_methods)
/// - **Counters**: [`counters`](DashboardRef::counters),
///   [`subscribe_counters`](DashboardRef::subscribe_counters)
/// - **Control**: [`stop`](DashboardRef::stop), [`kill`](DashboardRef::kill)
#[derive(Clone, Debug)]
pub struct DashboardRef {
    id: usize,
    sender: mpsc::Sender<Command>,
    terminate_sender: mpsc::Sender<ControlSignal>,
    counters: watch::Receiver<Arc<CountersSnapshot>>,
}

impl DashboardRef {
    pub(crate) fn new(
        id: usize,
        sender: mpsc::Sender<Command>,
        terminate_sender: mpsc::Sender<ControlSignal>,
        counters: watch::Receiver<Arc<CountersSnapshot>>,
    ) -> Self {
        DashboardRef {
            id,
            sender,
            terminate_sender,
            counters,
        }
    }

    /// Returns the unique ID of the engine.
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Returns true while the engine accepts commands.
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed() && !self.terminate_sender.is_closed()
    }

    async fn ask<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        let (reply_tx, reply_rx) = oneshot::channel();

        if self.sender.send(make(reply_tx)).await.is_err() {
            return Err(Error::Send {
                details: format!("dashboard {} mailbox closed", self.id),
            });
        }

        reply_rx.await.map_err(|_| Error::Receive {
            details: format!("dashboard {} dropped the reply channel", self.id),
        })
    }

    /// Ingests one agent's report batch.
    ///
    /// Every report is stamped with the ingestion instant. Methods the agent
    /// reported before but left out of `reports` receive a zero entry, and
    /// entries past the retention window are pruned before this returns. An
    /// empty batch is valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty `agent_address`, and
    /// [`Error::Send`] once the engine has stopped.
    pub async fn submit_tracing(
        &self,
        agent_address: impl Into<String>,
        reports: Vec<MethodReport>,
    ) -> Result<()> {
        let agent_address = agent_address.into();
        if agent_address.is_empty() {
            return Err(Error::InvalidArgument {
                argument: "agent_address",
                details: "must not be empty".to_string(),
            });
        }

        self.ask(|reply| Command::SubmitTracing {
            agent_address,
            reports,
            reply,
        })
        .await
    }

    /// Rollups for one grain type keyed by `grainType.method`, then by period.
    pub async fn grain_tracing(&self, grain_type: impl Into<String>) -> Result<GrainTracing> {
        let grain_type = grain_type.into();
        self.ask(|reply| Command::GrainTracing { grain_type, reply })
            .await
    }

    /// Cluster-wide rollups keyed by period.
    pub async fn cluster_tracing(&self) -> Result<PeriodRollups> {
        self.ask(|reply| Command::ClusterTracing { reply }).await
    }

    /// Rollups of one agent keyed by period. The address is matched
    /// case-insensitively.
    pub async fn agent_tracing(&self, agent_address: impl Into<String>) -> Result<PeriodRollups> {
        let agent_address = agent_address.into();
        self.ask(|reply| Command::AgentTracing {
            agent_address,
            reply,
        })
        .await
    }

    /// Busiest, slowest and most failing methods, `take` of each.
    pub async fn top_grain_methods(&self, take: usize) -> Result<TopGrainMethods> {
        self.ask(|reply| Command::TopGrainMethods { take, reply })
            .await
    }

    /// The most recently published counter snapshot.
    ///
    /// Until the first successful refresh this is an empty snapshot with
    /// `taken_at == None`. After a failed refresh the previous snapshot stays
    /// in place.
    pub fn counters(&self) -> Arc<CountersSnapshot> {
        self.counters.borrow().clone()
    }

    /// A receiver notified every time a new snapshot is published.
    pub fn subscribe_counters(&self) -> watch::Receiver<Arc<CountersSnapshot>> {
        self.counters.clone()
    }

    /// Immediately stops the engine. Commands still queued are dropped and
    /// an in-flight counter refresh is abandoned.
    pub fn kill(&self) -> Result<()> {
        debug!("Sending Terminate to dashboard {}", self.id);
        match self.terminate_sender.try_send(ControlSignal::Terminate) {
            Ok(_) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Terminate for dashboard {} already queued.", self.id);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Failed to send Terminate to dashboard {}: already stopped.", self.id);
                Ok(())
            }
        }
    }

    /// Stops the engine after the commands already in its mailbox.
    pub async fn stop(&self) -> Result<()> {
        debug!("Sending StopGracefully to dashboard {}", self.id);
        if self.sender.send(Command::StopGracefully).await.is_err() {
            warn!("Failed to send StopGracefully to dashboard {}: already stopped.", self.id);
        }
        Ok(())
    }
}
