// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! # grain-dashboard: cluster-wide method tracing aggregation
//!
//! `grain-dashboard` collects per-method performance counters (call count,
//! cumulative elapsed time, exception count) that many agents report
//! periodically, merges them into one bounded time series and answers
//! rollup queries per grain type, per agent and cluster-wide. On a fixed
//! cadence it also publishes a [`CountersSnapshot`] combining live cluster
//! statistics with the traced totals.
//!
//! ## Core Concepts
//!
//! - **Engine**: one tokio task owns the [`TraceStore`] and handles every
//!   command in order. Spawn it with [`spawn`], [`spawn_detached`] or a
//!   [`DashboardBuilder`].
//! - **[`DashboardRef`]**: a cloneable handle used to submit reports, run
//!   queries and read the latest counters.
//! - **Gap-fill**: when an agent stops reporting a method, a zero entry is
//!   recorded so time series show the drop instead of a stale value.
//! - **Retention**: entries older than the retention window (100 seconds by
//!   default) are pruned after every ingestion.
//! - **Collaborators**: [`ClusterStatistics`] and [`SiloTopology`] provide
//!   activation counts and membership for the counter snapshot. Without
//!   them the engine still ingests and answers queries, it just never
//!   refreshes counters.
//!
//! ## Getting Started
//!
//! ```rust
//! use grain_dashboard::{spawn_detached, DashboardOptions, MethodReport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (dashboard, join_handle) = spawn_detached(DashboardOptions::default());
//!
//!     dashboard
//!         .submit_tracing("10.0.0.1:11111@1", vec![MethodReport::new("Foo", "Bar", 5, 10.0, 0)])
//!         .await?;
//!
//!     let rollups = dashboard.agent_tracing("10.0.0.1:11111@1").await?;
//!     let only = rollups.values().next().expect("one period");
//!     assert_eq!(only.count, 5);
//!
//!     dashboard.stop().await?;
//!     let shutdown = join_handle.await?;
//!     assert_eq!(shutdown.retained_entries, 1);
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::info;
use tokio::sync::{mpsc, watch};

pub mod clock;
pub mod config;
mod dashboard;
mod dashboard_ref;
mod error;
pub mod provider;
pub mod query;
mod snapshot;
pub mod trace;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DashboardOptions, PeriodFormat};
pub use dashboard::Shutdown;
pub use dashboard_ref::DashboardRef;
pub use error::{Error, Result};
pub use provider::{ClusterStatistics, SiloDetails, SiloStatus, SiloTopology, SimpleGrainStatistic};
pub use query::{GrainTracing, MethodTotals, PeriodRollup, PeriodRollups, TopGrainMethods};
pub use snapshot::{ClusterReading, CountersSnapshot, SimpleGrainStatisticCounter, SnapshotBuilder};
pub use trace::{MethodReport, TraceEntry, TraceStore};

use dashboard::{Engine, FetchFuture, Fetcher};
use trace::Ingestor;

// Counter for generating unique engine IDs.
static DASHBOARD_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn fetch_reading<S, T>(statistics: Arc<S>, topology: Arc<T>) -> FetchFuture
where
    S: ClusterStatistics,
    T: SiloTopology,
{
    Box::pin(async move {
        let (total_activation_count, simple_grain_statistics, hosts) = futures::try_join!(
            statistics.total_activation_count(),
            statistics.simple_grain_statistics(),
            topology.silo_details()
        )?;
        Ok(ClusterReading {
            total_activation_count,
            simple_grain_statistics,
            hosts,
        })
    })
}

/// Configures and spawns a dashboard engine.
pub struct DashboardBuilder {
    options: DashboardOptions,
    clock: Arc<dyn Clock>,
    fetcher: Option<Fetcher>,
}

impl DashboardBuilder {
    pub fn new(options: DashboardOptions) -> Self {
        Self {
            options,
            clock: Arc::new(SystemClock),
            fetcher: None,
        }
    }

    /// Replaces the system clock used to stamp periods.
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Attaches the cluster collaborators that feed the counter snapshot.
    pub fn cluster<S, T>(mut self, statistics: Arc<S>, topology: Arc<T>) -> Self
    where
        S: ClusterStatistics,
        T: SiloTopology,
    {
        self.fetcher = Some(Box::new(move || {
            fetch_reading(Arc::clone(&statistics), Arc::clone(&topology))
        }));
        self
    }

    /// Spawns the engine on the current tokio runtime.
    ///
    /// Returns the handle and a `JoinHandle` resolving to a [`Shutdown`] once
    /// the engine stops.
    pub fn spawn(self) -> (DashboardRef, tokio::task::JoinHandle<Shutdown>) {
        let id = DASHBOARD_COUNTER.fetch_add(1, Ordering::SeqCst);
        let options = self.options;

        let (tx, rx) = mpsc::channel(options.mailbox_capacity());
        let (terminate_tx, terminate_rx) = mpsc::channel(1);
        let (counters_tx, counters_rx) = watch::channel(Arc::new(CountersSnapshot::default()));

        let started_at = self.clock.now();
        let engine = Engine::new(
            id,
            Ingestor::new(options.retention_window()),
            SnapshotBuilder::new(options.history_length(), started_at),
            options.period_format().clone(),
            self.clock,
            counters_tx,
        );

        let dashboard_ref = DashboardRef::new(id, tx, terminate_tx, counters_rx);
        let refresh_interval = options.counter_update_interval();
        let fetcher = self.fetcher;

        let handle = tokio::spawn(async move {
            info!(
                "Spawning dashboard {} (refresh every {:?}, retention {:?}).",
                id,
                refresh_interval,
                options.retention_window()
            );
            engine.run(rx, terminate_rx, fetcher, refresh_interval).await
        });

        (dashboard_ref, handle)
    }
}

/// Spawns an engine that refreshes counters from `statistics` and `topology`.
pub fn spawn<S, T>(
    options: DashboardOptions,
    statistics: S,
    topology: T,
) -> (DashboardRef, tokio::task::JoinHandle<Shutdown>)
where
    S: ClusterStatistics,
    T: SiloTopology,
{
    DashboardBuilder::new(options)
        .cluster(Arc::new(statistics), Arc::new(topology))
        .spawn()
}

/// Spawns an engine without cluster collaborators. Ingestion and queries are
/// served; the counter snapshot stays empty.
pub fn spawn_detached(options: DashboardOptions) -> (DashboardRef, tokio::task::JoinHandle<Shutdown>) {
    DashboardBuilder::new(options).spawn()
}
