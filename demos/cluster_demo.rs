// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Simulates a small cluster: three agents report method activity every
//! second while the dashboard refreshes its counters from an in-process
//! stand-in for the cluster management interface.
//!
//! Run with `RUST_LOG=debug cargo run --example cluster_demo`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use grain_dashboard::{
    ClusterStatistics, DashboardBuilder, DashboardOptions, MethodReport, SiloDetails, SiloStatus,
    SiloTopology, SimpleGrainStatistic,
};
use log::info;

const AGENTS: [&str; 3] = ["10.0.0.1:11111@1", "10.0.0.2:11111@1", "10.0.0.3:11111@1"];

struct DemoCluster {
    activations: AtomicU64,
}

impl ClusterStatistics for DemoCluster {
    async fn total_activation_count(&self) -> grain_dashboard::Result<u64> {
        Ok(self.activations.load(Ordering::Relaxed))
    }

    async fn simple_grain_statistics(&self) -> grain_dashboard::Result<Vec<SimpleGrainStatistic>> {
        let per_agent = self.activations.load(Ordering::Relaxed) / AGENTS.len() as u64;
        Ok(AGENTS
            .iter()
            .map(|agent| SimpleGrainStatistic::new("Shop.CartGrain", *agent, per_agent))
            .collect())
    }
}

impl SiloTopology for DemoCluster {
    async fn silo_details(&self) -> grain_dashboard::Result<Vec<SiloDetails>> {
        Ok(AGENTS
            .iter()
            .map(|agent| SiloDetails::new(*agent, SiloStatus::Active))
            .collect())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cluster = Arc::new(DemoCluster {
        activations: AtomicU64::new(30),
    });
    let (dashboard, join_handle) = DashboardBuilder::new(DashboardOptions::default())
        .cluster(Arc::clone(&cluster), Arc::clone(&cluster))
        .spawn();

    for round in 0..5u64 {
        for (i, agent) in AGENTS.iter().enumerate() {
            let mut reports = vec![MethodReport::new(
                "Shop.CartGrain",
                "AddItem",
                10 + round * (i as u64 + 1),
                2.5 * (round + 1) as f64,
                u64::from(round == 3),
            )];
            // The last agent stops calling Checkout after round 1; gap-fill keeps it visible.
            if i < 2 || round < 2 {
                reports.push(MethodReport::new("Shop.CartGrain", "Checkout", 2, 8.0, 0));
            }
            dashboard.submit_tracing(*agent, reports).await?;
        }
        cluster.activations.fetch_add(3, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    for (period, rollup) in dashboard.cluster_tracing().await? {
        info!(
            "{period}: {} calls, {:.1} elapsed, {} exceptions",
            rollup.count, rollup.elapsed_time, rollup.exception_count
        );
    }

    let checkout = dashboard.agent_tracing(AGENTS[2]).await?;
    info!("{} tracked {} periods for the quiet agent", AGENTS[2], checkout.len());

    let top = dashboard.top_grain_methods(3).await?;
    for method in &top.calls {
        info!(
            "busiest: {}.{} ({} calls, {:.2} avg latency)",
            method.grain_type,
            method.method,
            method.count,
            method.average_latency()
        );
    }

    let counters = dashboard.counters();
    info!(
        "{} activations on {} active silos, history {:?}",
        counters.total_activation_count, counters.total_active_host_count, counters.total_activation_count_history
    );
    for stat in &counters.simple_grain_stats {
        info!(
            "{} @ {}: {} activations, {:.2} calls/s",
            stat.grain_type,
            stat.agent_address,
            stat.activation_count,
            stat.calls_per_second()
        );
    }

    dashboard.stop().await?;
    let shutdown = join_handle.await?;
    info!("Dashboard stopped, {} entries retained", shutdown.retained_entries);
    Ok(())
}
