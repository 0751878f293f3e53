// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use grain_dashboard::{
    spawn_detached, Clock, DashboardBuilder, DashboardOptions, DashboardRef, Error, ManualClock,
    MethodReport, PeriodFormat, Shutdown,
};

fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn label(at: DateTime<Utc>) -> String {
    PeriodFormat::seconds().label(&at)
}

fn spawn_with_clock(clock: &ManualClock) -> (DashboardRef, tokio::task::JoinHandle<Shutdown>) {
    DashboardBuilder::new(DashboardOptions::default())
        .clock(clock.clone())
        .spawn()
}

#[tokio::test]
async fn test_end_to_end_retention_scenario() -> anyhow::Result<()> {
    init_test_logger();
    let clock = ManualClock::new(t0());
    let (dashboard, join_handle) = spawn_with_clock(&clock);

    // t = 0
    dashboard
        .submit_tracing("S1", vec![MethodReport::new("Foo", "Bar", 5, 10.0, 0)])
        .await?;

    let rollups = dashboard.agent_tracing("S1").await?;
    assert_eq!(rollups.len(), 1);
    let first = &rollups[&label(t0())];
    assert_eq!((first.count, first.elapsed_time, first.exception_count), (5, 10.0, 0));

    // t = 50: silent batch, Foo.Bar is gap-filled with zeros
    clock.advance(Duration::from_secs(50));
    let t50 = clock.now();
    dashboard.submit_tracing("S1", Vec::new()).await?;

    let rollups = dashboard.agent_tracing("S1").await?;
    assert_eq!(rollups.keys().cloned().collect::<Vec<_>>(), vec![label(t0()), label(t50)]);
    let second = &rollups[&label(t50)];
    assert_eq!((second.count, second.elapsed_time, second.exception_count), (0, 0.0, 0));
    assert_eq!((second.grain_type.as_str(), second.method.as_str()), ("Foo", "Bar"));

    // t = 150: the t = 0 entry falls out of the window, t = 50 sits on the boundary
    clock.advance(Duration::from_secs(100));
    let t150 = clock.now();
    dashboard.submit_tracing("S1", Vec::new()).await?;

    let rollups = dashboard.agent_tracing("S1").await?;
    assert_eq!(rollups.keys().cloned().collect::<Vec<_>>(), vec![label(t50), label(t150)]);

    dashboard.stop().await?;
    let shutdown = join_handle.await?;
    assert!(!shutdown.killed);
    assert_eq!(shutdown.retained_entries, 2);
    Ok(())
}

#[tokio::test]
async fn test_gap_fill_preserves_reported_values() -> anyhow::Result<()> {
    init_test_logger();
    let clock = ManualClock::new(t0());
    let (dashboard, _join_handle) = spawn_with_clock(&clock);

    dashboard
        .submit_tracing(
            "S1",
            vec![
                MethodReport::new("A", "foo", 2, 4.0, 0),
                MethodReport::new("A", "bar", 3, 6.0, 1),
            ],
        )
        .await?;
    clock.advance(Duration::from_secs(10));
    let t10 = clock.now();
    dashboard
        .submit_tracing("s1", vec![MethodReport::new("A", "FOO", 7, 1.5, 2)])
        .await?;

    let tracing = dashboard.grain_tracing("A").await?;
    let foo = tracing.get("A.foo").expect("foo rollups");
    assert_eq!(foo.len(), 1);
    let bar = tracing.get("A.bar").expect("bar rollups");
    let bar_latest = &bar[&label(t10)];
    assert_eq!((bar_latest.count, bar_latest.elapsed_time, bar_latest.exception_count), (0, 0.0, 0));

    let upper_foo = &tracing["A.FOO"][&label(t10)];
    assert_eq!((upper_foo.count, upper_foo.elapsed_time, upper_foo.exception_count), (7, 1.5, 2));

    dashboard.kill()?;
    Ok(())
}

#[tokio::test]
async fn test_cluster_rollup_equals_sum_of_agents() -> anyhow::Result<()> {
    init_test_logger();
    let clock = ManualClock::new(t0());
    let (dashboard, _join_handle) = spawn_with_clock(&clock);
    let agents = ["S1", "S2", "S3"];

    for step in 0..4u64 {
        for (i, agent) in agents.iter().enumerate() {
            let i = i as u64;
            let mut reports = vec![MethodReport::new("Foo", "Bar", step + i, 0.5 * (step + i) as f64, i)];
            if step % 2 == 0 {
                reports.push(MethodReport::new("Qux", "Run", 1, 0.25, 0));
            }
            dashboard.submit_tracing(*agent, reports).await?;
        }
        clock.advance(Duration::from_secs(5));
    }

    let cluster = dashboard.cluster_tracing().await?;
    assert_eq!(cluster.len(), 4);

    let mut per_agent = Vec::new();
    for agent in agents {
        per_agent.push(dashboard.agent_tracing(agent).await?);
    }

    for (period, rollup) in &cluster {
        let count: u64 = per_agent.iter().filter_map(|r| r.get(period)).map(|r| r.count).sum();
        let elapsed: f64 = per_agent.iter().filter_map(|r| r.get(period)).map(|r| r.elapsed_time).sum();
        let errors: u64 = per_agent
            .iter()
            .filter_map(|r| r.get(period))
            .map(|r| r.exception_count)
            .sum();
        assert_eq!((rollup.count, rollup.elapsed_time, rollup.exception_count), (count, elapsed, errors));
    }

    dashboard.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_submissions_are_serialized() -> anyhow::Result<()> {
    init_test_logger();
    let clock = ManualClock::new(t0());
    let (dashboard, join_handle) = spawn_with_clock(&clock);

    let mut tasks = Vec::new();
    for agent in 0..10 {
        let dashboard = dashboard.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..20 {
                dashboard
                    .submit_tracing(
                        format!("agent-{agent}"),
                        vec![MethodReport::new("Foo", "Bar", 1, 0.5, 0)],
                    )
                    .await?;
            }
            Ok::<_, Error>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    let cluster = dashboard.cluster_tracing().await?;
    let rollup = &cluster[&label(t0())];
    assert_eq!(rollup.count, 200);
    assert_eq!(rollup.elapsed_time, 100.0);

    let top = dashboard.top_grain_methods(5).await?;
    assert_eq!(top.calls.len(), 1);
    assert_eq!(top.calls[0].count, 200);
    assert!(top.errors.is_empty());

    dashboard.stop().await?;
    assert_eq!(join_handle.await?.retained_entries, 200);
    Ok(())
}

#[tokio::test]
async fn test_empty_agent_address_is_rejected() -> anyhow::Result<()> {
    init_test_logger();
    let (dashboard, _join_handle) = spawn_detached(DashboardOptions::default());

    let result = dashboard
        .submit_tracing("", vec![MethodReport::new("Foo", "Bar", 1, 1.0, 0)])
        .await;
    assert!(matches!(result, Err(Error::InvalidArgument { argument: "agent_address", .. })));
    assert!(dashboard.cluster_tracing().await?.is_empty());

    dashboard.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_empty_batches_and_unknown_queries() -> anyhow::Result<()> {
    init_test_logger();
    let (dashboard, _join_handle) = spawn_detached(DashboardOptions::default());

    dashboard.submit_tracing("S1", Vec::new()).await?;

    assert!(dashboard.cluster_tracing().await?.is_empty());
    assert!(dashboard.agent_tracing("S1").await?.is_empty());
    assert!(dashboard.grain_tracing("Foo").await?.is_empty());

    dashboard.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_commands_fail_after_stop() -> anyhow::Result<()> {
    init_test_logger();
    let (dashboard, join_handle) = spawn_detached(DashboardOptions::default());
    assert!(dashboard.is_alive());

    dashboard.stop().await?;
    let shutdown = join_handle.await?;
    assert!(!shutdown.killed);
    assert!(!dashboard.is_alive());

    let result = dashboard.submit_tracing("S1", Vec::new()).await;
    assert!(matches!(result, Err(Error::Send { .. })));

    // Stopping twice is harmless.
    dashboard.stop().await?;
    dashboard.kill()?;
    Ok(())
}

#[tokio::test]
async fn test_kill_stops_immediately() -> anyhow::Result<()> {
    init_test_logger();
    let (dashboard, join_handle) = spawn_detached(DashboardOptions::default());

    dashboard.kill()?;
    let shutdown = join_handle.await?;
    assert!(shutdown.killed);
    assert_eq!(shutdown.retained_entries, 0);
    Ok(())
}

#[tokio::test]
async fn test_dropping_all_handles_stops_engine() -> anyhow::Result<()> {
    init_test_logger();
    let (dashboard, join_handle) = spawn_detached(DashboardOptions::default());
    dashboard.submit_tracing("S1", vec![MethodReport::new("Foo", "Bar", 1, 1.0, 0)]).await?;

    drop(dashboard);
    let shutdown = join_handle.await?;
    assert!(!shutdown.killed);
    assert_eq!(shutdown.retained_entries, 1);
    Ok(())
}

#[tokio::test]
async fn test_minute_buckets_merge_periods() -> anyhow::Result<()> {
    init_test_logger();
    let clock = ManualClock::new(t0());
    let (dashboard, _join_handle) = DashboardBuilder::new(
        DashboardOptions::default().with_period_format(PeriodFormat::minutes()),
    )
    .clock(clock.clone())
    .spawn();

    dashboard.submit_tracing("S1", vec![MethodReport::new("Foo", "Bar", 1, 1.0, 0)]).await?;
    clock.advance(Duration::from_secs(30));
    dashboard.submit_tracing("S1", vec![MethodReport::new("Foo", "Bar", 2, 1.0, 1)]).await?;

    let rollups = dashboard.agent_tracing("S1").await?;
    assert_eq!(rollups.len(), 1);
    let (period, rollup) = rollups.iter().next().unwrap();
    assert_eq!(period, "2024-05-01T12:00");
    assert_eq!((rollup.count, rollup.elapsed_time, rollup.exception_count), (3, 2.0, 1));

    dashboard.stop().await?;
    Ok(())
}
