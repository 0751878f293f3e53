// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ELAPSED_SECONDS_CAP;
use crate::provider::{SiloDetails, SimpleGrainStatistic};
use crate::trace::{fold_case, TraceEntry};

/// Live activations of one grain type on one agent joined with the traced
/// totals of that pair over the retained window.
///
/// Totals are stored undivided together with the seconds denominator; the
/// rate helpers divide at display time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleGrainStatisticCounter {
    pub grain_type: String,
    pub agent_address: String,
    pub activation_count: u64,
    pub total_calls: u64,
    pub total_await_time: f64,
    pub total_exceptions: u64,
    /// Seconds since the engine started, capped at 100.
    pub total_seconds: f64,
}

impl SimpleGrainStatisticCounter {
    pub fn calls_per_second(&self) -> f64 {
        per_second(self.total_calls as f64, self.total_seconds)
    }

    pub fn exceptions_per_second(&self) -> f64 {
        per_second(self.total_exceptions as f64, self.total_seconds)
    }

    /// Mean await time per call, zero when nothing was called.
    pub fn average_latency(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_await_time / self.total_calls as f64
        }
    }
}

fn per_second(total: f64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        total / seconds
    } else {
        0.0
    }
}

/// Point-in-time view of cluster load and aggregated statistics.
///
/// A snapshot is built wholesale on each refresh and never modified after it
/// has been published. Both history series are oldest first.
///
/// # Example
///
/// ```rust,ignore
/// let counters = dashboard.counters();
/// println!("{} activations on {} silos", counters.total_activation_count, counters.total_active_host_count);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CountersSnapshot {
    pub total_activation_count: u64,
    pub total_active_host_count: u64,
    pub total_activation_count_history: Vec<u64>,
    pub total_active_host_count_history: Vec<u64>,
    pub hosts: Vec<SiloDetails>,
    pub simple_grain_stats: Vec<SimpleGrainStatisticCounter>,
    /// `None` until the first successful refresh.
    pub taken_at: Option<DateTime<Utc>>,
}

/// Everything fetched from the cluster collaborators for one refresh.
#[derive(Debug, Clone, Default)]
pub struct ClusterReading {
    pub total_activation_count: u64,
    pub simple_grain_statistics: Vec<SimpleGrainStatistic>,
    pub hosts: Vec<SiloDetails>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    calls: u64,
    await_time: f64,
    exceptions: u64,
}

/// Builds [`CountersSnapshot`]s and keeps the two bounded scalar histories
/// between refreshes.
#[derive(Debug)]
pub struct SnapshotBuilder {
    history_length: usize,
    activation_history: VecDeque<u64>,
    active_host_history: VecDeque<u64>,
    started_at: DateTime<Utc>,
}

impl SnapshotBuilder {
    pub fn new(history_length: usize, started_at: DateTime<Utc>) -> Self {
        let history_length = history_length.max(1);
        Self {
            history_length,
            activation_history: VecDeque::with_capacity(history_length + 1),
            active_host_history: VecDeque::with_capacity(history_length + 1),
            started_at,
        }
    }

    pub fn history_length(&self) -> usize {
        self.history_length
    }

    /// Seconds since start, capped so long running rate displays do not
    /// dilute towards zero.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.started_at).num_milliseconds().max(0);
        (millis as f64 / 1000.0).min(ELAPSED_SECONDS_CAP)
    }

    fn record(history: &mut VecDeque<u64>, value: u64, cap: usize) {
        history.push_back(value);
        while history.len() > cap {
            history.pop_front();
        }
    }

    /// Folds one successful [`ClusterReading`] into a new snapshot.
    ///
    /// `entries` is the full retained trace window; totals are not bucketed
    /// by period here.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, reading, entries), fields(entries = entries.len()))
    )]
    pub fn build(&mut self, reading: ClusterReading, entries: &[TraceEntry], now: DateTime<Utc>) -> CountersSnapshot {
        let total_active_host_count = reading
            .hosts
            .iter()
            .filter(|host| host.status.is_active())
            .count() as u64;

        Self::record(
            &mut self.activation_history,
            reading.total_activation_count,
            self.history_length,
        );
        Self::record(
            &mut self.active_host_history,
            total_active_host_count,
            self.history_length,
        );

        let total_seconds = self.elapsed_seconds(now);

        let mut totals: HashMap<(&str, String), Totals> = HashMap::new();
        for entry in entries {
            let slot = totals
                .entry((entry.grain_type.as_str(), fold_case(&entry.agent_address)))
                .or_default();
            slot.calls = slot.calls.saturating_add(entry.call_count);
            slot.await_time += entry.elapsed_time;
            slot.exceptions = slot.exceptions.saturating_add(entry.exception_count);
        }

        let simple_grain_stats = reading
            .simple_grain_statistics
            .into_iter()
            .map(|stat| {
                let found = totals
                    .get(&(stat.grain_type.as_str(), fold_case(&stat.agent_address)))
                    .copied()
                    .unwrap_or_default();
                SimpleGrainStatisticCounter {
                    grain_type: stat.grain_type,
                    agent_address: stat.agent_address,
                    activation_count: stat.activation_count,
                    total_calls: found.calls,
                    total_await_time: found.await_time,
                    total_exceptions: found.exceptions,
                    total_seconds,
                }
            })
            .collect();

        CountersSnapshot {
            total_activation_count: reading.total_activation_count,
            total_active_host_count,
            total_activation_count_history: self.activation_history.iter().copied().collect(),
            total_active_host_count_history: self.active_host_history.iter().copied().collect(),
            hosts: reading.hosts,
            simple_grain_stats,
            taken_at: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SiloStatus;
    use crate::trace::MethodReport;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn reading(activations: u64, active: usize, dead: usize) -> ClusterReading {
        let mut hosts: Vec<_> = (0..active)
            .map(|i| SiloDetails::new(format!("10.0.0.{i}:11111"), SiloStatus::Active))
            .collect();
        hosts.extend((0..dead).map(|i| SiloDetails::new(format!("10.0.1.{i}:11111"), SiloStatus::Dead)));
        ClusterReading {
            total_activation_count: activations,
            simple_grain_statistics: Vec::new(),
            hosts,
        }
    }

    #[test]
    fn test_counts_only_active_hosts() {
        let mut builder = SnapshotBuilder::new(10, t0());
        let snapshot = builder.build(reading(12, 2, 3), &[], t0());

        assert_eq!(snapshot.total_active_host_count, 2);
        assert_eq!(snapshot.total_activation_count, 12);
        assert_eq!(snapshot.hosts.len(), 5);
        assert_eq!(snapshot.taken_at, Some(t0()));
    }

    #[test]
    fn test_history_is_capped_and_chronological() {
        let mut builder = SnapshotBuilder::new(3, t0());
        let mut last = CountersSnapshot::default();
        for i in 1..=5u64 {
            last = builder.build(reading(i * 10, i as usize, 0), &[], t0());
        }

        assert_eq!(last.total_activation_count_history, vec![30, 40, 50]);
        assert_eq!(last.total_active_host_count_history, vec![3, 4, 5]);
    }

    #[test]
    fn test_history_grows_until_cap() {
        let mut builder = SnapshotBuilder::new(3, t0());
        let first = builder.build(reading(1, 1, 0), &[], t0());
        let second = builder.build(reading(2, 1, 0), &[], t0());

        assert_eq!(first.total_activation_count_history, vec![1]);
        assert_eq!(second.total_activation_count_history, vec![1, 2]);
    }

    #[test]
    fn test_elapsed_seconds_is_capped() {
        let builder = SnapshotBuilder::new(3, t0());
        assert_eq!(builder.elapsed_seconds(t0()), 0.0);
        assert_eq!(builder.elapsed_seconds(t0() + chrono::Duration::milliseconds(2500)), 2.5);
        assert_eq!(builder.elapsed_seconds(t0() + chrono::Duration::seconds(3600)), 100.0);
        assert_eq!(builder.elapsed_seconds(t0() - chrono::Duration::seconds(5)), 0.0);
    }

    #[test]
    fn test_joins_grain_statistics_with_traced_totals() {
        let entries = vec![
            TraceEntry::from_report(MethodReport::new("Foo", "Bar", 5, 10.0, 1), "S1", t0()),
            TraceEntry::from_report(MethodReport::new("Foo", "Baz", 3, 2.0, 0), "s1", t0()),
            TraceEntry::from_report(MethodReport::new("Foo", "Bar", 7, 1.0, 0), "S2", t0()),
            TraceEntry::from_report(MethodReport::new("Qux", "Run", 9, 9.0, 9), "S1", t0()),
        ];
        let mut cluster = reading(4, 2, 0);
        cluster.simple_grain_statistics = vec![
            SimpleGrainStatistic::new("Foo", "S1", 3),
            SimpleGrainStatistic::new("Foo", "S2", 1),
            SimpleGrainStatistic::new("Idle", "S1", 6),
        ];

        let mut builder = SnapshotBuilder::new(10, t0());
        let snapshot = builder.build(cluster, &entries, t0() + chrono::Duration::seconds(4));

        let foo_s1 = &snapshot.simple_grain_stats[0];
        assert_eq!(foo_s1.activation_count, 3);
        assert_eq!((foo_s1.total_calls, foo_s1.total_await_time, foo_s1.total_exceptions), (8, 12.0, 1));
        assert_eq!(foo_s1.total_seconds, 4.0);
        assert_eq!(foo_s1.calls_per_second(), 2.0);
        assert_eq!(foo_s1.average_latency(), 1.5);

        let foo_s2 = &snapshot.simple_grain_stats[1];
        assert_eq!(foo_s2.total_calls, 7);

        let idle = &snapshot.simple_grain_stats[2];
        assert_eq!((idle.total_calls, idle.total_await_time, idle.total_exceptions), (0, 0.0, 0));
        assert_eq!(idle.average_latency(), 0.0);
    }

    #[test]
    fn test_rates_with_zero_seconds() {
        let counter = SimpleGrainStatisticCounter {
            grain_type: "Foo".into(),
            agent_address: "S1".into(),
            activation_count: 1,
            total_calls: 10,
            total_await_time: 5.0,
            total_exceptions: 2,
            total_seconds: 0.0,
        };
        assert_eq!(counter.calls_per_second(), 0.0);
        assert_eq!(counter.exceptions_per_second(), 0.0);
    }
}
