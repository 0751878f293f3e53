// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Period rollups over a read-only view of trace entries.
//!
//! Every function here is pure: it takes a slice of the store, a
//! [`PeriodFormat`] and returns freshly built maps. Entries are put into a
//! total order before they are folded, so the result, including floating
//! point sums and the display fields taken from the first contributor,
//! depends only on the set of entries and never on insertion order.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::PeriodFormat;
use crate::trace::{eq_ignore_case, TraceEntry};

/// Summed counters of every entry sharing a grouping key.
///
/// `grain_type` and `method` come from the first contributing entry and are
/// display metadata only; they never take part in grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodRollup {
    pub grain_type: String,
    pub method: String,
    pub period: String,
    pub count: u64,
    pub elapsed_time: f64,
    pub exception_count: u64,
}

impl PeriodRollup {
    fn first(period: String, entry: &TraceEntry) -> Self {
        Self {
            grain_type: entry.grain_type.clone(),
            method: entry.method.clone(),
            period,
            count: entry.call_count,
            elapsed_time: entry.elapsed_time,
            exception_count: entry.exception_count,
        }
    }

    fn add(&mut self, entry: &TraceEntry) {
        self.count = self.count.saturating_add(entry.call_count);
        self.elapsed_time += entry.elapsed_time;
        self.exception_count = self.exception_count.saturating_add(entry.exception_count);
    }
}

/// Rollups keyed by period label.
pub type PeriodRollups = BTreeMap<String, PeriodRollup>;

/// Rollups keyed by `grainType.method`, then by period label.
pub type GrainTracing = BTreeMap<String, PeriodRollups>;

fn canonical<'a>(entries: impl IntoIterator<Item = &'a TraceEntry>) -> Vec<&'a TraceEntry> {
    let mut ordered: Vec<&TraceEntry> = entries.into_iter().collect();
    ordered.sort_by(|a, b| a.canonical_cmp(b));
    ordered
}

/// Groups `entries` by period label and sums their counters.
pub fn aggregate<'a>(
    entries: impl IntoIterator<Item = &'a TraceEntry>,
    format: &PeriodFormat,
) -> PeriodRollups {
    let mut rollups = PeriodRollups::new();
    for trace in canonical(entries) {
        match rollups.entry(format.label(&trace.period)) {
            Entry::Occupied(mut slot) => slot.get_mut().add(trace),
            Entry::Vacant(slot) => {
                let period = slot.key().clone();
                slot.insert(PeriodRollup::first(period, trace));
            }
        }
    }
    rollups
}

/// Cluster-wide rollups: every retained entry, grouped by period.
pub fn cluster_tracing(entries: &[TraceEntry], format: &PeriodFormat) -> PeriodRollups {
    aggregate(entries, format)
}

/// Rollups for one reporting agent (address compared case-insensitively).
pub fn agent_tracing(
    entries: &[TraceEntry],
    agent_address: &str,
    format: &PeriodFormat,
) -> PeriodRollups {
    aggregate(
        entries
            .iter()
            .filter(|entry| eq_ignore_case(&entry.agent_address, agent_address)),
        format,
    )
}

/// Rollups for one grain type, grouped by method and then by period.
pub fn grain_tracing(entries: &[TraceEntry], grain_type: &str, format: &PeriodFormat) -> GrainTracing {
    let mut by_method: BTreeMap<String, Vec<&TraceEntry>> = BTreeMap::new();
    for entry in entries.iter().filter(|entry| entry.grain_type == grain_type) {
        by_method
            .entry(format!("{}.{}", entry.grain_type, entry.method))
            .or_default()
            .push(entry);
    }

    by_method
        .into_iter()
        .map(|(key, group)| (key, aggregate(group, format)))
        .collect()
}

/// Totals for one grain type and method over the retained window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodTotals {
    pub grain_type: String,
    pub method: String,
    pub count: u64,
    pub elapsed_time: f64,
    pub exception_count: u64,
}

impl MethodTotals {
    /// Mean elapsed time per call, zero when the method was never called.
    pub fn average_latency(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.elapsed_time / self.count as f64
        }
    }

    /// Share of calls that failed.
    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.exception_count as f64 / self.count as f64
        }
    }
}

/// Busiest, slowest and most failing methods of the retained window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopGrainMethods {
    pub calls: Vec<MethodTotals>,
    pub latency: Vec<MethodTotals>,
    pub errors: Vec<MethodTotals>,
}

/// Ranks grain methods by call count, average latency and error rate, keeping
/// `take` of each. Only methods with at least one call are ranked by latency
/// and only methods with at least one exception by error rate. Ties fall back
/// to grain type then method name.
pub fn top_grain_methods(entries: &[TraceEntry], take: usize) -> TopGrainMethods {
    let mut totals: BTreeMap<(&str, &str), MethodTotals> = BTreeMap::new();
    for trace in canonical(entries) {
        let slot = totals
            .entry((trace.grain_type.as_str(), trace.method.as_str()))
            .or_insert_with(|| MethodTotals {
                grain_type: trace.grain_type.clone(),
                method: trace.method.clone(),
                count: 0,
                elapsed_time: 0.0,
                exception_count: 0,
            });
        slot.count = slot.count.saturating_add(trace.call_count);
        slot.elapsed_time += trace.elapsed_time;
        slot.exception_count = slot.exception_count.saturating_add(trace.exception_count);
    }
    // BTreeMap order gives the (grain type, method) tie-break; the sorts below are stable.
    let totals: Vec<MethodTotals> = totals.into_values().collect();

    let mut calls: Vec<MethodTotals> = totals.iter().filter(|t| t.count > 0).cloned().collect();
    calls.sort_by(|a, b| b.count.cmp(&a.count));
    calls.truncate(take);

    let mut latency: Vec<MethodTotals> = totals.iter().filter(|t| t.count > 0).cloned().collect();
    latency.sort_by(|a, b| b.average_latency().total_cmp(&a.average_latency()));
    latency.truncate(take);

    let mut errors: Vec<MethodTotals> = totals
        .into_iter()
        .filter(|t| t.exception_count > 0)
        .collect();
    errors.sort_by(|a, b| b.error_rate().total_cmp(&a.error_rate()));
    errors.truncate(take);

    TopGrainMethods {
        calls,
        latency,
        errors,
    }
}
