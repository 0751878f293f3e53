// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;

use super::{gap_fill, MethodReport, TraceEntry, TraceStore};

/// Accepts one agent's report batch and folds it into a [`TraceStore`].
///
/// Ingestion is synchronous end to end: callers observe the store either
/// before or after a whole batch, never in between.
#[derive(Debug, Clone, Copy)]
pub struct Ingestor {
    retention_window: Duration,
}

/// Outcome of a single [`Ingestor::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestStats {
    pub reported: usize,
    pub gap_filled: usize,
    pub pruned: usize,
}

impl Ingestor {
    pub fn new(retention_window: Duration) -> Self {
        Self { retention_window }
    }

    pub fn retention_window(&self) -> Duration {
        self.retention_window
    }

    /// Stamps `reports` with `now`, gap-fills silent methods, appends the
    /// result and prunes entries past the retention window.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, store, reports), fields(reports = reports.len()))
    )]
    pub fn submit(
        &self,
        store: &mut TraceStore,
        agent_address: &str,
        reports: Vec<MethodReport>,
        now: DateTime<Utc>,
    ) -> IngestStats {
        let mut batch: Vec<TraceEntry> = reports
            .into_iter()
            .map(|report| TraceEntry::from_report(report, agent_address, now))
            .collect();
        let reported = batch.len();

        let history = store.entries_for_agent(agent_address);
        let zeros = gap_fill::fill(agent_address, &batch, history, now);
        let gap_filled = zeros.len();
        batch.extend(zeros);

        store.append(batch);
        let pruned = store.prune(now, self.retention_window);

        debug!(
            "Ingested {} reports from {} ({} gap-filled, {} pruned, {} retained)",
            reported,
            agent_address,
            gap_filled,
            pruned,
            store.len()
        );

        IngestStats {
            reported,
            gap_filled,
            pruned,
        }
    }
}
