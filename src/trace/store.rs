// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::trace;

use super::{eq_ignore_case, TraceEntry};

/// Ordered, append-only collection of trace entries bounded by a retention
/// window.
///
/// Entries are kept in ingestion order. The store is owned by the engine task
/// and is only ever mutated from there, so it carries no locking of its own.
#[derive(Debug, Default, Clone)]
pub struct TraceStore {
    entries: Vec<TraceEntry>,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All retained entries, oldest first.
    #[inline]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Entries reported by `agent_address` (case-insensitive).
    pub fn entries_for_agent<'a>(
        &'a self,
        agent_address: &'a str,
    ) -> impl Iterator<Item = &'a TraceEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| eq_ignore_case(&entry.agent_address, agent_address))
    }

    pub fn append(&mut self, batch: impl IntoIterator<Item = TraceEntry>) {
        self.entries.extend(batch);
    }

    /// Removes every entry with `period < now - window` and returns how many
    /// were dropped. An entry exactly `window` old is kept.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        let Some(horizon) = horizon(now, window) else {
            return 0;
        };

        let before = self.entries.len();
        self.entries.retain(|entry| entry.period >= horizon);
        let removed = before - self.entries.len();

        if removed > 0 {
            trace!(
                "Pruned {} trace entries older than {} ({} retained)",
                removed,
                horizon,
                self.entries.len()
            );
        }
        removed
    }
}

fn horizon(now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    let window = chrono::Duration::from_std(window).ok()?;
    now.checked_sub_signed(window)
}
