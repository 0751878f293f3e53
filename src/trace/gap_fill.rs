// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Zero-activity synthesis for methods that stopped reporting.
//!
//! An agent only reports methods that were called during its last period. A
//! method that goes quiet would otherwise simply vanish from the time series,
//! and its last non-zero bucket would read like a current value. For every
//! (grain type, method) the agent reported before but left out of the new
//! batch, [`fill`] produces an entry with all counters at zero, stamped with
//! the new period.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use super::{fold_case, TraceEntry};

type MethodKey = (String, String);

fn method_key(entry: &TraceEntry) -> MethodKey {
    (fold_case(&entry.grain_type), fold_case(&entry.method))
}

/// Returns the zero entries to append alongside `batch`.
///
/// `history` is what the store already holds for `agent_address`, as returned
/// by [`TraceStore::entries_for_agent`](super::TraceStore::entries_for_agent).
/// One representative per (grain type, method) is enough since only its
/// identity fields are reused. Grain type and method are compared
/// case-insensitively. Output is ordered by (grain type, method).
pub fn fill<'a>(
    agent_address: &str,
    batch: &[TraceEntry],
    history: impl IntoIterator<Item = &'a TraceEntry>,
    now: DateTime<Utc>,
) -> Vec<TraceEntry> {
    let reported: HashSet<MethodKey> = batch.iter().map(method_key).collect();

    let mut silent: BTreeMap<MethodKey, &TraceEntry> = BTreeMap::new();
    for entry in history {
        let key = method_key(entry);
        if reported.contains(&key) {
            continue;
        }
        silent.entry(key).or_insert(entry);
    }

    silent
        .into_values()
        .map(|representative| representative.silent(agent_address, now))
        .collect()
}
