// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Trace entries and the bounded store that holds them.
//!
//! # Overview
//!
//! Agents report one [`MethodReport`] per (grain type, method) they observed
//! during their last reporting period. The [`Ingestor`] stamps a batch with
//! the ingestion instant, synthesizes zero rows for methods that went silent
//! ([`gap_fill`]), appends everything to the [`TraceStore`] and prunes entries
//! that fell out of the retention window.
//!
//! Stored entries are never mutated. Several entries may share the same
//! (grain type, method, agent, period) key; every reader sums over them.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod gap_fill;
mod ingest;
mod store;

pub use ingest::{IngestStats, Ingestor};
pub use store::TraceStore;

/// One row of an agent's report batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodReport {
    pub grain_type: String,
    pub method: String,
    pub call_count: u64,
    /// Cumulative duration across `call_count` calls.
    pub elapsed_time: f64,
    pub exception_count: u64,
}

impl MethodReport {
    pub fn new(
        grain_type: impl Into<String>,
        method: impl Into<String>,
        call_count: u64,
        elapsed_time: f64,
        exception_count: u64,
    ) -> Self {
        Self {
            grain_type: grain_type.into(),
            method: method.into(),
            call_count,
            elapsed_time,
            exception_count,
        }
    }
}

/// Activity of one (grain type, method, agent) triple over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub grain_type: String,
    pub method: String,
    pub agent_address: String,
    /// Ingestion instant assigned by the aggregator.
    pub period: DateTime<Utc>,
    pub call_count: u64,
    pub elapsed_time: f64,
    pub exception_count: u64,
}

impl TraceEntry {
    pub(crate) fn from_report(
        report: MethodReport,
        agent_address: &str,
        period: DateTime<Utc>,
    ) -> Self {
        Self {
            grain_type: report.grain_type,
            method: report.method,
            agent_address: agent_address.to_string(),
            period,
            call_count: report.call_count,
            elapsed_time: report.elapsed_time,
            exception_count: report.exception_count,
        }
    }

    /// A zero-activity entry for the same grain type and method.
    pub(crate) fn silent(&self, agent_address: &str, period: DateTime<Utc>) -> Self {
        Self {
            grain_type: self.grain_type.clone(),
            method: self.method.clone(),
            agent_address: agent_address.to_string(),
            period,
            call_count: 0,
            elapsed_time: 0.0,
            exception_count: 0,
        }
    }

    /// Total order over every field, used to fold entries in a stable order.
    pub(crate) fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.period
            .cmp(&other.period)
            .then_with(|| self.grain_type.cmp(&other.grain_type))
            .then_with(|| self.method.cmp(&other.method))
            .then_with(|| self.agent_address.cmp(&other.agent_address))
            .then_with(|| self.call_count.cmp(&other.call_count))
            .then_with(|| self.exception_count.cmp(&other.exception_count))
            .then_with(|| self.elapsed_time.total_cmp(&other.elapsed_time))
    }
}

/// Case-insensitive comparison used for agent addresses and method identity.
pub(crate) fn eq_ignore_case(a: &str, b: &str) -> bool {
    if a.is_ascii() && b.is_ascii() {
        return a.eq_ignore_ascii_case(b);
    }
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Folds a string to the form used as a case-insensitive grouping key.
pub(crate) fn fold_case(value: &str) -> String {
    value.to_lowercase()
}
