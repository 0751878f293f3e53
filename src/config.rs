// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Engine options.
//!
//! Options are plain values; loading them from files or the environment is
//! left to the embedding application.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Lower bound for the counter refresh cadence.
pub const MIN_COUNTER_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Default refresh cadence for [`CountersSnapshot`](crate::CountersSnapshot).
pub const DEFAULT_COUNTER_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Trace entries older than this are pruned after every ingestion.
pub const DEFAULT_RETENTION_WINDOW: Duration = Duration::from_secs(100);

/// Number of points kept in each scalar history series.
pub const DEFAULT_HISTORY_LENGTH: usize = 100;

/// Cap applied to the seconds-since-start denominator of rate displays.
pub const ELAPSED_SECONDS_CAP: f64 = 100.0;

/// Default mailbox capacity of the engine task.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;

type LabelFn = dyn Fn(&DateTime<Utc>) -> String + Send + Sync;

/// Turns an ingestion timestamp into the period label used as grouping key.
///
/// Two timestamps mapping to the same label are always aggregated together,
/// so the function must be deterministic. Labels produced by the built-in
/// formats sort chronologically as strings.
#[derive(Clone)]
pub struct PeriodFormat {
    name: &'static str,
    label: Arc<LabelFn>,
}

impl PeriodFormat {
    /// One bucket per second, e.g. `2024-05-01T12:00:05`.
    pub fn seconds() -> Self {
        Self::strftime("seconds", "%Y-%m-%dT%H:%M:%S")
    }

    /// One bucket per minute, e.g. `2024-05-01T12:00`.
    pub fn minutes() -> Self {
        Self::strftime("minutes", "%Y-%m-%dT%H:%M")
    }

    /// Wraps a caller supplied label function.
    pub fn custom<F>(name: &'static str, label: F) -> Self
    where
        F: Fn(&DateTime<Utc>) -> String + Send + Sync + 'static,
    {
        Self {
            name,
            label: Arc::new(label),
        }
    }

    fn strftime(name: &'static str, pattern: &'static str) -> Self {
        Self::custom(name, move |period| period.format(pattern).to_string())
    }

    /// Formats `period` into its bucket label.
    #[inline]
    pub fn label(&self, period: &DateTime<Utc>) -> String {
        (self.label)(period)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Default for PeriodFormat {
    fn default() -> Self {
        Self::seconds()
    }
}

impl fmt::Debug for PeriodFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodFormat")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Options for a dashboard engine.
#[derive(Debug, Clone)]
pub struct DashboardOptions {
    counter_update_interval: Duration,
    retention_window: Duration,
    history_length: usize,
    mailbox_capacity: usize,
    period_format: PeriodFormat,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            counter_update_interval: DEFAULT_COUNTER_UPDATE_INTERVAL,
            retention_window: DEFAULT_RETENTION_WINDOW,
            history_length: DEFAULT_HISTORY_LENGTH,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            period_format: PeriodFormat::default(),
        }
    }
}

impl DashboardOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the refresh cadence. Values below one second are raised to one
    /// second when read back.
    pub fn with_counter_update_interval(mut self, interval: Duration) -> Self {
        self.counter_update_interval = interval;
        self
    }

    /// Sets the refresh cadence from signed milliseconds, the way it usually
    /// arrives from configuration files. Non-positive values fall back to the
    /// floor.
    pub fn with_counter_update_interval_ms(self, millis: i64) -> Self {
        let interval = u64::try_from(millis)
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO);
        self.with_counter_update_interval(interval)
    }

    pub fn with_retention_window(mut self, window: Duration) -> Self {
        self.retention_window = window;
        self
    }

    /// Sets `H`, the length of both scalar history series. Zero is treated
    /// as one.
    pub fn with_history_length(mut self, length: usize) -> Self {
        self.history_length = length;
        self
    }

    /// Sets the engine mailbox capacity. Zero is treated as one.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn with_period_format(mut self, format: PeriodFormat) -> Self {
        self.period_format = format;
        self
    }

    /// Effective refresh cadence, never below [`MIN_COUNTER_UPDATE_INTERVAL`].
    pub fn counter_update_interval(&self) -> Duration {
        self.counter_update_interval.max(MIN_COUNTER_UPDATE_INTERVAL)
    }

    pub fn retention_window(&self) -> Duration {
        self.retention_window
    }

    pub fn history_length(&self) -> usize {
        self.history_length.max(1)
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox_capacity.max(1)
    }

    pub fn period_format(&self) -> &PeriodFormat {
        &self.period_format
    }
}
