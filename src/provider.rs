// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Contracts with the cluster collaborators consulted on every counter
//! refresh.
//!
//! Membership and activation bookkeeping live outside this crate. The engine
//! only needs the three reads below; implementations typically forward them
//! to the management interface of the hosting cluster.
//!
//! Methods are native async trait methods returning `Send` futures, so an
//! implementation can simply write `async fn`:
//!
//! ```rust
//! use grain_dashboard::{ClusterStatistics, Result, SimpleGrainStatistic};
//!
//! struct Fixed;
//!
//! impl ClusterStatistics for Fixed {
//!     async fn total_activation_count(&self) -> Result<u64> {
//!         Ok(42)
//!     }
//!
//!     async fn simple_grain_statistics(&self) -> Result<Vec<SimpleGrainStatistic>> {
//!         Ok(vec![SimpleGrainStatistic::new("Foo", "S1", 42)])
//!     }
//! }
//! ```

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Live activation count of one grain type on one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleGrainStatistic {
    pub grain_type: String,
    pub agent_address: String,
    pub activation_count: u64,
}

impl SimpleGrainStatistic {
    pub fn new(grain_type: impl Into<String>, agent_address: impl Into<String>, activation_count: u64) -> Self {
        Self {
            grain_type: grain_type.into(),
            agent_address: agent_address.into(),
            activation_count,
        }
    }
}

/// Membership status of a silo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiloStatus {
    Created,
    Joining,
    Active,
    ShuttingDown,
    Stopping,
    Dead,
}

impl SiloStatus {
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, SiloStatus::Active)
    }
}

/// One entry of the cluster topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiloDetails {
    pub address: String,
    pub status: SiloStatus,
}

impl SiloDetails {
    pub fn new(address: impl Into<String>, status: SiloStatus) -> Self {
        Self {
            address: address.into(),
            status,
        }
    }
}

/// Activation statistics of the whole cluster.
pub trait ClusterStatistics: Send + Sync + 'static {
    fn total_activation_count(&self) -> impl Future<Output = Result<u64>> + Send;

    fn simple_grain_statistics(&self) -> impl Future<Output = Result<Vec<SimpleGrainStatistic>>> + Send;
}

/// Current cluster membership.
pub trait SiloTopology: Send + Sync + 'static {
    fn silo_details(&self) -> impl Future<Output = Result<Vec<SiloDetails>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_active_counts_as_active() {
        assert!(SiloStatus::Active.is_active());
        for status in [
            SiloStatus::Created,
            SiloStatus::Joining,
            SiloStatus::ShuttingDown,
            SiloStatus::Stopping,
            SiloStatus::Dead,
        ] {
            assert!(!status.is_active());
        }
    }
}
