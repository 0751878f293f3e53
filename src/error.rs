// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug)]
/// Represents errors that can occur while talking to the dashboard engine or
/// while refreshing counters from the cluster collaborators.
///
/// Ingestion and query calls can only fail with [`Error::Send`],
/// [`Error::Receive`] or [`Error::InvalidArgument`]. [`Error::Provider`] is
/// produced by [`ClusterStatistics`](crate::ClusterStatistics) and
/// [`SiloTopology`](crate::SiloTopology) implementations and is contained
/// inside the refresh tick that observed it.
pub enum Error {
    /// Error when sending a command to the engine
    Send {
        /// Additional context about the error
        details: String,
    },
    /// Error when receiving a reply from the engine
    Receive {
        /// Additional context about the error
        details: String,
    },
    /// Error reported by an external cluster collaborator
    Provider {
        /// Collaborator operation that failed (e.g., "silo_details")
        operation: &'static str,
        /// Additional context about the error
        details: String,
    },
    /// Error when a caller supplies an argument the engine cannot accept
    InvalidArgument {
        /// Name of the offending argument
        argument: &'static str,
        /// Additional context about the error
        details: String,
    },
    /// Error when awaiting the engine's JoinHandle fails
    Join {
        /// The original JoinError from tokio
        source: tokio::task::JoinError,
    },
}

impl Error {
    /// Convenience constructor for collaborator implementations.
    pub fn provider(operation: &'static str, details: impl Into<String>) -> Self {
        Error::Provider {
            operation,
            details: details.into(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Send { details } => {
                write!(f, "Failed to send command to dashboard engine: {details}")
            }
            Error::Receive { details } => {
                write!(f, "Failed to receive reply from dashboard engine: {details}")
            }
            Error::Provider { operation, details } => {
                write!(f, "Cluster collaborator call '{operation}' failed: {details}")
            }
            Error::InvalidArgument { argument, details } => {
                write!(f, "Invalid argument '{argument}': {details}")
            }
            Error::Join { source } => {
                write!(f, "Failed to join dashboard engine task: {source}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Join { source } => Some(source),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(source: tokio::task::JoinError) -> Self {
        Error::Join { source }
    }
}

/// A Result type specialized for dashboard operations.
pub type Result<T> = std::result::Result<T, Error>;
