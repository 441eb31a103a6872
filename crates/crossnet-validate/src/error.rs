//! Error types for deployment validation
//!
//! Only failures that stop the whole validation run are errors here.
//! Findings (unhealthy workloads, overlaps, stale registrations) are recorded
//! in the [`ValidationSummary`](crate::ValidationSummary) instead.

use thiserror::Error;

use crate::overlap::OverlapError;

/// Result type for validation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal validation errors
#[derive(Debug, Error)]
pub enum Error {
    /// A cluster could not be queried
    #[error("cluster {cluster}: {source}")]
    Remote {
        /// Name of the cluster (kubeconfig context) being validated
        cluster: String,
        /// Underlying error
        #[source]
        source: crossnet_common::Error,
    },

    /// The cluster's connector does not identify the cluster usably
    #[error("cluster {cluster}: unusable connector: {source}")]
    Connector {
        /// Name of the cluster (kubeconfig context) being validated
        cluster: String,
        /// Underlying error
        #[source]
        source: crossnet_common::Error,
    },

    /// The overlap check hit invalid input
    #[error("cluster {cluster}: {source}")]
    Input {
        /// Name of the cluster (kubeconfig context) being validated
        cluster: String,
        /// Underlying detector error
        #[source]
        source: OverlapError,
    },

    /// Shared error without cluster context
    #[error(transparent)]
    Common(#[from] crossnet_common::Error),
}

impl Error {
    /// Wrap a shared error with the cluster it came from
    pub fn remote(cluster: impl Into<String>, source: crossnet_common::Error) -> Self {
        Self::Remote {
            cluster: cluster.into(),
            source,
        }
    }
}
