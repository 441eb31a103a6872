//! Common types for crossnet: CRDs, cluster identity, errors, and utilities

#![deny(missing_docs)]

pub mod cluster_id;
pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod retry;

pub use cluster_id::ClusterId;
pub use error::Error;
pub use retry::BackoffPolicy;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace the crossnet operator and its components run in
pub const OPERATOR_NAMESPACE: &str = "crossnet-operator";

/// Name of the singleton Broker resource
pub const BROKER_NAME: &str = "crossnet-broker";

/// Name of the per-cluster MeshConnector resource
pub const CONNECTOR_NAME: &str = "crossnet";

/// Field manager used for server-side writes
pub const FIELD_MANAGER: &str = "crossnet";

/// Environment variable that overrides the default kubeconfig location
pub const KUBECONFIG_ENV: &str = "CROSSNET_KUBECONFIG";
