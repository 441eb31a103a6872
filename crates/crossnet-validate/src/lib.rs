//! Mesh deployment validation for crossnet
//!
//! - [`overlap`]: pure CIDR overlap detector over an endpoint snapshot
//! - [`endpoint`]: endpoint store abstraction over registered MeshEndpoints
//! - [`health`]: replica-count gates for the mesh's DaemonSets and Deployments
//! - [`orchestrator`]: per-cluster sequencing of the checks above

#![deny(missing_docs)]

pub mod endpoint;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod overlap;

pub use endpoint::{Endpoint, EndpointSnapshot, EndpointStore, KubeEndpointStore};
pub use error::{Error, Result};
pub use health::{
    check_workloads, required_workloads, HealthFinding, HealthProblem, HealthReport,
    KubeWorkloadSource, ReplicaCounts, RequiredWorkload, WorkloadKind, WorkloadStatusSource,
};
pub use orchestrator::{
    validate_deployment, ClusterHandle, ClusterValidation, ConnectorSource, KubeConnectorSource,
    OverlapOutcome, ValidateConfig, ValidationSummary,
};
pub use overlap::{detect_overlaps, OverlapCheck, OverlapError, OverlapReport, OverlapVerdict};
