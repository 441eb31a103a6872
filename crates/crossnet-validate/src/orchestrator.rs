//! Deployment validation across a set of clusters
//!
//! Each cluster is validated in turn: its connector is fetched, the mesh
//! workloads are health-checked, then the endpoint snapshot is checked for
//! CIDR overlaps. Findings are collected into a [`ValidationSummary`];
//! anything that prevents a cluster from being inspected at all aborts the
//! run with an [`Error`].

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::Api;
use kube::{Client, ResourceExt};
use tracing::{info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crossnet_common::crd::MeshConnector;
use crossnet_common::{ClusterId, CONNECTOR_NAME, OPERATOR_NAMESPACE};

use crate::endpoint::{EndpointStore, KubeEndpointStore};
use crate::error::{Error, Result};
use crate::health::{
    check_workloads, required_workloads, HealthReport, KubeWorkloadSource, WorkloadStatusSource,
};
use crate::overlap::{detect_overlaps, OverlapCheck, OverlapError};

/// Warning recorded when a cluster has no connector installed
pub const CONNECTOR_MISSING: &str = "the crossnet connector is not installed";

/// Settings for one validation run.
///
/// Which clusters are validated is decided by the caller through the
/// [`ClusterHandle`]s it passes in.
#[derive(Clone, Debug)]
pub struct ValidateConfig {
    /// Namespace the mesh workloads run in
    pub operator_namespace: String,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            operator_namespace: OPERATOR_NAMESPACE.to_string(),
        }
    }
}

/// Read access to a cluster's MeshConnector
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConnectorSource: Send + Sync {
    /// Fetch the connector, or `None` when it is not installed
    async fn get_connector(
        &self,
        namespace: &str,
    ) -> std::result::Result<Option<MeshConnector>, crossnet_common::Error>;
}

/// Connector source backed by the MeshConnector API
pub struct KubeConnectorSource {
    client: Client,
}

impl KubeConnectorSource {
    /// Create a source wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConnectorSource for KubeConnectorSource {
    #[instrument(skip(self))]
    async fn get_connector(
        &self,
        namespace: &str,
    ) -> std::result::Result<Option<MeshConnector>, crossnet_common::Error> {
        let api: Api<MeshConnector> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(CONNECTOR_NAME).await?)
    }
}

/// Everything needed to validate one cluster
#[derive(Clone)]
pub struct ClusterHandle {
    /// Display name, usually the kubeconfig context
    pub name: String,
    /// Connector lookup
    pub connectors: Arc<dyn ConnectorSource>,
    /// Endpoint listing
    pub endpoints: Arc<dyn EndpointStore>,
    /// Workload replica counts
    pub workloads: Arc<dyn WorkloadStatusSource>,
}

impl ClusterHandle {
    /// Build a handle whose collaborators all talk to one kube Client
    pub fn kube(name: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            connectors: Arc::new(KubeConnectorSource::new(client.clone())),
            endpoints: Arc::new(KubeEndpointStore::new(client.clone())),
            workloads: Arc::new(KubeWorkloadSource::new(client)),
        }
    }
}

/// Overlap result for one cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OverlapOutcome {
    /// Detection ran to completion
    Checked(OverlapCheck),
    /// The snapshot holds duplicate registrations for a cluster
    StaleRegistration {
        /// Cluster registered more than once
        cluster: ClusterId,
    },
}

impl OverlapOutcome {
    /// True when the cluster's view of the mesh has no overlaps
    pub fn passed(&self) -> bool {
        match self {
            OverlapOutcome::Checked(check) => check.passed(),
            OverlapOutcome::StaleRegistration { .. } => false,
        }
    }

    /// Operator-facing description of the result
    pub fn message(&self) -> String {
        match self {
            OverlapOutcome::Checked(check) => check.message(),
            OverlapOutcome::StaleRegistration { cluster } => {
                format!("stale endpoints are present for cluster {:?}", cluster.as_str())
            }
        }
    }
}

/// Findings for one cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterValidation {
    /// Cluster display name
    pub cluster: String,
    /// ClusterId reported by the connector
    pub cluster_id: ClusterId,
    /// Workload health gates
    pub health: HealthReport,
    /// CIDR overlap check
    pub overlap: OverlapOutcome,
}

impl ClusterValidation {
    /// True when every check on this cluster passed
    pub fn passed(&self) -> bool {
        self.health.passed() && self.overlap.passed()
    }
}

/// Findings for a whole validation run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    /// Per-cluster results, in validation order
    pub clusters: Vec<ClusterValidation>,
    /// Non-failing observations
    pub warnings: Vec<String>,
}

impl ValidationSummary {
    /// True when every validated cluster passed
    pub fn passed(&self) -> bool {
        self.clusters.iter().all(ClusterValidation::passed)
    }
}

/// Validate the mesh deployment on each cluster in order.
///
/// A cluster with no connector ends the run early with a warning and a
/// passing summary, since the mesh is not installed there.
pub async fn validate_deployment(
    clusters: &[ClusterHandle],
    config: &ValidateConfig,
) -> Result<ValidationSummary> {
    let mut summary = ValidationSummary::default();

    for handle in clusters {
        let connector = handle
            .connectors
            .get_connector(&config.operator_namespace)
            .await
            .map_err(|e| Error::remote(&handle.name, e))?;

        let Some(connector) = connector else {
            warn!(cluster = %handle.name, "Connector not installed, skipping validation");
            summary
                .warnings
                .push(format!("cluster {}: {}", handle.name, CONNECTOR_MISSING));
            return Ok(summary);
        };

        let validation = validate_cluster(handle, &connector, config).await?;
        if validation.passed() {
            info!(cluster = %handle.name, "Cluster validation passed");
        } else {
            warn!(cluster = %handle.name, "Cluster validation found problems");
        }
        summary.clusters.push(validation);
    }

    Ok(summary)
}

#[instrument(skip_all, fields(cluster = %handle.name))]
async fn validate_cluster(
    handle: &ClusterHandle,
    connector: &MeshConnector,
    config: &ValidateConfig,
) -> Result<ClusterValidation> {
    let cluster_id = ClusterId::new(connector.local_cluster_id()).map_err(|e| Error::Connector {
        cluster: handle.name.clone(),
        source: e,
    })?;

    info!(cluster_id = %cluster_id, "Validating mesh workloads");
    let workloads = required_workloads(connector);
    let health = check_workloads(
        handle.workloads.as_ref(),
        &config.operator_namespace,
        &workloads,
    )
    .await;

    // Endpoints are synced into the connector's own namespace
    let namespace = connector
        .namespace()
        .unwrap_or_else(|| config.operator_namespace.clone());
    let snapshot = handle
        .endpoints
        .list_endpoints(&namespace)
        .await
        .map_err(|e| Error::remote(&handle.name, e))?;

    info!(endpoints = snapshot.len(), "Verifying if cluster CIDRs overlap");
    let overlap = match detect_overlaps(&snapshot, &cluster_id) {
        Ok(check) => OverlapOutcome::Checked(check),
        Err(OverlapError::StaleRegistration { cluster }) => {
            OverlapOutcome::StaleRegistration { cluster }
        }
        Err(source) => {
            return Err(Error::Input {
                cluster: handle.name.clone(),
                source,
            })
        }
    };

    Ok(ClusterValidation {
        cluster: handle.name.clone(),
        cluster_id,
        health,
        overlap,
    })
}
