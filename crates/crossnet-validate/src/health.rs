//! Replica-count health gates for the mesh workloads
//!
//! Each cluster runs the gateway and route agent DaemonSets, plus the
//! service discovery Deployments and the globalnet DaemonSet when those
//! features are enabled on its connector. A workload is healthy when every
//! replica the controller wants is actually there.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::api::Api;
use kube::Client;
use tracing::{debug, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crossnet_common::crd::MeshConnector;
use crossnet_common::Error;

/// Gateway engine DaemonSet
pub const GATEWAY_DAEMONSET: &str = "crossnet-gateway";
/// Route agent DaemonSet
pub const ROUTE_AGENT_DAEMONSET: &str = "crossnet-routeagent";
/// Service discovery agent Deployment
pub const LIGHTHOUSE_AGENT_DEPLOYMENT: &str = "crossnet-lighthouse-agent";
/// Service discovery DNS Deployment
pub const LIGHTHOUSE_COREDNS_DEPLOYMENT: &str = "crossnet-lighthouse-coredns";
/// Globalnet DaemonSet
pub const GLOBALNET_DAEMONSET: &str = "crossnet-globalnet";

/// Workload controller type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    /// One pod per eligible node
    DaemonSet,
    /// Fixed replica count
    Deployment,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::DaemonSet => f.write_str("DaemonSet"),
            WorkloadKind::Deployment => f.write_str("Deployment"),
        }
    }
}

/// A workload that must be healthy for the mesh to function
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequiredWorkload {
    /// Resource name in the operator namespace
    pub name: &'static str,
    /// Controller type
    pub kind: WorkloadKind,
}

impl RequiredWorkload {
    const fn daemonset(name: &'static str) -> Self {
        Self {
            name,
            kind: WorkloadKind::DaemonSet,
        }
    }

    const fn deployment(name: &'static str) -> Self {
        Self {
            name,
            kind: WorkloadKind::Deployment,
        }
    }
}

impl fmt::Display for RequiredWorkload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.kind, self.name)
    }
}

/// Workloads a connector implies, in check order
pub fn required_workloads(connector: &MeshConnector) -> Vec<RequiredWorkload> {
    let mut workloads = vec![
        RequiredWorkload::daemonset(GATEWAY_DAEMONSET),
        RequiredWorkload::daemonset(ROUTE_AGENT_DAEMONSET),
    ];
    if connector.spec.service_discovery_enabled {
        workloads.push(RequiredWorkload::deployment(LIGHTHOUSE_AGENT_DEPLOYMENT));
        workloads.push(RequiredWorkload::deployment(LIGHTHOUSE_COREDNS_DEPLOYMENT));
    }
    if connector.globalnet_enabled() {
        workloads.push(RequiredWorkload::daemonset(GLOBALNET_DAEMONSET));
    }
    workloads
}

/// Desired versus actual replica counts of one workload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplicaCounts {
    /// Replicas the controller wants
    pub desired: i32,
    /// Replicas that are scheduled (DaemonSet) or available (Deployment)
    pub ready: i32,
}

impl ReplicaCounts {
    /// Healthy iff every desired replica is present
    pub fn is_healthy(&self) -> bool {
        self.ready == self.desired
    }

    /// Counts of a DaemonSet: current scheduled against desired scheduled
    pub fn from_daemonset(daemonset: &DaemonSet) -> Self {
        daemonset
            .status
            .as_ref()
            .map(|s| Self {
                desired: s.desired_number_scheduled,
                ready: s.current_number_scheduled,
            })
            .unwrap_or_default()
    }

    /// Counts of a Deployment: available against spec replicas (default 1)
    pub fn from_deployment(deployment: &Deployment) -> Self {
        let desired = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let ready = deployment
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);
        Self { desired, ready }
    }
}

/// Read access to workload replica counts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadStatusSource: Send + Sync {
    /// Replica counts of a DaemonSet
    async fn daemonset_status(&self, namespace: &str, name: &str) -> Result<ReplicaCounts, Error>;

    /// Replica counts of a Deployment
    async fn deployment_status(&self, namespace: &str, name: &str)
        -> Result<ReplicaCounts, Error>;
}

/// Workload source backed by the apps/v1 API
pub struct KubeWorkloadSource {
    client: Client,
}

impl KubeWorkloadSource {
    /// Create a source wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadStatusSource for KubeWorkloadSource {
    #[instrument(skip(self))]
    async fn daemonset_status(&self, namespace: &str, name: &str) -> Result<ReplicaCounts, Error> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        let daemonset = api.get(name).await?;
        Ok(ReplicaCounts::from_daemonset(&daemonset))
    }

    #[instrument(skip(self))]
    async fn deployment_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicaCounts, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = api.get(name).await?;
        Ok(ReplicaCounts::from_deployment(&deployment))
    }
}

/// Why a workload failed its health gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthProblem {
    /// The workload could not be read
    Unreadable(String),
    /// Fewer replicas than desired
    Degraded(ReplicaCounts),
}

/// The first workload that failed its health gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthFinding {
    /// The failing workload
    pub workload: RequiredWorkload,
    /// What is wrong with it
    pub problem: HealthProblem,
}

impl fmt::Display for HealthFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            HealthProblem::Unreadable(reason) => {
                write!(f, "error retrieving {}: {}", self.workload, reason)
            }
            HealthProblem::Degraded(counts) => match self.workload.kind {
                WorkloadKind::DaemonSet => write!(
                    f,
                    "the desired number of {} pods is {}, but the current number scheduled is {}",
                    self.workload, counts.desired, counts.ready
                ),
                WorkloadKind::Deployment => write!(
                    f,
                    "the desired number of {} replicas is {}, but the number available is {}",
                    self.workload, counts.desired, counts.ready
                ),
            },
        }
    }
}

/// Result of the health gates for one cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Workloads that passed, in check order
    pub healthy: Vec<RequiredWorkload>,
    /// First failure, after which no further workloads are checked
    pub failure: Option<HealthFinding>,
}

impl HealthReport {
    /// True when every required workload is healthy
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Check workloads in order, stopping at the first failure
pub async fn check_workloads(
    source: &dyn WorkloadStatusSource,
    namespace: &str,
    workloads: &[RequiredWorkload],
) -> HealthReport {
    let mut report = HealthReport::default();

    for workload in workloads {
        let status = match workload.kind {
            WorkloadKind::DaemonSet => source.daemonset_status(namespace, workload.name).await,
            WorkloadKind::Deployment => source.deployment_status(namespace, workload.name).await,
        };

        let problem = match status {
            Ok(counts) if counts.is_healthy() => {
                debug!(workload = %workload, desired = counts.desired, "Workload healthy");
                report.healthy.push(*workload);
                continue;
            }
            Ok(counts) => HealthProblem::Degraded(counts),
            Err(e) => HealthProblem::Unreadable(e.to_string()),
        };

        let finding = HealthFinding {
            workload: *workload,
            problem,
        };
        warn!(namespace, finding = %finding, "Workload health check failed");
        report.failure = Some(finding);
        break;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossnet_common::crd::MeshConnectorSpec;
    use k8s_openapi::api::apps::v1::{
        DaemonSetStatus, DeploymentSpec, DeploymentStatus,
    };
    use mockall::predicate::eq;

    fn connector(service_discovery: bool, global_cidr: Option<&str>) -> MeshConnector {
        MeshConnector::new(
            "crossnet",
            MeshConnectorSpec {
                service_discovery_enabled: service_discovery,
                global_cidr: global_cidr.map(str::to_string),
                ..Default::default()
            },
        )
    }

    fn names(workloads: &[RequiredWorkload]) -> Vec<&'static str> {
        workloads.iter().map(|w| w.name).collect()
    }

    #[test]
    fn base_workloads_always_required() {
        let workloads = required_workloads(&connector(false, None));
        assert_eq!(names(&workloads), vec![GATEWAY_DAEMONSET, ROUTE_AGENT_DAEMONSET]);
    }

    #[test]
    fn optional_workloads_follow_connector_features() {
        let workloads = required_workloads(&connector(true, Some("242.0.0.0/16")));
        assert_eq!(
            names(&workloads),
            vec![
                GATEWAY_DAEMONSET,
                ROUTE_AGENT_DAEMONSET,
                LIGHTHOUSE_AGENT_DEPLOYMENT,
                LIGHTHOUSE_COREDNS_DEPLOYMENT,
                GLOBALNET_DAEMONSET,
            ]
        );
        assert_eq!(workloads[2].kind, WorkloadKind::Deployment);
        assert_eq!(workloads[4].kind, WorkloadKind::DaemonSet);
    }

    #[test]
    fn empty_global_cidr_does_not_require_globalnet() {
        let workloads = required_workloads(&connector(false, Some("")));
        assert!(!names(&workloads).contains(&GLOBALNET_DAEMONSET));
    }

    #[test]
    fn daemonset_counts_compare_scheduled_pods() {
        let daemonset = DaemonSet {
            status: Some(DaemonSetStatus {
                desired_number_scheduled: 3,
                current_number_scheduled: 2,
                ..Default::default()
            }),
            ..Default::default()
        };
        let counts = ReplicaCounts::from_daemonset(&daemonset);
        assert_eq!(counts, ReplicaCounts { desired: 3, ready: 2 });
        assert!(!counts.is_healthy());
    }

    #[test]
    fn deployment_replicas_default_to_one() {
        let deployment = Deployment {
            spec: Some(DeploymentSpec::default()),
            status: Some(DeploymentStatus {
                available_replicas: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(ReplicaCounts::from_deployment(&deployment).is_healthy());

        let unavailable = Deployment::default();
        assert_eq!(
            ReplicaCounts::from_deployment(&unavailable),
            ReplicaCounts { desired: 1, ready: 0 }
        );
    }

    #[tokio::test]
    async fn all_healthy_workloads_pass() {
        let mut source = MockWorkloadStatusSource::new();
        source
            .expect_daemonset_status()
            .times(2)
            .returning(|_, _| Ok(ReplicaCounts { desired: 2, ready: 2 }));

        let workloads = required_workloads(&connector(false, None));
        let report = check_workloads(&source, "crossnet-operator", &workloads).await;
        assert!(report.passed());
        assert_eq!(report.healthy.len(), 2);
    }

    #[tokio::test]
    async fn first_failure_stops_checks() {
        let mut source = MockWorkloadStatusSource::new();
        source
            .expect_daemonset_status()
            .with(eq("crossnet-operator"), eq(GATEWAY_DAEMONSET))
            .times(1)
            .returning(|_, _| Ok(ReplicaCounts { desired: 3, ready: 1 }));
        source.expect_deployment_status().never();

        let workloads = required_workloads(&connector(true, None));
        let report = check_workloads(&source, "crossnet-operator", &workloads).await;

        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.workload.name, GATEWAY_DAEMONSET);
        assert_eq!(
            failure.problem,
            HealthProblem::Degraded(ReplicaCounts { desired: 3, ready: 1 })
        );
        let message = failure.to_string();
        assert!(message.contains("crossnet-gateway"), "{message}");
        assert!(message.contains('3') && message.contains('1'), "{message}");
        assert!(report.healthy.is_empty());
    }

    #[tokio::test]
    async fn unreadable_workload_is_a_finding() {
        let mut source = MockWorkloadStatusSource::new();
        source
            .expect_daemonset_status()
            .returning(|_, _| Ok(ReplicaCounts { desired: 1, ready: 1 }));
        source
            .expect_deployment_status()
            .times(1)
            .returning(|_, name| Err(Error::validation(format!("{} not found", name))));

        let workloads = required_workloads(&connector(true, None));
        let report = check_workloads(&source, "crossnet-operator", &workloads).await;

        let failure = report.failure.unwrap();
        assert_eq!(failure.workload.name, LIGHTHOUSE_AGENT_DEPLOYMENT);
        assert!(matches!(failure.problem, HealthProblem::Unreadable(_)));
        assert_eq!(report.healthy.len(), 2);
    }
}
