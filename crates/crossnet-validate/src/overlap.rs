//! Cross-cluster CIDR overlap detection
//!
//! Routing between clusters is ambiguous when two clusters advertise
//! intersecting subnets. [`detect_overlaps`] compares every pair of
//! endpoints in a snapshot and builds a symmetric [`OverlapReport`], then
//! attributes the result relative to the local cluster: a local overlap is
//! reported separately from overlaps that only involve peers, because only
//! the former is something the operator running the check can fix directly.
//!
//! The pairwise comparison is quadratic in the number of clusters. Meshes
//! hold tens of clusters, so the simple form is kept for auditability.

use std::collections::BTreeMap;
use std::fmt;

use ipnet::IpNet;
use thiserror::Error;
use tracing::{debug, warn};

use crossnet_common::ClusterId;

use crate::endpoint::Endpoint;

/// Errors that stop the overlap check
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OverlapError {
    /// More than one live endpoint registered for one cluster
    #[error("stale endpoints are present for cluster {cluster:?}")]
    StaleRegistration {
        /// Cluster with duplicate registrations
        cluster: ClusterId,
    },

    /// A subnet string is not a valid CIDR
    #[error("invalid CIDR {cidr:?} in cluster {cluster:?}: {reason}")]
    InvalidCidr {
        /// Cluster advertising the subnet
        cluster: ClusterId,
        /// The offending subnet string
        cidr: String,
        /// Parser message
        reason: String,
    },
}

impl OverlapError {
    /// Consistency findings are recorded; everything else aborts the run
    pub fn is_finding(&self) -> bool {
        matches!(self, OverlapError::StaleRegistration { .. })
    }
}

/// Symmetric map from each cluster to the other endpoints it overlaps with
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverlapReport {
    entries: BTreeMap<ClusterId, BTreeMap<ClusterId, Endpoint>>,
}

impl OverlapReport {
    /// Record an intersection in both directions
    fn record(&mut self, a: &Endpoint, b: &Endpoint) {
        self.entries
            .entry(a.cluster_id.clone())
            .or_default()
            .entry(b.cluster_id.clone())
            .or_insert_with(|| b.clone());
        self.entries
            .entry(b.cluster_id.clone())
            .or_default()
            .entry(a.cluster_id.clone())
            .or_insert_with(|| a.clone());
    }

    /// No cluster overlaps any other
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of clusters involved in at least one overlap
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether a cluster overlaps with anything
    pub fn contains(&self, cluster: &ClusterId) -> bool {
        self.entries.contains_key(cluster)
    }

    /// Whether `a` was found to overlap `b`
    pub fn overlaps(&self, a: &ClusterId, b: &ClusterId) -> bool {
        self.entries
            .get(a)
            .is_some_and(|peers| peers.contains_key(b))
    }

    /// Endpoints overlapping a given cluster, ordered by cluster ID
    pub fn overlapping_with(&self, cluster: &ClusterId) -> impl Iterator<Item = &Endpoint> {
        self.entries
            .get(cluster)
            .into_iter()
            .flat_map(|peers| peers.values())
    }

    /// Every cluster involved in at least one overlap, ordered by cluster ID
    pub fn clusters(&self) -> impl Iterator<Item = &ClusterId> {
        self.entries.keys()
    }

    /// Every recorded relation appears in both directions
    pub fn is_symmetric(&self) -> bool {
        self.entries.iter().all(|(a, peers)| {
            peers
                .keys()
                .all(|b| self.overlaps(b, a))
        })
    }
}

/// Outcome of the overlap check, attributed relative to the local cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OverlapVerdict {
    /// No overlaps anywhere in the mesh
    Clean,

    /// The local cluster overlaps with at least one peer
    LocalOverlap {
        /// Subnets the local cluster advertises
        local_subnets: Vec<String>,
        /// Every other cluster involved in an overlap
        others: Vec<Endpoint>,
    },

    /// Only peers overlap with each other
    PeerOverlap {
        /// Every cluster involved in an overlap
        clusters: Vec<Endpoint>,
    },
}

/// Full result of one overlap check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlapCheck {
    /// Cluster the check was run from
    pub local_cluster: ClusterId,
    /// Symmetric overlap relation over the snapshot
    pub report: OverlapReport,
    /// Attribution of the report relative to the local cluster
    pub verdict: OverlapVerdict,
}

impl OverlapCheck {
    /// True when no overlap was found
    pub fn passed(&self) -> bool {
        matches!(self.verdict, OverlapVerdict::Clean)
    }

    /// Operator-facing description of the result
    pub fn message(&self) -> String {
        match &self.verdict {
            OverlapVerdict::Clean => "Clusters do not have overlapping CIDRs".to_string(),
            OverlapVerdict::LocalOverlap {
                local_subnets,
                others,
            } => format!(
                "local cluster {:?} with CIDRs {:?} overlaps with clusters: {}",
                self.local_cluster.as_str(),
                local_subnets,
                ClusterDetails(others)
            ),
            OverlapVerdict::PeerOverlap { clusters } => format!(
                "local cluster {:?} does not have overlapping CIDRs with other member clusters. \
                 However, the following member clusters have overlapping CIDRs: {}",
                self.local_cluster.as_str(),
                ClusterDetails(clusters)
            ),
        }
    }
}

impl fmt::Display for OverlapCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Renders endpoints as `clusterID: x, subnets: [..] ; clusterID: y, ...`
struct ClusterDetails<'a>(&'a [Endpoint]);

impl fmt::Display for ClusterDetails<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, endpoint) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ; ")?;
            }
            write!(
                f,
                "clusterID: {}, subnets: {:?}",
                endpoint.cluster_id, endpoint.subnets
            )?;
        }
        Ok(())
    }
}

/// Detect subnet overlaps between the clusters of a snapshot.
///
/// Every pair of endpoints `(i, j)` with `i < j` is compared:
/// - the same cluster ID twice means a stale registration was never cleaned
///   up, which fails the check regardless of the subnets involved;
/// - otherwise each subnet of `j` is tested against all subnets of `i`, and
///   an intersection (including containment either way) is recorded for
///   both clusters.
///
/// A subnet that does not parse as a CIDR fails the check, naming the
/// cluster and the string. All pairs are evaluated before the verdict is
/// built.
pub fn detect_overlaps(
    snapshot: &[Endpoint],
    local_cluster: &ClusterId,
) -> Result<OverlapCheck, OverlapError> {
    // Multiple live endpoints per cluster are not supported, so a duplicate
    // can only be a leftover registration.
    for (i, source) in snapshot.iter().enumerate() {
        if let Some(dest) = snapshot[i + 1..]
            .iter()
            .find(|dest| dest.cluster_id == source.cluster_id)
        {
            warn!(cluster = %dest.cluster_id, "Duplicate endpoint registration");
            return Err(OverlapError::StaleRegistration {
                cluster: dest.cluster_id.clone(),
            });
        }
    }

    let parsed = snapshot
        .iter()
        .map(parse_subnets)
        .collect::<Result<Vec<_>, _>>()?;

    let mut report = OverlapReport::default();
    for (i, source) in snapshot.iter().enumerate() {
        for (j, dest) in snapshot.iter().enumerate().skip(i + 1) {
            let intersects = parsed[j]
                .iter()
                .any(|subnet| parsed[i].iter().any(|other| intersect(subnet, other)));
            if intersects {
                debug!(
                    source = %source.cluster_id,
                    dest = %dest.cluster_id,
                    "Clusters advertise overlapping subnets"
                );
                report.record(source, dest);
            }
        }
    }

    let verdict = attribute(snapshot, &report, local_cluster);
    Ok(OverlapCheck {
        local_cluster: local_cluster.clone(),
        report,
        verdict,
    })
}

fn attribute(
    snapshot: &[Endpoint],
    report: &OverlapReport,
    local_cluster: &ClusterId,
) -> OverlapVerdict {
    if report.is_empty() {
        return OverlapVerdict::Clean;
    }

    let involved = |skip: Option<&ClusterId>| -> Vec<Endpoint> {
        snapshot
            .iter()
            .filter(|e| report.contains(&e.cluster_id) && Some(&e.cluster_id) != skip)
            .cloned()
            .collect()
    };

    if report.contains(local_cluster) {
        let local_subnets = snapshot
            .iter()
            .find(|e| &e.cluster_id == local_cluster)
            .map(|e| e.subnets.clone())
            .unwrap_or_default();
        OverlapVerdict::LocalOverlap {
            local_subnets,
            others: involved(Some(local_cluster)),
        }
    } else {
        OverlapVerdict::PeerOverlap {
            clusters: involved(None),
        }
    }
}

fn parse_subnets(endpoint: &Endpoint) -> Result<Vec<IpNet>, OverlapError> {
    endpoint
        .subnets
        .iter()
        .map(|cidr| {
            cidr.trim()
                .parse::<IpNet>()
                .map(|net| net.trunc())
                .map_err(|e| OverlapError::InvalidCidr {
                    cluster: endpoint.cluster_id.clone(),
                    cidr: cidr.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// Two prefixes intersect iff one contains the other. Networks of different
/// address families never intersect.
fn intersect(a: &IpNet, b: &IpNet) -> bool {
    a.contains(b) || b.contains(a)
}
