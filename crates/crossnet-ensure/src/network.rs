//! Cluster network discovery
//!
//! `join` needs the pod and service CIDRs of the cluster it runs against.
//! Explicit flags take priority; a [`NetworkDiscovery`] fills in whatever
//! was not given and cross-checks what was.

use std::collections::BTreeSet;

use async_trait::async_trait;
use ipnet::IpNet;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

use crossnet_common::Error;

/// Network plugin name reported when the plugin cannot be identified
pub const GENERIC_NETWORK_PLUGIN: &str = "generic";

/// Discovered network layout of a cluster
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterNetwork {
    /// Pod CIDRs, most authoritative first
    pub pod_cidrs: Vec<String>,
    /// Service CIDRs, most authoritative first
    pub service_cidrs: Vec<String>,
    /// Network plugin in use
    pub network_plugin: String,
}

/// Source of a cluster's network layout
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkDiscovery: Send + Sync {
    /// Discover the network layout; `None` when nothing could be learned
    async fn discover(&self) -> Result<Option<ClusterNetwork>, Error>;
}

/// Discovery that returns a fixed answer
#[derive(Clone, Debug, Default)]
pub struct StaticNetwork(pub Option<ClusterNetwork>);

#[async_trait]
impl NetworkDiscovery for StaticNetwork {
    async fn discover(&self) -> Result<Option<ClusterNetwork>, Error> {
        Ok(self.0.clone())
    }
}

/// Discovery from the pod CIDRs allocated to nodes.
///
/// Each node only holds its own slice of the cluster range, so the slices
/// are collapsed into the smallest network covering them, one per address
/// family. A family with fewer than two distinct slices gives no answer.
/// Service CIDRs are not visible through the node API and are left empty.
pub struct NodeNetworkDiscovery {
    client: Client,
}

impl NodeNetworkDiscovery {
    /// Create a discovery wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkDiscovery for NodeNetworkDiscovery {
    #[instrument(skip(self))]
    async fn discover(&self) -> Result<Option<ClusterNetwork>, Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api.list(&ListParams::default()).await?;
        let slices = node_pod_cidrs(&nodes.items);
        let pod_cidrs = covering_pod_cidrs(&slices);
        debug!(
            nodes = nodes.items.len(),
            slices = ?slices,
            pod_cidrs = ?pod_cidrs,
            "Discovered node pod CIDRs"
        );

        if pod_cidrs.is_empty() {
            return Ok(None);
        }
        Ok(Some(ClusterNetwork {
            pod_cidrs,
            service_cidrs: Vec::new(),
            network_plugin: GENERIC_NETWORK_PLUGIN.to_string(),
        }))
    }
}

/// Distinct pod CIDRs assigned to nodes, in first-seen order
fn node_pod_cidrs(nodes: &[Node]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    nodes
        .iter()
        .filter_map(|node| node.spec.as_ref())
        .flat_map(|spec| {
            spec.pod_cidrs
                .clone()
                .unwrap_or_default()
                .into_iter()
                .chain(spec.pod_cidr.clone())
        })
        .filter(|cidr| seen.insert(cidr.clone()))
        .collect()
}

/// Smallest network covering the node slices of each family, IPv4 first
fn covering_pod_cidrs(slices: &[String]) -> Vec<String> {
    let mut nets: Vec<IpNet> = Vec::new();
    for cidr in slices {
        match cidr.parse::<IpNet>() {
            Ok(net) if !nets.contains(&net.trunc()) => nets.push(net.trunc()),
            Ok(_) => {}
            Err(e) => debug!(cidr = %cidr, error = %e, "Ignoring unparsable node pod CIDR"),
        }
    }

    let v4: Vec<IpNet> = nets.iter().copied().filter(|n| matches!(n, IpNet::V4(_))).collect();
    let v6: Vec<IpNet> = nets.iter().copied().filter(|n| matches!(n, IpNet::V6(_))).collect();
    [v4, v6]
        .iter()
        .filter_map(|family| covering_network(family))
        .map(|net| net.to_string())
        .collect()
}

fn covering_network(slices: &[IpNet]) -> Option<IpNet> {
    let (first, rest) = slices.split_first()?;
    if rest.is_empty() {
        return None;
    }
    let mut net = *first;
    while !rest.iter().all(|slice| net.contains(slice)) {
        net = net.supernet()?;
    }
    Some(net)
}
