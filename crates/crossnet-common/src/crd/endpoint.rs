//! MeshEndpoint CRD: a cluster's advertised address space
//!
//! Each member cluster's gateway registers one MeshEndpoint with the broker.
//! The subnets it lists are the pod and service ranges other clusters route
//! to, which is why they must not overlap between clusters.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ClusterId, Error};

/// Spec for a MeshEndpoint
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "crossnet.io",
    version = "v1",
    kind = "MeshEndpoint",
    plural = "meshendpoints",
    namespaced,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterId"}"#,
    printcolumn = r#"{"name":"Hostname","type":"string","jsonPath":".spec.hostname"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MeshEndpointSpec {
    /// ID of the cluster this endpoint belongs to
    pub cluster_id: String,

    /// Name of the tunnel cable terminated by this endpoint
    #[serde(default)]
    pub cable_name: String,

    /// Gateway node hostname
    #[serde(default)]
    pub hostname: String,

    /// Advertised subnets in CIDR notation
    #[serde(default)]
    pub subnets: Vec<String>,

    /// Gateway private IP
    #[serde(rename = "privateIP", default)]
    pub private_ip: String,

    /// Gateway public IP
    #[serde(rename = "publicIP", default)]
    pub public_ip: String,

    /// Whether the gateway sits behind NAT
    #[serde(default)]
    pub nat_enabled: bool,

    /// Cable driver backend (e.g. "libreswan", "wireguard")
    #[serde(default)]
    pub backend: String,
}

impl MeshEndpointSpec {
    /// Validated cluster ID of this endpoint
    pub fn parsed_cluster_id(&self) -> Result<ClusterId, Error> {
        ClusterId::new(self.cluster_id.as_str())
    }
}
