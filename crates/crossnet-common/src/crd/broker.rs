//! Broker CRD
//!
//! The broker is the rendezvous point member clusters register against. It is
//! created once per broker cluster and wholly owned by crossnet, so it is
//! replaced rather than patched when its spec changes.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Components deployed when the caller does not pick any
pub const DEFAULT_BROKER_COMPONENTS: &[&str] = &["service-discovery", "connectivity"];

/// Broker defines the shared control-plane rendezvous point.
///
/// Example:
/// ```yaml
/// apiVersion: crossnet.io/v1alpha1
/// kind: Broker
/// metadata:
///   name: crossnet-broker
///   namespace: crossnet-operator
/// spec:
///   components: [service-discovery, connectivity]
///   globalnetEnabled: true
///   globalnetCidrRange: 242.0.0.0/8
///   defaultGlobalnetClusterSize: 65536
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "crossnet.io",
    version = "v1alpha1",
    kind = "Broker",
    namespaced,
    printcolumn = r#"{"name":"Globalnet","type":"boolean","jsonPath":".spec.globalnetEnabled"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BrokerSpec {
    /// Components to deploy alongside the broker
    #[serde(default)]
    pub components: Vec<String>,

    /// Whether overlapping clusters are connected through a global CIDR
    #[serde(default)]
    pub globalnet_enabled: bool,

    /// Global CIDR range carved up between member clusters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globalnet_cidr_range: Option<String>,

    /// Default number of global IPs allocated to each cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_globalnet_cluster_size: Option<u32>,

    /// Custom DNS domains served by service discovery
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_custom_domains: Vec<String>,
}

impl BrokerSpec {
    /// Whether the service discovery component is requested
    pub fn service_discovery_enabled(&self) -> bool {
        self.components.iter().any(|c| c == "service-discovery")
    }
}
