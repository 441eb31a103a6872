//! MeshConnector CRD: per-cluster mesh descriptor
//!
//! Written by `crossnet join` into each member cluster. The operator in that
//! cluster reads it to deploy the gateway, route agent, and optional service
//! discovery and globalnet components. Its status reports the cluster ID the
//! operator registered with the broker.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Spec for a MeshConnector
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "crossnet.io",
    version = "v1alpha1",
    kind = "MeshConnector",
    plural = "meshconnectors",
    shortname = "mc",
    namespaced,
    status = "MeshConnectorStatus",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterId"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MeshConnectorSpec {
    /// Broker type (currently always "k8s")
    pub broker: String,
    /// Broker API server host, without scheme
    pub broker_k8s_api_server: String,
    /// Token for the broker API server
    pub broker_k8s_api_server_token: String,
    /// Base64-encoded CA bundle for the broker API server
    pub broker_k8s_ca: String,
    /// Namespace on the broker cluster where endpoints are exchanged
    pub broker_k8s_remote_namespace: String,

    /// Base64-encoded IPsec pre-shared key
    #[serde(rename = "ceIPSecPSK")]
    pub ce_ipsec_psk: String,
    /// IPsec NAT traversal port
    #[serde(rename = "ceIPSecNATTPort")]
    pub ce_ipsec_natt_port: u16,
    /// IPsec IKE port
    #[serde(rename = "ceIPSecIKEPort")]
    pub ce_ipsec_ike_port: u16,
    /// Verbose IPsec logging
    #[serde(rename = "ceIPSecDebug", default)]
    pub ce_ipsec_debug: bool,

    /// Whether gateways expect NAT between clusters
    #[serde(default)]
    pub nat_enabled: bool,
    /// Verbose component logging
    #[serde(default)]
    pub debug: bool,
    /// Color codes used to group gateways
    #[serde(default)]
    pub color_codes: String,

    /// This cluster's ID
    pub cluster_id: String,
    /// Service CIDR of this cluster
    #[serde(rename = "serviceCIDR")]
    pub service_cidr: String,
    /// Pod CIDR of this cluster
    #[serde(rename = "clusterCIDR")]
    pub cluster_cidr: String,
    /// Global CIDR allocated to this cluster when globalnet is enabled
    #[serde(rename = "globalCIDR", default, skip_serializing_if = "Option::is_none")]
    pub global_cidr: Option<String>,

    /// Whether service discovery components are deployed
    #[serde(default)]
    pub service_discovery_enabled: bool,

    /// Namespace the components are deployed in
    pub namespace: String,
    /// Image repository
    pub repository: String,
    /// Image version
    pub version: String,
}

/// Status reported by the operator for a MeshConnector
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshConnectorStatus {
    /// Cluster ID the operator registered with the broker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,

    /// Network plugin detected by the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_plugin: Option<String>,

    /// Global CIDR in use, if globalnet is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_cidr: Option<String>,
}

impl MeshConnector {
    /// Cluster ID to validate against: the status value reported by the
    /// operator, falling back to the spec value.
    pub fn local_cluster_id(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.cluster_id.as_deref())
            .unwrap_or(&self.spec.cluster_id)
    }

    /// Whether a globalnet DaemonSet is expected in this cluster
    pub fn globalnet_enabled(&self) -> bool {
        self.spec
            .global_cidr
            .as_deref()
            .is_some_and(|cidr| !cidr.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MeshConnector {
        MeshConnector::new(
            "crossnet",
            MeshConnectorSpec {
                broker: "k8s".to_string(),
                cluster_id: "east".to_string(),
                service_cidr: "100.64.0.0/16".to_string(),
                cluster_cidr: "10.244.0.0/16".to_string(),
                ce_ipsec_natt_port: 4500,
                ce_ipsec_ike_port: 500,
                ..Default::default()
            },
        )
    }

    #[test]
    fn wire_names_match_operator_expectations() {
        let value = serde_json::to_value(&sample().spec).unwrap();
        assert_eq!(value["ceIPSecNATTPort"], 4500);
        assert_eq!(value["ceIPSecIKEPort"], 500);
        assert_eq!(value["serviceCIDR"], "100.64.0.0/16");
        assert_eq!(value["clusterCIDR"], "10.244.0.0/16");
        assert_eq!(value["clusterId"], "east");
        assert!(value.get("globalCIDR").is_none());
    }

    #[test]
    fn local_cluster_id_prefers_status() {
        let mut connector = sample();
        assert_eq!(connector.local_cluster_id(), "east");

        connector.status = Some(MeshConnectorStatus {
            cluster_id: Some("east-registered".to_string()),
            ..Default::default()
        });
        assert_eq!(connector.local_cluster_id(), "east-registered");
    }

    #[test]
    fn globalnet_requires_non_empty_cidr() {
        let mut connector = sample();
        assert!(!connector.globalnet_enabled());

        connector.spec.global_cidr = Some(String::new());
        assert!(!connector.globalnet_enabled());

        connector.spec.global_cidr = Some("242.0.0.0/16".to_string());
        assert!(connector.globalnet_enabled());
    }
}
