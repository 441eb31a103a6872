//! Joining a cluster to the mesh
//!
//! Builds the cluster's MeshConnector from the broker info file, the join
//! settings and the discovered network, then ensures it in the operator
//! namespace.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ipnet::IpNet;
use tracing::{info, instrument, warn};

use crossnet_common::crd::{MeshConnector, MeshConnectorSpec};
use crossnet_common::{BackoffPolicy, ClusterId, Error, CONNECTOR_NAME, OPERATOR_NAMESPACE};

use crate::broker::BrokerInfo;
use crate::ensure::{ensure, ReconcileOutcome};
use crate::network::{ClusterNetwork, NetworkDiscovery};
use crate::store::ObjectStore;

/// Image repository used when none is given
pub const DEFAULT_REPOSITORY: &str = "quay.io/crossnet";
/// Component version used when none is given
pub const DEFAULT_VERSION: &str = "0.0.3";
/// Default IPsec NAT traversal port
pub const DEFAULT_NATT_PORT: u16 = 4500;
/// Default IPsec IKE port
pub const DEFAULT_IKE_PORT: u16 = 500;
/// Default gateway color code
pub const DEFAULT_COLOR_CODES: &str = "blue";
/// Broker type written into every connector
pub const BROKER_TYPE: &str = "k8s";

/// Settings for one `join` invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinConfig {
    /// Cluster ID used to identify this cluster's tunnels
    pub cluster_id: String,
    /// Service CIDR, overriding discovery
    pub service_cidr: Option<String>,
    /// Pod CIDR, overriding discovery
    pub cluster_cidr: Option<String>,
    /// Image repository
    pub repository: Option<String>,
    /// Component version
    pub version: Option<String>,
    /// IPsec NAT traversal port
    pub natt_port: u16,
    /// IPsec IKE port
    pub ike_port: u16,
    /// Gateway color codes
    pub color_codes: String,
    /// Disable NAT for IPsec
    pub disable_nat: bool,
    /// Verbose IPsec logging
    pub ipsec_debug: bool,
    /// Verbose component logging
    pub debug: bool,
    /// Namespace the connector is created in
    pub operator_namespace: String,
}

impl JoinConfig {
    /// Settings with every default filled in
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            service_cidr: None,
            cluster_cidr: None,
            repository: None,
            version: None,
            natt_port: DEFAULT_NATT_PORT,
            ike_port: DEFAULT_IKE_PORT,
            color_codes: DEFAULT_COLOR_CODES.to_string(),
            disable_nat: false,
            ipsec_debug: false,
            debug: false,
            operator_namespace: OPERATOR_NAMESPACE.to_string(),
        }
    }
}

/// Which CIDR is being resolved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CidrKind {
    /// Pod network
    Pod,
    /// ClusterIP service network
    Service,
}

impl CidrKind {
    fn flag(self) -> &'static str {
        match self {
            CidrKind::Pod => "--clustercidr",
            CidrKind::Service => "--servicecidr",
        }
    }

    fn field(self) -> &'static str {
        match self {
            CidrKind::Pod => "spec.clusterCIDR",
            CidrKind::Service => "spec.serviceCIDR",
        }
    }
}

impl fmt::Display for CidrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CidrKind::Pod => f.write_str("pod"),
            CidrKind::Service => f.write_str("service"),
        }
    }
}

/// Pick the CIDR to use: the explicit value if given, else the first
/// discovered one.
///
/// An explicit value that does not cover the discovered one is kept with a
/// warning.
pub fn resolve_cidr(
    kind: CidrKind,
    explicit: Option<&str>,
    discovered: &[String],
) -> Result<String, Error> {
    let explicit = explicit.map(str::trim).filter(|s| !s.is_empty());
    let cidr = match (explicit, discovered.first()) {
        (Some(given), Some(found)) if !covers(given, found) => {
            warn!(
                kind = %kind,
                provided = given,
                discovered = %found,
                "Provided CIDR does not match discovered"
            );
            given.to_string()
        }
        (Some(given), _) => given.to_string(),
        (None, Some(found)) => found.clone(),
        (None, None) => {
            return Err(Error::config(format!(
                "the {} CIDR could not be discovered; pass it with {}",
                kind,
                kind.flag()
            )))
        }
    };

    cidr.parse::<IpNet>().map_err(|e| {
        Error::validation_for_field(
            CONNECTOR_NAME,
            kind.field(),
            format!("invalid {} CIDR {:?}: {}", kind, cidr, e),
        )
    })?;
    Ok(cidr)
}

/// True when `given` contains `found`; unparsable values only match exactly
fn covers(given: &str, found: &str) -> bool {
    match (given.parse::<IpNet>(), found.parse::<IpNet>()) {
        (Ok(given), Ok(found)) => given.trunc().contains(&found),
        _ => given == found,
    }
}

/// Broker API server address without its URL scheme
pub fn strip_scheme(url: &str) -> &str {
    match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    }
}

/// Connector spec for a cluster with already-resolved CIDRs
pub fn connector_spec(
    info: &BrokerInfo,
    config: &JoinConfig,
    cluster_id: &ClusterId,
    service_cidr: String,
    cluster_cidr: String,
) -> MeshConnectorSpec {
    let non_empty = |value: &Option<String>, default: &str| {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    MeshConnectorSpec {
        broker: BROKER_TYPE.to_string(),
        broker_k8s_api_server: strip_scheme(&info.broker_url).to_string(),
        broker_k8s_api_server_token: info.client_token.token.clone(),
        broker_k8s_ca: info.client_token.ca.clone(),
        broker_k8s_remote_namespace: info.client_token.namespace.clone(),
        ce_ipsec_psk: info.ipsec_psk.clone(),
        ce_ipsec_natt_port: config.natt_port,
        ce_ipsec_ike_port: config.ike_port,
        ce_ipsec_debug: config.ipsec_debug,
        nat_enabled: !config.disable_nat,
        debug: config.debug,
        color_codes: config.color_codes.clone(),
        cluster_id: cluster_id.to_string(),
        service_cidr,
        cluster_cidr,
        global_cidr: None,
        service_discovery_enabled: info.service_discovery,
        namespace: config.operator_namespace.clone(),
        repository: non_empty(&config.repository, DEFAULT_REPOSITORY),
        version: non_empty(&config.version, DEFAULT_VERSION),
    }
}

/// Resolve CIDRs and build the full MeshConnector for this cluster
pub fn build_connector(
    info: &BrokerInfo,
    config: &JoinConfig,
    network: Option<&ClusterNetwork>,
) -> Result<MeshConnector, Error> {
    let cluster_id = ClusterId::new(config.cluster_id.as_str())?;
    if config.color_codes.trim().is_empty() {
        return Err(Error::validation_for_field(
            cluster_id.as_str(),
            "spec.colorCodes",
            "color codes must not be empty",
        ));
    }

    let (pods, services) = match network {
        Some(n) => (n.pod_cidrs.as_slice(), n.service_cidrs.as_slice()),
        None => (&[][..], &[][..]),
    };
    let service_cidr = resolve_cidr(CidrKind::Service, config.service_cidr.as_deref(), services)?;
    let cluster_cidr = resolve_cidr(CidrKind::Pod, config.cluster_cidr.as_deref(), pods)?;

    let spec = connector_spec(info, config, &cluster_id, service_cidr, cluster_cidr);
    let mut connector = MeshConnector::new(CONNECTOR_NAME, spec);
    connector.metadata.namespace = Some(config.operator_namespace.clone());
    Ok(connector)
}

/// Join this cluster to the mesh described by `info`.
///
/// Discovery failures are not fatal: explicit CIDRs may still suffice.
#[instrument(skip_all, fields(cluster_id = %config.cluster_id))]
pub async fn join_cluster<S, D>(
    store: &S,
    discovery: &D,
    info: &BrokerInfo,
    config: &JoinConfig,
    policy: &BackoffPolicy,
) -> Result<ReconcileOutcome, Error>
where
    S: ObjectStore<MeshConnector> + ?Sized,
    D: NetworkDiscovery + ?Sized,
{
    policy.validate()?;
    info.validate()?;
    // Validate the ID before touching the cluster
    ClusterId::new(config.cluster_id.as_str())?;

    let network = match discovery.discover().await {
        Ok(network) => network,
        Err(e) => {
            warn!(error = %e, "Error trying to discover network details");
            None
        }
    };
    if let Some(n) = &network {
        info!(
            plugin = %n.network_plugin,
            pod_cidrs = ?n.pod_cidrs,
            service_cidrs = ?n.service_cidrs,
            "Discovered network details"
        );
    }

    let connector = build_connector(info, config, network.as_ref())?;
    info!(broker = %connector.spec.broker_k8s_api_server, "Deploying connector");
    Ok(ensure(store, &connector, policy).await)
}

/// Decoded IPsec pre-shared key bytes from a connector spec
pub fn decode_psk(spec: &MeshConnectorSpec) -> Result<Vec<u8>, Error> {
    BASE64.decode(&spec.ce_ipsec_psk).map_err(|e| {
        Error::validation_for_field(
            spec.cluster_id.as_str(),
            "spec.ceIPSecPSK",
            format!("IPsec PSK is not valid base64: {}", e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{generate_psk, ClientToken};
    use crate::memory::MemoryStore;
    use crate::network::{MockNetworkDiscovery, StaticNetwork};

    fn info() -> BrokerInfo {
        BrokerInfo {
            broker_url: "https://broker.example.com:6443".to_string(),
            service_discovery: true,
            ipsec_psk: generate_psk(),
            client_token: ClientToken {
                ca: BASE64.encode("ca-bundle"),
                namespace: "crossnet-k8s-broker".to_string(),
                token: "sa-token".to_string(),
            },
        }
    }

    fn network() -> ClusterNetwork {
        ClusterNetwork {
            pod_cidrs: vec!["10.244.0.0/16".to_string()],
            service_cidrs: vec!["10.96.0.0/12".to_string()],
            network_plugin: "calico".to_string(),
        }
    }

    #[test]
    fn scheme_is_stripped() {
        assert_eq!(strip_scheme("https://api.example.com:6443"), "api.example.com:6443");
        assert_eq!(strip_scheme("api.example.com:6443"), "api.example.com:6443");
    }

    #[test]
    fn explicit_cidr_wins_over_discovery() {
        let discovered = vec!["10.96.0.0/12".to_string()];
        let cidr = resolve_cidr(CidrKind::Service, Some("100.64.0.0/16"), &discovered).unwrap();
        assert_eq!(cidr, "100.64.0.0/16");
    }

    #[test]
    fn explicit_range_covering_node_slices_agrees_with_discovery() {
        assert!(covers("10.244.0.0/16", "10.244.0.0/22"));
        assert!(covers("10.244.0.0/16", "10.244.0.0/16"));
        assert!(!covers("10.244.0.0/22", "10.244.0.0/16"));
        assert!(!covers("100.64.0.0/16", "10.96.0.0/12"));

        let discovered = vec!["10.244.0.0/22".to_string()];
        let cidr = resolve_cidr(CidrKind::Pod, Some("10.244.0.0/16"), &discovered).unwrap();
        assert_eq!(cidr, "10.244.0.0/16");
    }

    #[test]
    fn discovered_cidr_fills_gap() {
        let discovered = vec!["10.244.0.0/16".to_string(), "10.245.0.0/16".to_string()];
        let cidr = resolve_cidr(CidrKind::Pod, Some("  "), &discovered).unwrap();
        assert_eq!(cidr, "10.244.0.0/16");
    }

    #[test]
    fn missing_cidr_names_the_flag() {
        let err = resolve_cidr(CidrKind::Pod, None, &[]).unwrap_err();
        assert!(err.to_string().contains("--clustercidr"), "{err}");
    }

    #[test]
    fn malformed_cidr_is_rejected() {
        let err = resolve_cidr(CidrKind::Service, Some("10.96.0.0"), &[]).unwrap_err();
        assert!(err.to_string().contains("10.96.0.0"), "{err}");
    }

    #[test]
    fn spec_applies_defaults_and_broker_details() {
        let info = info();
        let connector = build_connector(&info, &JoinConfig::new("east"), Some(&network())).unwrap();
        let spec = &connector.spec;

        assert_eq!(spec.broker, "k8s");
        assert_eq!(spec.broker_k8s_api_server, "broker.example.com:6443");
        assert_eq!(spec.broker_k8s_api_server_token, "sa-token");
        assert_eq!(spec.broker_k8s_remote_namespace, "crossnet-k8s-broker");
        assert_eq!(BASE64.decode(&spec.broker_k8s_ca).unwrap(), b"ca-bundle");
        assert_eq!(decode_psk(spec).unwrap().len(), crate::broker::IPSEC_PSK_LEN);
        assert_eq!(spec.repository, DEFAULT_REPOSITORY);
        assert_eq!(spec.version, DEFAULT_VERSION);
        assert_eq!(spec.ce_ipsec_natt_port, 4500);
        assert_eq!(spec.ce_ipsec_ike_port, 500);
        assert!(spec.nat_enabled);
        assert!(spec.service_discovery_enabled);
        assert_eq!(spec.service_cidr, "10.96.0.0/12");
        assert_eq!(spec.cluster_cidr, "10.244.0.0/16");
        assert_eq!(spec.namespace, OPERATOR_NAMESPACE);
        assert_eq!(connector.metadata.namespace.as_deref(), Some(OPERATOR_NAMESPACE));
    }

    #[test]
    fn flags_override_defaults() {
        let config = JoinConfig {
            repository: Some("registry.local/crossnet".to_string()),
            version: Some("1.2.0".to_string()),
            disable_nat: true,
            ipsec_debug: true,
            natt_port: 4501,
            ..JoinConfig::new("east")
        };
        let spec = build_connector(&info(), &config, Some(&network())).unwrap().spec;
        assert_eq!(spec.repository, "registry.local/crossnet");
        assert_eq!(spec.version, "1.2.0");
        assert!(!spec.nat_enabled);
        assert!(spec.ce_ipsec_debug);
        assert_eq!(spec.ce_ipsec_natt_port, 4501);
    }

    #[test]
    fn invalid_cluster_id_is_rejected() {
        let err = build_connector(&info(), &JoinConfig::new("East_1"), Some(&network())).unwrap_err();
        assert!(err.to_string().contains("East_1"), "{err}");
    }

    #[tokio::test]
    async fn join_ensures_connector() {
        let store = MemoryStore::new();
        let discovery = StaticNetwork(Some(network()));
        let policy = BackoffPolicy::immediate(3);

        let outcome = join_cluster(&store, &discovery, &info(), &JoinConfig::new("east"), &policy)
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Created);

        let again = join_cluster(&store, &discovery, &info(), &JoinConfig::new("east"), &policy)
            .await
            .unwrap();
        assert_eq!(again, ReconcileOutcome::ReplacedAfterConflict);
        assert_eq!(store.object(CONNECTOR_NAME).unwrap().spec.cluster_id, "east");
    }

    #[tokio::test]
    async fn discovery_failure_falls_back_to_flags() {
        let mut discovery = MockNetworkDiscovery::new();
        discovery
            .expect_discover()
            .times(1)
            .returning(|| Err(Error::validation("nodes forbidden")));

        let config = JoinConfig {
            service_cidr: Some("10.96.0.0/12".to_string()),
            cluster_cidr: Some("10.244.0.0/16".to_string()),
            ..JoinConfig::new("east")
        };
        let store = MemoryStore::new();
        let outcome = join_cluster(&store, &discovery, &info(), &config, &BackoffPolicy::immediate(1))
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn invalid_cluster_id_skips_discovery() {
        let mut discovery = MockNetworkDiscovery::new();
        discovery.expect_discover().never();

        let store = MemoryStore::new();
        let result = join_cluster(
            &store,
            &discovery,
            &info(),
            &JoinConfig::new("-east"),
            &BackoffPolicy::immediate(1),
        )
        .await;
        assert!(result.is_err());
        assert!(store.is_empty());
    }
}
