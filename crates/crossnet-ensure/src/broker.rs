//! Broker deployment and the broker info file
//!
//! `deploy-broker` ensures the Broker resource on the broker cluster and
//! writes a broker info file. `join` reads that file on each member cluster
//! to learn where the broker is and how to authenticate to it. The file is
//! base64-encoded JSON.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ipnet::IpNet;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crossnet_common::crd::{Broker, BrokerSpec, DEFAULT_BROKER_COMPONENTS};
use crossnet_common::{BackoffPolicy, Error, BROKER_NAME};

use crate::ensure::{ensure, ReconcileOutcome};
use crate::store::ObjectStore;

/// Length of a generated IPsec pre-shared key, in bytes
pub const IPSEC_PSK_LEN: usize = 48;

/// Default file name for broker info
pub const DEFAULT_BROKER_INFO_FILE: &str = "broker-info.crossnet";

/// Credentials a member cluster uses to reach the broker API server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientToken {
    /// Base64-encoded CA bundle of the broker API server
    pub ca: String,
    /// Namespace on the broker cluster where endpoints are exchanged
    pub namespace: String,
    /// Bearer token for the broker API server
    pub token: String,
}

/// Everything a member cluster needs to join the mesh
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerInfo {
    /// Broker API server URL
    pub broker_url: String,
    /// Whether service discovery was enabled at deploy time
    #[serde(default)]
    pub service_discovery: bool,
    /// Base64-encoded IPsec pre-shared key
    pub ipsec_psk: String,
    /// Broker access credentials
    pub client_token: ClientToken,
}

impl BrokerInfo {
    /// Encode as base64 JSON
    pub fn encode(&self) -> Result<String, Error> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64.encode(json))
    }

    /// Decode from base64 JSON and check the embedded key material
    pub fn decode(data: &str) -> Result<Self, Error> {
        let json = BASE64.decode(data.trim()).map_err(|e| {
            Error::serialization_for_kind("BrokerInfo", format!("not base64: {}", e))
        })?;
        let info: BrokerInfo = serde_json::from_slice(&json)?;
        info.validate()?;
        Ok(info)
    }

    /// Check that required fields are present and binary fields decode
    pub fn validate(&self) -> Result<(), Error> {
        if self.broker_url.trim().is_empty() {
            return Err(Error::validation_for_field(
                "broker-info",
                "brokerUrl",
                "broker URL is empty",
            ));
        }
        for (field, value) in [
            ("ipsecPsk", &self.ipsec_psk),
            ("clientToken.ca", &self.client_token.ca),
        ] {
            BASE64.decode(value).map_err(|e| {
                Error::validation_for_field(
                    "broker-info",
                    field,
                    format!("{} is not valid base64: {}", field, e),
                )
            })?;
        }
        Ok(())
    }

    /// Read a broker info file
    pub async fn read_from(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("failed to read broker info {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Read broker info");
        Self::decode(&data)
    }

    /// Write a broker info file, replacing any existing one
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        tokio::fs::write(path, self.encode()?).await.map_err(|e| {
            Error::config(format!(
                "failed to write broker info {}: {}",
                path.display(),
                e
            ))
        })?;
        info!(path = %path.display(), "Wrote broker info");
        Ok(())
    }
}

/// Generate a fresh base64-encoded IPsec pre-shared key
pub fn generate_psk() -> String {
    let mut key = [0u8; IPSEC_PSK_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    BASE64.encode(key)
}

/// Settings for `deploy-broker`
#[derive(Clone, Debug, PartialEq)]
pub struct BrokerConfig {
    /// Namespace on the broker cluster holding the Broker resource
    pub namespace: String,
    /// Deploy service discovery
    pub service_discovery: bool,
    /// Enable globalnet for overlapping cluster CIDRs
    pub globalnet: bool,
    /// Global CIDR range to carve cluster allocations from
    pub globalnet_cidr_range: Option<String>,
    /// Default per-cluster globalnet allocation size
    pub globalnet_cluster_size: Option<u32>,
    /// Extra DNS domains served by service discovery
    pub custom_domains: Vec<String>,
}

impl BrokerConfig {
    /// Build the Broker spec these settings describe
    pub fn broker_spec(&self) -> Result<BrokerSpec, Error> {
        if let Some(range) = &self.globalnet_cidr_range {
            range.parse::<IpNet>().map_err(|e| {
                Error::validation_for_field(
                    BROKER_NAME,
                    "spec.globalnetCIDRRange",
                    format!("invalid globalnet CIDR range {:?}: {}", range, e),
                )
            })?;
            if !self.globalnet {
                return Err(Error::validation_for_field(
                    BROKER_NAME,
                    "spec.globalnetCIDRRange",
                    "a globalnet CIDR range requires globalnet to be enabled",
                ));
            }
        }

        let components = DEFAULT_BROKER_COMPONENTS
            .iter()
            .filter(|c| self.service_discovery || **c != "service-discovery")
            .map(|c| c.to_string())
            .collect();

        Ok(BrokerSpec {
            components,
            globalnet_enabled: self.globalnet,
            globalnet_cidr_range: self.globalnet_cidr_range.clone(),
            default_globalnet_cluster_size: self.globalnet_cluster_size,
            default_custom_domains: self.custom_domains.clone(),
        })
    }
}

/// Broker resource with the well-known name in `namespace`
pub fn broker_resource(spec: BrokerSpec, namespace: &str) -> Broker {
    let mut broker = Broker::new(BROKER_NAME, spec);
    broker.metadata.namespace = Some(namespace.to_string());
    broker
}

/// Ensure the Broker resource described by `config`
#[instrument(skip_all, fields(namespace = %config.namespace))]
pub async fn deploy_broker<S>(
    store: &S,
    config: &BrokerConfig,
    policy: &BackoffPolicy,
) -> Result<ReconcileOutcome, Error>
where
    S: ObjectStore<Broker> + ?Sized,
{
    policy.validate()?;
    let broker = broker_resource(config.broker_spec()?, &config.namespace);
    Ok(ensure(store, &broker, policy).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn info() -> BrokerInfo {
        BrokerInfo {
            broker_url: "https://broker.example.com:6443".to_string(),
            service_discovery: true,
            ipsec_psk: generate_psk(),
            client_token: ClientToken {
                ca: BASE64.encode("-----BEGIN CERTIFICATE-----"),
                namespace: "crossnet-k8s-broker".to_string(),
                token: "sa-token".to_string(),
            },
        }
    }

    fn config() -> BrokerConfig {
        BrokerConfig {
            namespace: "crossnet-k8s-broker".to_string(),
            service_discovery: false,
            globalnet: false,
            globalnet_cidr_range: None,
            globalnet_cluster_size: None,
            custom_domains: vec![],
        }
    }

    #[test]
    fn generated_psk_has_expected_length() {
        let psk = BASE64.decode(generate_psk()).unwrap();
        assert_eq!(psk.len(), IPSEC_PSK_LEN);
        assert_ne!(generate_psk(), generate_psk());
    }

    #[test]
    fn encoded_file_is_base64_json() {
        let original = info();
        let encoded = original.encode().unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&BASE64.decode(&encoded).unwrap()).unwrap();
        assert_eq!(json["brokerUrl"], "https://broker.example.com:6443");
        assert_eq!(json["clientToken"]["namespace"], "crossnet-k8s-broker");
        assert_eq!(json["ipsecPsk"], original.ipsec_psk.as_str());
        assert_eq!(BrokerInfo::decode(&encoded).unwrap(), original);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(BrokerInfo::decode("%%% not base64 %%%").is_err());
        assert!(BrokerInfo::decode(&BASE64.encode("{}")).is_err());
    }

    #[test]
    fn decode_rejects_bad_key_material() {
        let mut bad = info();
        bad.ipsec_psk = "not base64!".to_string();
        let err = BrokerInfo::decode(&bad.encode().unwrap()).unwrap_err();
        assert!(err.to_string().contains("ipsecPsk"), "{err}");
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_BROKER_INFO_FILE);
        let original = info();
        original.write_to(&path).await.unwrap();
        assert_eq!(BrokerInfo::read_from(&path).await.unwrap(), original);
    }

    #[tokio::test]
    async fn missing_file_names_path() {
        let err = BrokerInfo::read_from("/nonexistent/broker-info").await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/broker-info"));
    }

    #[test]
    fn components_follow_service_discovery() {
        let spec = config().broker_spec().unwrap();
        assert_eq!(spec.components, vec!["connectivity"]);
        assert!(!spec.service_discovery_enabled());

        let spec = BrokerConfig {
            service_discovery: true,
            ..config()
        }
        .broker_spec()
        .unwrap();
        assert!(spec.service_discovery_enabled());
    }

    #[test]
    fn globalnet_range_is_validated() {
        let bad = BrokerConfig {
            globalnet: true,
            globalnet_cidr_range: Some("242.0.0.0/33".to_string()),
            ..config()
        };
        assert!(bad.broker_spec().is_err());

        let disabled = BrokerConfig {
            globalnet_cidr_range: Some("242.0.0.0/8".to_string()),
            ..config()
        };
        assert!(disabled.broker_spec().is_err());
    }

    #[tokio::test]
    async fn deploy_broker_creates_then_replaces() {
        let store = MemoryStore::new();
        let policy = BackoffPolicy::immediate(3);

        let first = deploy_broker(&store, &config(), &policy).await.unwrap();
        let updated = BrokerConfig {
            globalnet: true,
            globalnet_cidr_range: Some("242.0.0.0/8".to_string()),
            ..config()
        };
        let second = deploy_broker(&store, &updated, &policy).await.unwrap();

        assert_eq!(first, ReconcileOutcome::Created);
        assert_eq!(second, ReconcileOutcome::ReplacedAfterConflict);
        let stored = store.object(BROKER_NAME).unwrap();
        assert!(stored.spec.globalnet_enabled);
        assert_eq!(stored.metadata.namespace.as_deref(), Some("crossnet-k8s-broker"));
    }

    #[tokio::test]
    async fn invalid_policy_is_rejected() {
        let store = MemoryStore::new();
        let result = deploy_broker(&store, &config(), &BackoffPolicy::immediate(0)).await;
        assert!(result.is_err());
        assert!(store.is_empty());
    }
}
