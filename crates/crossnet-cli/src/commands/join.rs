//! Join command

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crossnet_common::crd::MeshConnector;
use crossnet_common::{FIELD_MANAGER, OPERATOR_NAMESPACE};
use crossnet_ensure::join::{DEFAULT_COLOR_CODES, DEFAULT_IKE_PORT, DEFAULT_NATT_PORT};
use crossnet_ensure::{join_cluster, BrokerInfo, JoinConfig, KubeObjectStore, NodeNetworkDiscovery};

use crate::config::{ClusterArgs, RetryArgs};
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct JoinArgs {
    /// Broker info file generated by `crossnet deploy-broker`
    pub broker_info: PathBuf,

    #[command(flatten)]
    pub cluster: ClusterArgs,

    #[command(flatten)]
    pub retry: RetryArgs,

    /// Cluster ID used to identify the tunnels
    #[arg(long = "clusterid")]
    pub cluster_id: String,

    /// Service CIDR (discovered when omitted)
    #[arg(long = "servicecidr")]
    pub service_cidr: Option<String>,

    /// Pod CIDR (discovered when omitted)
    #[arg(long = "clustercidr")]
    pub cluster_cidr: Option<String>,

    /// Image repository
    #[arg(long)]
    pub repository: Option<String>,

    /// Image version
    #[arg(long)]
    pub version: Option<String>,

    /// IPsec NAT traversal port
    #[arg(long = "nattport", default_value_t = DEFAULT_NATT_PORT)]
    pub natt_port: u16,

    /// IPsec IKE port
    #[arg(long = "ikeport", default_value_t = DEFAULT_IKE_PORT)]
    pub ike_port: u16,

    /// Gateway color codes
    #[arg(long = "colorcodes", default_value = DEFAULT_COLOR_CODES)]
    pub color_codes: String,

    /// Disable NAT for IPsec
    #[arg(long)]
    pub disable_nat: bool,

    /// Enable IPsec debugging (verbose logging)
    #[arg(long)]
    pub ipsec_debug: bool,

    /// Enable component debugging (verbose logging)
    #[arg(long = "mesh-debug")]
    pub debug: bool,

    /// Namespace the connector is created in
    #[arg(long, default_value = OPERATOR_NAMESPACE)]
    pub operator_namespace: String,
}

impl JoinArgs {
    fn join_config(&self) -> JoinConfig {
        JoinConfig {
            cluster_id: self.cluster_id.clone(),
            service_cidr: self.service_cidr.clone(),
            cluster_cidr: self.cluster_cidr.clone(),
            repository: self.repository.clone(),
            version: self.version.clone(),
            natt_port: self.natt_port,
            ike_port: self.ike_port,
            color_codes: self.color_codes.clone(),
            disable_nat: self.disable_nat,
            ipsec_debug: self.ipsec_debug,
            debug: self.debug,
            operator_namespace: self.operator_namespace.clone(),
        }
    }
}

pub async fn run(args: JoinArgs) -> Result<()> {
    if !args.broker_info.exists() {
        return Err(Error::BrokerInfoNotFound {
            path: args.broker_info.clone(),
        });
    }
    let info = BrokerInfo::read_from(&args.broker_info).await?;
    println!(
        "* {} says broker is at: {}",
        args.broker_info.display(),
        info.broker_url
    );

    let policy = args.retry.policy()?;
    let target = args.cluster.connect_one().await?;
    info!(context = %target.name, "Joining cluster to mesh");

    let store: KubeObjectStore<MeshConnector> =
        KubeObjectStore::namespaced(target.client.clone(), &args.operator_namespace)
            .with_field_manager(FIELD_MANAGER);
    let discovery = NodeNetworkDiscovery::new(target.client);

    let outcome = join_cluster(&store, &discovery, &info, &args.join_config(), &policy)
        .await?
        .into_result()
        .map_err(|reason| Error::reconcile("connector", reason))?;

    println!("* Connector {} in cluster {}", outcome, target.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: JoinArgs,
    }

    #[test]
    fn flags_map_onto_join_config() {
        let harness = Harness::try_parse_from([
            "join",
            "broker-info.crossnet",
            "--clusterid",
            "east",
            "--servicecidr",
            "10.96.0.0/12",
            "--disable-nat",
            "--nattport",
            "4501",
        ])
        .unwrap();

        let config = harness.args.join_config();
        assert_eq!(config.cluster_id, "east");
        assert_eq!(config.service_cidr.as_deref(), Some("10.96.0.0/12"));
        assert_eq!(config.cluster_cidr, None);
        assert!(config.disable_nat);
        assert_eq!(config.natt_port, 4501);
        assert_eq!(config.ike_port, DEFAULT_IKE_PORT);
        assert_eq!(config.color_codes, DEFAULT_COLOR_CODES);
        assert_eq!(config.operator_namespace, OPERATOR_NAMESPACE);
    }

    #[tokio::test]
    async fn missing_broker_info_is_reported_before_connecting() {
        let harness = Harness::try_parse_from([
            "join",
            "/nonexistent/broker-info.crossnet",
            "--clusterid",
            "east",
        ])
        .unwrap();

        let err = run(harness.args).await.unwrap_err();
        assert!(matches!(err, Error::BrokerInfoNotFound { .. }));
    }
}
