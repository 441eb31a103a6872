//! Deploy-broker command

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crossnet_common::crd::Broker;
use crossnet_common::FIELD_MANAGER;
use crossnet_ensure::broker::{generate_psk, DEFAULT_BROKER_INFO_FILE};
use crossnet_ensure::{deploy_broker, BrokerConfig, BrokerInfo, ClientToken, KubeObjectStore};

use crate::config::{api_server_of, ClusterArgs, RetryArgs};
use crate::{Error, Result};

/// Namespace on the broker cluster where endpoints are exchanged
pub const DEFAULT_BROKER_NAMESPACE: &str = "crossnet-k8s-broker";

#[derive(Args, Debug)]
pub struct DeployBrokerArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    #[command(flatten)]
    pub retry: RetryArgs,

    /// Namespace for the Broker resource and endpoint exchange
    #[arg(long, default_value = DEFAULT_BROKER_NAMESPACE)]
    pub broker_namespace: String,

    /// Token member clusters use to reach the broker API server
    #[arg(long, env = "CROSSNET_BROKER_TOKEN", hide_env_values = true)]
    pub broker_token: String,

    /// Broker API server URL (defaults to the context's server)
    #[arg(long)]
    pub broker_url: Option<String>,

    /// Enable multi-cluster service discovery
    #[arg(long)]
    pub service_discovery: bool,

    /// Enable globalnet for clusters with overlapping CIDRs
    #[arg(long)]
    pub globalnet: bool,

    /// Global CIDR range to allocate cluster ranges from
    #[arg(long)]
    pub globalnet_cidr_range: Option<String>,

    /// Default size of each cluster's global CIDR allocation
    #[arg(long)]
    pub globalnet_cluster_size: Option<u32>,

    /// Extra DNS domain served by service discovery (repeatable)
    #[arg(long = "custom-domain")]
    pub custom_domains: Vec<String>,

    /// Where to write the broker info file
    #[arg(long, short, default_value = DEFAULT_BROKER_INFO_FILE)]
    pub output: PathBuf,
}

impl DeployBrokerArgs {
    fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            namespace: self.broker_namespace.clone(),
            service_discovery: self.service_discovery,
            globalnet: self.globalnet,
            globalnet_cidr_range: self.globalnet_cidr_range.clone(),
            globalnet_cluster_size: self.globalnet_cluster_size,
            custom_domains: self.custom_domains.clone(),
        }
    }
}

pub async fn run(args: DeployBrokerArgs) -> Result<()> {
    if args.broker_token.trim().is_empty() {
        return Err(Error::validation("--broker-token must not be empty"));
    }
    let config = args.broker_config();
    // Reject bad flags before touching the cluster
    config.broker_spec()?;
    let policy = args.retry.policy()?;

    let kubeconfig = args.cluster.kubeconfig()?;
    let target = args.cluster.connect_one().await?;
    let (server, ca) = api_server_of(&kubeconfig, &target.name)?;
    let broker_url = args.broker_url.clone().unwrap_or(server);

    info!(context = %target.name, namespace = %config.namespace, "Deploying broker");
    let store: KubeObjectStore<Broker> =
        KubeObjectStore::namespaced(target.client, &config.namespace)
            .with_field_manager(FIELD_MANAGER);
    let outcome = deploy_broker(&store, &config, &policy)
        .await?
        .into_result()
        .map_err(|reason| Error::reconcile("broker", reason))?;
    println!("* Broker {} in cluster {}", outcome, target.name);

    let broker_info = BrokerInfo {
        broker_url,
        service_discovery: config.service_discovery,
        ipsec_psk: generate_psk(),
        client_token: ClientToken {
            ca,
            namespace: config.namespace.clone(),
            token: args.broker_token.clone(),
        },
    };
    broker_info
        .write_to(&args.output)
        .await
        .map_err(|e| Error::command_failed(format!("broker deployed, but {}", e)))?;
    println!("* Broker info written to {}", args.output.display());
    Ok(())
}
