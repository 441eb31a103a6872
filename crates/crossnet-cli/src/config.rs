//! Cluster selection and client construction
//!
//! The kubeconfig resolution chain (highest priority first):
//! 1. Explicit `--kubeconfig` flag
//! 2. `CROSSNET_KUBECONFIG` environment variable
//! 3. Fall back to kube default (`KUBECONFIG` env / `~/.kube/config`)
//!
//! `--context` may be repeated to address several clusters; without it the
//! kubeconfig's current context is used.

use std::time::Duration;

use clap::Args;
use kube::config::Kubeconfig;
use kube::Client;
use tracing::debug;

use crossnet_common::kube_utils::{create_client, current_context, load_kubeconfig};
use crossnet_common::BackoffPolicy;

use crate::{Error, Result};

/// Flags selecting the clusters a command talks to
#[derive(Args, Debug, Clone, Default)]
pub struct ClusterArgs {
    /// Path to kubeconfig file
    #[arg(long, env = "CROSSNET_KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use (repeatable)
    #[arg(long = "context")]
    pub contexts: Vec<String>,
}

/// Flags controlling the create-or-replace retry loop
#[derive(Args, Debug, Clone)]
pub struct RetryArgs {
    /// Maximum delete-and-recreate attempts when another writer interferes
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Delay after the first contended attempt, in milliseconds
    #[arg(long, default_value_t = 10)]
    pub retry_base_ms: u64,
}

impl RetryArgs {
    /// Backoff policy these flags describe.
    ///
    /// The delay cap is raised to the base delay when the base exceeds it.
    pub fn policy(&self) -> Result<BackoffPolicy> {
        let defaults = BackoffPolicy::default();
        let base_delay = Duration::from_millis(self.retry_base_ms);
        let policy = BackoffPolicy {
            max_attempts: self.max_attempts,
            base_delay,
            max_delay: defaults.max_delay.max(base_delay),
            ..defaults
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// A connected cluster
pub struct ClusterTarget {
    /// Context name, used in messages
    pub name: String,
    /// Client for the context
    pub client: Client,
}

impl ClusterArgs {
    /// Load the kubeconfig these flags resolve to
    pub fn kubeconfig(&self) -> Result<Kubeconfig> {
        Ok(load_kubeconfig(self.kubeconfig.as_deref())?)
    }

    /// Context names to address, in flag order
    pub fn context_names(&self, kubeconfig: &Kubeconfig) -> Result<Vec<String>> {
        if !self.contexts.is_empty() {
            for name in &self.contexts {
                if !kubeconfig.contexts.iter().any(|c| &c.name == name) {
                    return Err(Error::validation(format!(
                        "context {:?} not found in kubeconfig",
                        name
                    )));
                }
            }
            return Ok(self.contexts.clone());
        }

        current_context(kubeconfig)
            .map(|name| vec![name])
            .ok_or_else(|| Error::validation("kubeconfig has no current context; pass --context"))
    }

    /// Connect to every selected cluster
    pub async fn connect_all(&self) -> Result<Vec<ClusterTarget>> {
        let kubeconfig = self.kubeconfig()?;
        let mut targets = Vec::new();
        for name in self.context_names(&kubeconfig)? {
            debug!(context = %name, "Connecting to cluster");
            let client = create_client(kubeconfig.clone(), Some(name.as_str())).await?;
            targets.push(ClusterTarget { name, client });
        }
        Ok(targets)
    }

    /// Connect to exactly one cluster
    pub async fn connect_one(&self) -> Result<ClusterTarget> {
        if self.contexts.len() > 1 {
            return Err(Error::validation("this command takes at most one --context"));
        }
        self.connect_all()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::validation("no cluster selected"))
    }
}

/// API server URL and base64 CA bundle of a kubeconfig context
pub fn api_server_of(kubeconfig: &Kubeconfig, context: &str) -> Result<(String, String)> {
    let cluster_name = kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == context)
        .and_then(|c| c.context.as_ref())
        .map(|c| c.cluster.clone())
        .ok_or_else(|| Error::validation(format!("context {:?} not found in kubeconfig", context)))?;

    let cluster = kubeconfig
        .clusters
        .iter()
        .find(|c| c.name == cluster_name)
        .and_then(|c| c.cluster.as_ref())
        .ok_or_else(|| {
            Error::validation(format!("cluster {:?} not found in kubeconfig", cluster_name))
        })?;

    let server = cluster
        .server
        .clone()
        .ok_or_else(|| Error::validation(format!("cluster {:?} has no server", cluster_name)))?;
    let ca = cluster.certificate_authority_data.clone().unwrap_or_default();
    Ok((server, ca))
}
