//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction from kubeconfig contexts and structured
//! classification of API errors. The classification drives the ensure
//! protocol's branching, so it matches on status codes and reasons rather
//! than message strings.

use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::{Error, KUBECONFIG_ENV};

/// Default connect timeout for API server connections
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read timeout for API requests
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Kubernetes reason string for a create that hit an existing object
const REASON_ALREADY_EXISTS: &str = "AlreadyExists";

/// Resolve the kubeconfig path to use.
///
/// Priority:
/// 1. `explicit`: the `--kubeconfig` CLI flag
/// 2. `CROSSNET_KUBECONFIG` env var
/// 3. `None`: fall back to kube defaults (`KUBECONFIG` / `~/.kube/config`)
pub fn resolve_kubeconfig(explicit: Option<&str>) -> Option<String> {
    if let Some(path) = explicit {
        return Some(path.to_string());
    }

    match std::env::var(KUBECONFIG_ENV) {
        Ok(path) if !path.is_empty() => Some(path),
        _ => None,
    }
}

/// Load a [`Kubeconfig`] using the resolution chain
pub fn load_kubeconfig(explicit: Option<&str>) -> Result<Kubeconfig, Error> {
    match resolve_kubeconfig(explicit) {
        Some(path) => Kubeconfig::read_from(&path).map_err(|e| {
            Error::config(format!("failed to read kubeconfig {}: {}", path, e))
        }),
        None => Kubeconfig::read()
            .map_err(|e| Error::config(format!("failed to read kubeconfig: {}", e))),
    }
}

/// Name of the context a kubeconfig selects when none is given
pub fn current_context(kubeconfig: &Kubeconfig) -> Option<String> {
    kubeconfig.current_context.clone()
}

/// Build a kube [`Client`] for one context of a kubeconfig.
///
/// `context = None` uses the kubeconfig's current context. Timeouts bound
/// every request made through the client.
pub async fn create_client(
    kubeconfig: Kubeconfig,
    context: Option<&str>,
) -> Result<Client, Error> {
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };

    let mut config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| {
            Error::internal_with_context(
                "create_client",
                format!(
                    "failed to load context {}: {}",
                    context.unwrap_or("<current>"),
                    e
                ),
            )
        })?;
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

    debug!(context = context.unwrap_or("<current>"), cluster_url = %config.cluster_url, "Creating kube client");

    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Check if an error is a 409 for a create that found an existing object
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == REASON_ALREADY_EXISTS)
}

/// Check if an error is a 409 optimistic-concurrency conflict
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason != REASON_ALREADY_EXISTS)
}

/// Check if an error is a 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn classifies_409_by_reason() {
        let exists = api_error(409, "AlreadyExists");
        assert!(is_already_exists(&exists));
        assert!(!is_conflict(&exists));

        let conflict = api_error(409, "Conflict");
        assert!(is_conflict(&conflict));
        assert!(!is_already_exists(&conflict));
    }

    #[test]
    fn classifies_404() {
        assert!(is_not_found(&api_error(404, "NotFound")));
        assert!(!is_not_found(&api_error(403, "Forbidden")));
        assert!(!is_conflict(&api_error(500, "InternalError")));
    }

    #[test]
    fn explicit_kubeconfig_wins() {
        assert_eq!(
            resolve_kubeconfig(Some("/tmp/explicit")),
            Some("/tmp/explicit".to_string())
        );
    }
}
