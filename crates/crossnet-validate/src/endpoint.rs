//! Endpoint store: the registered MeshEndpoints of the mesh
//!
//! The overlap detector needs a complete snapshot; a partial list would make
//! its result unsound, so the kube-backed store drains every page before
//! returning.

use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

use crossnet_common::crd::MeshEndpoint;
use crossnet_common::{ClusterId, Error};

/// Page size used when listing endpoints
const LIST_PAGE_SIZE: u32 = 500;

/// One cluster's advertised address space
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Cluster the endpoint belongs to
    pub cluster_id: ClusterId,
    /// Advertised subnets, in CIDR notation, in registration order
    pub subnets: Vec<String>,
}

impl Endpoint {
    /// Build an endpoint from an ID and subnet strings
    pub fn new<S: Into<String>>(
        cluster_id: ClusterId,
        subnets: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            cluster_id,
            subnets: subnets.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<&MeshEndpoint> for Endpoint {
    type Error = Error;

    fn try_from(resource: &MeshEndpoint) -> Result<Self, Self::Error> {
        let cluster_id = resource.spec.parsed_cluster_id().map_err(|e| {
            Error::validation_for_field(
                resource.name_any(),
                "spec.clusterId",
                format!("endpoint has an unusable cluster ID: {}", e),
            )
        })?;
        Ok(Self {
            cluster_id,
            subnets: resource.spec.subnets.clone(),
        })
    }
}

/// All endpoints fetched in one validation pass, in list order
pub type EndpointSnapshot = Vec<Endpoint>;

/// Read access to the registered endpoints of the mesh
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// List every endpoint registered in a namespace
    async fn list_endpoints(&self, namespace: &str) -> Result<EndpointSnapshot, Error>;
}

/// Endpoint store backed by the MeshEndpoint API
pub struct KubeEndpointStore {
    client: Client,
}

impl KubeEndpointStore {
    /// Create a store wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EndpointStore for KubeEndpointStore {
    #[instrument(skip(self))]
    async fn list_endpoints(&self, namespace: &str) -> Result<EndpointSnapshot, Error> {
        let api: Api<MeshEndpoint> = Api::namespaced(self.client.clone(), namespace);

        let mut snapshot = Vec::new();
        let mut params = ListParams::default().limit(LIST_PAGE_SIZE);
        loop {
            let page = api.list(&params).await?;
            for resource in &page.items {
                snapshot.push(Endpoint::try_from(resource)?);
            }

            match page.metadata.continue_.filter(|token| !token.is_empty()) {
                Some(token) => params = params.continue_token(&token),
                None => break,
            }
        }

        debug!(namespace, count = snapshot.len(), "Listed mesh endpoints");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossnet_common::crd::MeshEndpointSpec;

    #[test]
    fn converts_registered_resource() {
        let resource = MeshEndpoint::new(
            "east-gw",
            MeshEndpointSpec {
                cluster_id: "east".to_string(),
                subnets: vec!["10.0.0.0/16".to_string(), "100.64.0.0/16".to_string()],
                ..Default::default()
            },
        );

        let endpoint = Endpoint::try_from(&resource).unwrap();
        assert_eq!(endpoint.cluster_id, "east");
        assert_eq!(endpoint.subnets, vec!["10.0.0.0/16", "100.64.0.0/16"]);
    }

    #[test]
    fn malformed_cluster_id_names_the_resource() {
        let resource = MeshEndpoint::new(
            "bad-gw",
            MeshEndpointSpec {
                cluster_id: "Bad_Cluster".to_string(),
                ..Default::default()
            },
        );

        let err = Endpoint::try_from(&resource).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bad-gw"), "{message}");
        assert!(message.contains("Bad_Cluster"), "{message}");
    }
}
