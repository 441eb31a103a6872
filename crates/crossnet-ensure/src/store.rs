//! Object store abstraction over a single resource kind
//!
//! The ensure protocol only needs four verbs on one kind in one namespace,
//! with errors sorted into the categories it branches on.

use std::fmt::Debug;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crossnet_common::kube_utils::{is_already_exists, is_conflict, is_not_found};

/// Store errors, classified by how a caller should react
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Create found an object with the same name
    #[error("{name} already exists")]
    AlreadyExists {
        /// Object name
        name: String,
    },

    /// The named object does not exist
    #[error("{name} not found")]
    NotFound {
        /// Object name
        name: String,
    },

    /// Optimistic concurrency rejected the write
    #[error("conflicting write to {name}: {message}")]
    Conflict {
        /// Object name
        name: String,
        /// Server message
        message: String,
    },

    /// Anything else: connectivity, permissions, validation
    #[error("request for {name} failed: {message}")]
    Other {
        /// Object name
        name: String,
        /// Underlying error message
        message: String,
    },
}

impl StoreError {
    /// Classify a kube API error for the named object
    pub fn from_kube(name: &str, err: kube::Error) -> Self {
        let name = name.to_string();
        if is_already_exists(&err) {
            StoreError::AlreadyExists { name }
        } else if is_conflict(&err) {
            StoreError::Conflict {
                name,
                message: err.to_string(),
            }
        } else if is_not_found(&err) {
            StoreError::NotFound { name }
        } else {
            StoreError::Other {
                name,
                message: err.to_string(),
            }
        }
    }

    /// Errors caused by another writer, which a bounded retry may resolve
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyExists { .. } | StoreError::Conflict { .. }
        )
    }

    /// Name of the object the error concerns
    pub fn name(&self) -> &str {
        match self {
            StoreError::AlreadyExists { name }
            | StoreError::NotFound { name }
            | StoreError::Conflict { name, .. }
            | StoreError::Other { name, .. } => name,
        }
    }
}

/// Create, delete, get and list for one resource kind in one namespace
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Create an object; fails with `AlreadyExists` if the name is taken
    async fn create(&self, object: &K) -> Result<K, StoreError>;

    /// Delete an object by name
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Fetch an object by name
    async fn get(&self, name: &str) -> Result<K, StoreError>;

    /// List every object in the store
    async fn list(&self) -> Result<Vec<K>, StoreError>;
}

/// Object store backed by a namespaced kube [`Api`]
pub struct KubeObjectStore<K> {
    api: Api<K>,
    field_manager: Option<String>,
}

impl<K> KubeObjectStore<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    /// Store for `K` objects in the given namespace
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            field_manager: None,
        }
    }

    /// Record writes under the given field manager
    pub fn with_field_manager(mut self, manager: impl Into<String>) -> Self {
        self.field_manager = Some(manager.into());
        self
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeObjectStore<K>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    #[instrument(skip_all)]
    async fn create(&self, object: &K) -> Result<K, StoreError> {
        let name = object.meta().name.clone().unwrap_or_default();
        let params = PostParams {
            field_manager: self.field_manager.clone(),
            ..Default::default()
        };
        let created = self
            .api
            .create(&params, object)
            .await
            .map_err(|e| StoreError::from_kube(&name, e))?;
        debug!(name = %name, "Created object");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| StoreError::from_kube(name, e))?;
        debug!(name, "Deleted object");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, name: &str) -> Result<K, StoreError> {
        self.api
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(name, e))
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<K>, StoreError> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::from_kube("<list>", e))?;
        Ok(list.items)
    }
}
