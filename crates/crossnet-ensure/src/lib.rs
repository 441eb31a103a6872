//! Create-or-replace reconciliation of crossnet resources
//!
//! - [`store`]: object store trait with a kube-backed implementation
//! - [`memory`]: in-memory store with a simulated competing writer
//! - [`ensure`]: the create, then delete-and-recreate protocol
//! - [`broker`]: Broker deployment and the broker info file
//! - [`join`]: MeshConnector construction and deployment
//! - [`network`]: pod and service CIDR discovery

#![deny(missing_docs)]

pub mod broker;
pub mod ensure;
pub mod join;
pub mod memory;
pub mod network;
pub mod store;

pub use broker::{deploy_broker, BrokerConfig, BrokerInfo, ClientToken};
pub use ensure::{ensure, FailureReason, ReconcileOutcome};
pub use join::{build_connector, join_cluster, JoinConfig};
pub use memory::MemoryStore;
pub use network::{ClusterNetwork, NetworkDiscovery, NodeNetworkDiscovery, StaticNetwork};
pub use store::{KubeObjectStore, ObjectStore, StoreError};
