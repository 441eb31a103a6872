//! Custom Resource Definitions for crossnet
//!
//! - [`Broker`]: the shared rendezvous resource clusters register against
//! - [`MeshConnector`]: per-cluster descriptor driving the operator
//! - [`MeshEndpoint`]: one cluster's advertisement of its address space

mod broker;
mod connector;
mod endpoint;

pub use broker::{Broker, BrokerSpec, DEFAULT_BROKER_COMPONENTS};
pub use connector::{MeshConnector, MeshConnectorSpec, MeshConnectorStatus};
pub use endpoint::{MeshEndpoint, MeshEndpointSpec};
