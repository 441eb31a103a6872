//! CLI commands

pub mod deploy_broker;
pub mod join;
pub mod validate;
