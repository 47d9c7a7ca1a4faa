// Core infrastructure shared by the cluster and datastore layers

pub mod config;
pub mod errors;

pub use config::{ClusterConfig, ClusterConfigBuilder};
pub use errors::{ClusterError, Result, Stage};
