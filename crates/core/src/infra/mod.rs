pub mod config_store;
pub mod metrics;
pub mod transport;
