//! Builders to construct monitors from configuration.

pub mod monitor_builder;

pub use monitor_builder::{build_monitor, MonitorBuilder};
