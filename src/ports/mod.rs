//! Port traits: the contracts the domain expects from the outside world.

pub mod cache_port;
pub mod config_port;
pub mod data_port;
pub mod report_port;
