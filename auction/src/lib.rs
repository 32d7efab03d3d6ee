pub mod bidding;
pub mod config;
pub mod db;
pub mod eligibility;
pub mod engine;
pub mod metrics;
pub mod model;
pub mod recorder;
pub mod resolver;
pub mod snapshot;
pub mod store;

pub mod error;
pub mod time;
