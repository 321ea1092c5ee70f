pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod gc;
pub mod metrics;
pub mod rest;
pub mod service;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;
