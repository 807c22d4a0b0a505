pub mod audit;
pub mod broker;
pub mod config;
pub mod inject;
pub mod lease;
pub mod pipeline;
