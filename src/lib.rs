//! Floor Oracle Library
//!
//! Multi-source NFT floor price oracle and trustless prediction market resolver

pub mod agent;
pub mod analyst;
pub mod chain;
pub mod config;
pub mod error;
pub mod indexer;
pub mod oracle;
pub mod persistence;
pub mod portfolio;
pub mod resolver;
pub mod scheduler;
pub mod settlement;
pub mod types;
