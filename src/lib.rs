pub mod aggregator;
pub mod abis;
pub mod bus;
pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod finalizer;
pub mod oracle;
pub mod orchestrator;
pub mod pool;

pub use aggregator::TokenAggregator;
pub use bus::EventBus;
pub use chain::ChainReader;
pub use config::Settings;
pub use db::Database;
pub use error::IndexError;
pub use finalizer::Finalizer;
pub use oracle::PriceOracle;
pub use orchestrator::Orchestrator;
pub use pool::PoolStateMachine;
