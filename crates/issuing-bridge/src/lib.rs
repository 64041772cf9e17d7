//! Issuing Bridge Library
//!
//! Client-side coordinator for moving ERC-20 tokens between the backing
//! contract on the source chain and the mapping contract on the destination
//! chain. Registers tokens, waits for the indexer to observe registrations,
//! fetches membership proofs and broadcasts them to subscribers.

pub mod bus;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod indexer;
pub mod manager;
pub mod monitor;
pub mod proof;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bus::{ProofBus, ProofStream};
pub use catalog::TokenCatalog;
pub use config::BridgeConfig;
pub use coordinator::{RegistrationCoordinator, SymbolEncoding};
pub use error::{BridgeError, ConfigError, IndexerError, MonitorError, ProofError};
pub use manager::{BridgeParts, BridgeSettings, IssuingBridge};
pub use monitor::{ProofMonitor, ProofSubscription, Reservation, RetryPolicy};
