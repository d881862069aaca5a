//! Path-sampling, coverage tracking, and validation over a semiconductor-fab
//! utility network.
//!
//! The crate is a library, not a service: `Orchestrator::execute_run` is the
//! single entry point an external CLI or service collaborator calls with a
//! `RunConfig`. Everything else — the Network Store, Path Finder, Sampler,
//! Path Repository, Coverage Tracker, and Validator — is an internal
//! component reachable through the `Store` trait, so a caller can swap
//! `MemoryStore` for `PostgresStore` without touching run logic.

pub mod config;
pub mod coverage;
pub mod error;
pub mod network;
pub mod orchestrator;
pub mod pathfinder;
pub mod repository;
pub mod sampler;
pub mod store;
pub mod store_memory;
#[cfg(feature = "postgres")]
pub mod store_postgres;
pub mod types;
pub mod validator;

pub use config::{mask_database_url, AppConfig, DatabaseConfig};
pub use error::{PathFinderError, SamplerError};
pub use orchestrator::Orchestrator;
pub use store::Store;
pub use store_memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use store_postgres::PostgresStore;
pub use types::*;
