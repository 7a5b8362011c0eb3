//! Uptime proof service library.
//!
//! Generates, persists, and submits quorum-signed uptime proofs for the
//! validators of a proof-of-stake sidechain, and resolves the delegator
//! rewards that depend on them.
//!
//! ## Modules
//!
//! - [`domain`] - Validation IDs, samples, stored proofs, run results
//! - [`engine`] - Negotiation of the largest signable + submittable uptime
//! - [`store`] - Monotonic proof persistence (Postgres / SQLite)
//! - [`observer`] - Validator-node RPC fan-out
//! - [`signer`] - Signature aggregator client
//! - [`contract`] - Staking-manager submission client
//! - [`indexer`] - GraphQL indexer client
//! - [`service`] - Submit-and-store, reconciliation, rewards orchestration

pub mod config;
pub mod contract;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod message;
pub mod observer;
pub mod service;
pub mod signer;
pub mod store;
pub mod telemetry;
pub mod traits;

// Re-export commonly used types
pub use config::Config;
pub use domain::{
    Delegation, NegotiationResult, ReconcileReport, RunSummary, SampleMap, SignedUptimeMessage,
    UptimeProof, UptimeSample, ValidationId,
};
pub use error::{Result, UptimeError};
pub use service::UptimeService;
pub use traits::{ProofStore, ProofSubmitter, UptimeIndexer, UptimeSigner};
