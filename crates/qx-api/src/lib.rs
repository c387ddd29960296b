//! Blocking client for the Quantum Experience REST API
//!
//! This crate submits QASM programs to the Quantum Experience service,
//! waits for their results and queries backends, jobs, codes and account
//! credit.
//!
//! # Overview
//!
//! - [`CredentialStore`] owns the session token and renews it through the
//!   login handshake (API token or email/password)
//! - [`TransportClient`] sends every request through a fixed-interval retry
//!   loop with one free token renewal on 401 and JSON shape validation
//! - [`ExecutionPoller`] turns a still-running execution into a bounded wait
//! - [`BackendResolver`] maps loose backend names (`"simulator"`, `"real"`)
//!   to the identifier each endpoint family expects
//! - [`QuantumExperience`] puts it all together
//!
//! All calls block the calling thread; none are safe to share between
//! threads without external synchronization.
//!
//! # Example
//!
//! ```ignore
//! use qx_api::{ClientConfig, ExperimentOptions, QuantumExperience};
//!
//! fn main() -> qx_api::QxResult<()> {
//!     let config = ClientConfig::with_api_token(std::env::var("QX_API_TOKEN").unwrap());
//!     let mut qx = QuantumExperience::connect(config)?;
//!
//!     let qasm = "include \"qelib1.inc\";\nqreg q[2];\ncreg c[2];\nh q[0];\ncx q[0],q[1];\nmeasure q -> c;\n";
//!     let response = qx.run_experiment(qasm, "simulator", 1024, ExperimentOptions::default().with_seed(815))?;
//!     println!("{}: {:?}", response.status, response.result);
//!     Ok(())
//! }
//! ```
//!
//! # Logging
//!
//! The crate emits [`tracing`] events (retries at `warn`, requests at
//! `debug`) and never installs a subscriber. Session tokens are redacted
//! from logged URLs and `Debug` output.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod execution;
pub mod http;
pub mod poller;
pub mod resolver;
pub mod seed;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{BackendStatus, ExperimentOptions, JobOptions, QuantumExperience};
pub use config::{ClientConfig, DEFAULT_BASE_URL, RetryPolicy};
pub use credentials::{Credential, CredentialStore, LoginMethod};
pub use error::{QxError, QxResult};
pub use execution::{ExecutionResult, ExecutionStatus, ExperimentResponse};
pub use http::{Body, HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
pub use poller::{ExecutionPoller, PollOutcome, PollState};
pub use resolver::{BackendInfo, BackendResolver, EndpointKind, ResolvedBackend};
pub use seed::Seed;
pub use transport::TransportClient;
