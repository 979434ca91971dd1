#![forbid(unsafe_code)]

//! Conformance harness for agents speaking the Agent Client Protocol over
//! line-delimited JSON-RPC on stdio.

pub mod acp;
pub mod config;
pub mod driver;
pub mod errors;
pub mod report;

pub use config::HarnessConfig;
pub use driver::{DrainPolicy, ProtocolDriver, RunState};
pub use errors::{AppError, Result};
pub use report::{Analysis, RunReport};
