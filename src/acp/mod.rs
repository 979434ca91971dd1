//! Agent Client Protocol (ACP) wire handling.
//!
//! - `codec`: NDJSON line framing with a 1 MiB inbound limit.
//! - `frame`: outbound requests and inbound response/notification frames.
//! - `transport`: the [`AgentTransport`](transport::AgentTransport) peer trait.
//! - `spawner`: child-process transport over the agent's stdio.
//! - `memory`: scripted in-memory stub agent used by tests.

pub mod codec;
pub mod frame;
pub mod memory;
pub mod spawner;
pub mod transport;
