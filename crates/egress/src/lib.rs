//! bridge_egress
//!
//! Component E — the SSRF-safe outbound HTTP client. Every call the
//! Relay makes on behalf of a provider or tool crosses this module: DNS
//! resolution and private-range classification happen before a single
//! byte is written to a socket, and the resolver handed to the HTTP
//! client is pinned to exactly the addresses this module itself
//! resolved (spec §4.E).

mod allowlist;
mod classify;
mod client;

pub use allowlist::{AllowDecision, Allowlist, HostMatcher, PrivateEndpoint};
pub use client::{fetch, EgressConfig, EgressError, FetchOutcome};
