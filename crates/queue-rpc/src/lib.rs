//! # Queue RPC - Request-Reply over the Message Broker
//!
//! Callers issue a logical request for data owned by another service and
//! receive a correlated response, without either side sharing a direct
//! connection. The broker is an external process reachable at a configured
//! TCP address.
//!
//! ```text
//! ┌──────────────┐   call()                      ┌──────────────┐
//! │    Caller    │ ───────┐                      │   Consumer   │
//! └──────────────┘        ▼                      └──────────────┘
//!                   ┌──────────────┐  destination queue  ↑
//!                   │    Broker    │ ────────────────────┘
//!                   │              │ ◄───────────────────┐
//!                   └──────┬───────┘   reply queue       │
//!                          ▼                      reply w/ token
//!                   reply listener ── token lookup ── waiting caller
//! ```
//!
//! One shared connection and publish channel serve every caller
//! ([`link::BrokerLink`]); one listener task demultiplexes every reply by
//! correlation token into the pending table ([`pending::PendingReplyStore`]);
//! [`client::RpcClient::call`] ties the two together with a per-call
//! deadline.

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod correlation;
pub mod error;
pub mod link;
pub mod pending;
pub mod wire;

// Re-export main types
pub use client::RpcClient;
pub use correlation::CorrelationId;
pub use error::RpcError;
pub use link::{BrokerConfig, BrokerLink, LinkState, DEFAULT_BROKER_URL};
pub use pending::{PendingReplyStore, PendingStats};
pub use wire::{Envelope, MAX_FRAME_SIZE};
