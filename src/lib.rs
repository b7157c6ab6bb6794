//! # Steward - A Small DHCPv4 Server
//!
//! Steward hands out IPv4 leases from a single configured pool. It answers
//! the server side of the DORA (Discover, Offer, Request, Acknowledge)
//! exchange and frees addresses on RELEASE.
//!
//! ## Features
//!
//! - Per-client lease state machine behind a single lock
//! - Lazy expiry: stale leases are ignored at query time, no background sweep
//! - First-free or midpoint address selection
//! - Pluggable transport and codec; UDP and `dhcproto` provided
//! - Asynchronous operation using Tokio
//!
//! ## Example
//!
//! ```rust,no_run
//! use steward::{DhcpServer, ServerConfig};
//! use std::net::Ipv4Addr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new(
//!         Ipv4Addr::new(192, 168, 1, 10),
//!         Ipv4Addr::new(192, 168, 1, 100),
//!         Ipv4Addr::new(192, 168, 1, 200),
//!     );
//!     let server = DhcpServer::new(config).await?;
//!     server.run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!     Ok(())
//! }
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod lease;
pub mod network;
pub mod pool;
pub mod server;
pub mod v4;

pub use allocator::{AllocationPolicy, Allocator};
pub use config::{Args, ServerConfig};
pub use error::StewardError;
pub use lease::{ClientId, Lease, LeaseState, LeaseTable};
pub use pool::IpPool;
pub use server::{Codec, Decision, DhcpServer, DhcpStateMachine, NakReason, Transport};
pub use v4::{DhcpV4Handler, DhcprotoCodec, InboundMessage, MessageKind, Reply, ReplyKind};
