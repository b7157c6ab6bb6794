//! DHCPv4 protocol implementation
//!
//! This module contains the DHCPv4-specific implementation including:
//! - Message decoding and reply encoding
//! - Reply composition from state machine decisions
//! - The server-side lease state machine

pub mod handler;
pub mod message;


pub use handler::DhcpV4Handler;
pub use message::{
    compose_reply, DhcprotoCodec, InboundMessage, LeaseParameters, MessageKind, Reply, ReplyKind,
};
