use crate::network::SocketError;
use dhcproto::error::{DecodeError, EncodeError};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StewardError {
    #[error("Socket operation failed")]
    Socket(#[from] SocketError),

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Failed to decode DHCP message")]
    Decode(#[from] DecodeError),

    #[error("Failed to encode DHCP reply")]
    Encode(#[from] EncodeError),

    #[error("Malformed DHCP message: {0}")]
    Malformed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
