//! DHCP server driver
//!
//! This module contains the pieces that sit around the lease state machine:
//! - The `Transport` and `Codec` capabilities the server is built from
//! - The `Decision` a state machine returns for each message
//! - The receive loop that runs one task per datagram

use crate::{
    config::{ServerConfig, DHCP_CLIENT_PORT},
    error::StewardError,
    network,
    v4::{
        handler::DhcpV4Handler,
        message::{compose_reply, DhcprotoCodec, InboundMessage, Reply, ReplyKind},
    },
};
use std::{
    fmt,
    future::Future,
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
};
use tokio::{net::UdpSocket, task::JoinSet};

/// Largest datagram the server reads; DHCP messages fit in an Ethernet frame.
const MAX_DATAGRAM_SIZE: usize = 1500;

/// Why a REQUEST was refused.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NakReason {
    NotInPool,
    Unavailable,
}

impl fmt::Display for NakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NakReason::NotInPool => f.write_str("address not in pool"),
            NakReason::Unavailable => f.write_str("address unavailable"),
        }
    }
}

/// What the state machine wants sent back for one inbound message.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Decision {
    Offer { ip: Ipv4Addr },
    Ack { ip: Ipv4Addr },
    Nak(NakReason),
    NoReply,
}

/// Common trait for server-side DHCP state machines
pub trait DhcpStateMachine {
    /// Handles one decoded client message and decides the reply.
    fn handle_message(&self, peer: SocketAddr, message: &InboundMessage) -> Decision;
}

/// Moves datagrams in and out of the server.
pub trait Transport: Send + Sync + 'static {
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;
}

/// Turns datagrams into messages and replies into datagrams.
pub trait Codec: Send + Sync + 'static {
    fn decode(&self, datagram: &[u8]) -> Result<InboundMessage, StewardError>;

    fn encode(&self, request: &InboundMessage, reply: &Reply) -> Result<Vec<u8>, StewardError>;
}

/// Picks where a reply goes.
///
/// NAKs and replies to clients that asked for broadcast are broadcast. A
/// client that already has an address gets a unicast to it; otherwise the
/// datagram's source is used when it is a usable unicast address.
pub fn reply_destination(peer: SocketAddr, request: &InboundMessage, reply: &Reply) -> SocketAddr {
    let to_client = |ip: Ipv4Addr| SocketAddr::V4(SocketAddrV4::new(ip, DHCP_CLIENT_PORT));

    if reply.kind == ReplyKind::Nak || request.broadcast {
        return to_client(Ipv4Addr::BROADCAST);
    }

    if !request.ciaddr.is_unspecified() {
        return to_client(request.ciaddr);
    }

    match peer {
        SocketAddr::V4(addr) if !addr.ip().is_unspecified() && !addr.ip().is_broadcast() => peer,
        _ => to_client(Ipv4Addr::BROADCAST),
    }
}

struct Shared<T, C> {
    config: Arc<ServerConfig>,
    transport: T,
    codec: C,
    state_machine: Arc<dyn DhcpStateMachine + Send + Sync>,
}

impl<T: Transport, C: Codec> Shared<T, C> {
    /// Runs one datagram through decode, decide, compose, encode and send.
    /// Failures are logged and the datagram is dropped; the client's own
    /// retransmission takes care of recovery.
    async fn process(&self, peer: SocketAddr, datagram: Vec<u8>) {
        let message = match self.codec.decode(&datagram) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("Dropping undecodable datagram from {}: {}", peer, e);
                return;
            }
        };

        let decision = self.state_machine.handle_message(peer, &message);
        tracing::debug!("Decision for {} ({}): {:?}", message.client_id, peer, decision);

        let Some(reply) = compose_reply(&decision, &self.config) else {
            return;
        };

        let packet = match self.codec.encode(&message, &reply) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::error!(
                    "Failed to encode {:?} for {}: {}",
                    reply.kind,
                    message.client_id,
                    e
                );
                return;
            }
        };

        let target = reply_destination(peer, &message, &reply);
        match self.transport.send_to(&packet, target).await {
            Ok(len) => tracing::debug!("Sent {:?} ({} bytes) to {}", reply.kind, len, target),
            Err(e) => tracing::error!("Failed to send {:?} to {}: {}", reply.kind, target, e),
        }
    }
}

pub struct DhcpServer<T = UdpSocket, C = DhcprotoCodec> {
    shared: Arc<Shared<T, C>>,
}

impl DhcpServer {
    /// Builds the lease engine from `config` and binds the UDP socket it
    /// serves on.
    pub async fn new(config: ServerConfig) -> Result<Self, StewardError> {
        let config = Arc::new(config);
        let handler = DhcpV4Handler::new(Arc::clone(&config))?;

        let socket = network::new_tokio_socket_bound_to_device(
            config.interface.as_deref(),
            config.port,
        )?;

        Ok(Self::with_parts(config, socket, DhcprotoCodec, Arc::new(handler)))
    }
}

impl<T: Transport, C: Codec> DhcpServer<T, C> {
    pub fn with_parts(
        config: Arc<ServerConfig>,
        transport: T,
        codec: C,
        state_machine: Arc<dyn DhcpStateMachine + Send + Sync>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                codec,
                state_machine,
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Serves until `shutdown` resolves.
    ///
    /// Every datagram is handled in its own task. Once `shutdown` fires no
    /// further datagrams are read, and the tasks already started are
    /// awaited before returning.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), StewardError>
    where
        F: Future<Output = ()>,
    {
        let mut in_flight = JoinSet::new();
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        tokio::pin!(shutdown);

        tracing::info!(
            "Serving {}-{} as {} on port {}",
            self.shared.config.pool_start,
            self.shared.config.pool_end,
            self.shared.config.server_ip,
            self.shared.config.port
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting datagrams");
                    break;
                }
                received = self.shared.transport.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => {
                            tracing::debug!("Received {} bytes from {}", len, peer);
                            let shared = Arc::clone(&self.shared);
                            let datagram = buf[..len].to_vec();
                            in_flight.spawn(async move { shared.process(peer, datagram).await });
                        }
                        Err(e) => {
                            tracing::warn!("Socket receive error: {}", e);
                        }
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Message task failed: {}", e);
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Message task failed: {}", e);
            }
        }

        tracing::info!("Server stopped");
        Ok(())
    }
}
