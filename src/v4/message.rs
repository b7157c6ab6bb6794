//! DHCPv4 message types seen by the state machine, reply composition, and
//! the `dhcproto` codec that maps them to and from the wire.

use crate::{
    config::ServerConfig,
    error::StewardError,
    lease::ClientId,
    server::{Codec, Decision},
};
use bytes::Bytes;
use dhcproto::{
    v4::{self, DhcpOption, OptionCode},
    Decodable as _, Encodable as _, Encoder,
};
use std::{net::Ipv4Addr, time::Duration};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MessageKind {
    Discover,
    Request,
    Release,
    /// Any other DHCP message type, by its option 53 value.
    Other(u8),
}

impl From<v4::MessageType> for MessageKind {
    fn from(msg_type: v4::MessageType) -> Self {
        match msg_type {
            v4::MessageType::Discover => MessageKind::Discover,
            v4::MessageType::Request => MessageKind::Request,
            v4::MessageType::Release => MessageKind::Release,
            other => MessageKind::Other(u8::from(other)),
        }
    }
}

/// The fields of a client message the server acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// `None` for BOOTREPLY traffic and for messages without option 53.
    pub kind: Option<MessageKind>,
    pub xid: u32,
    pub chaddr: Bytes,
    pub client_id: ClientId,
    pub broadcast: bool,
    pub ciaddr: Ipv4Addr,
    pub requested_ip: Option<Ipv4Addr>,
    pub server_id: Option<Ipv4Addr>,
    pub hostname: Option<String>,
}

impl InboundMessage {
    /// A message from the client with hardware address `chaddr`, identified
    /// by that address.
    pub fn new(kind: MessageKind, chaddr: impl Into<Bytes>) -> Self {
        let chaddr = chaddr.into();
        Self {
            kind: Some(kind),
            xid: 0,
            client_id: ClientId::new(chaddr.clone()),
            chaddr,
            broadcast: false,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            requested_ip: None,
            server_id: None,
            hostname: None,
        }
    }

    pub fn with_xid(mut self, xid: u32) -> Self {
        self.xid = xid;
        self
    }

    pub fn with_requested_ip(mut self, ip: Ipv4Addr) -> Self {
        self.requested_ip = Some(ip);
        self
    }

    pub fn with_server_id(mut self, ip: Ipv4Addr) -> Self {
        self.server_id = Some(ip);
        self
    }

    pub fn with_ciaddr(mut self, ip: Ipv4Addr) -> Self {
        self.ciaddr = ip;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Option 50 when present, else the client's own `ciaddr` if it has one.
    pub fn requested_address(&self) -> Option<Ipv4Addr> {
        self.requested_ip
            .or_else(|| (!self.ciaddr.is_unspecified()).then_some(self.ciaddr))
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReplyKind {
    Offer,
    Ack,
    Nak,
}

impl From<ReplyKind> for v4::MessageType {
    fn from(kind: ReplyKind) -> Self {
        match kind {
            ReplyKind::Offer => v4::MessageType::Offer,
            ReplyKind::Ack => v4::MessageType::Ack,
            ReplyKind::Nak => v4::MessageType::Nak,
        }
    }
}

/// Options handed out with every OFFER and ACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseParameters {
    pub subnet_mask: Ipv4Addr,
    pub router: Ipv4Addr,
    pub dns_servers: Vec<Ipv4Addr>,
    pub lease_time: Duration,
}

/// Everything the codec needs to serialize a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    /// The assigned address; `None` on NAK.
    pub your_ip: Option<Ipv4Addr>,
    pub server_ip: Ipv4Addr,
    pub parameters: Option<LeaseParameters>,
    /// Human-readable reason, carried in option 56 on NAK.
    pub message: Option<String>,
}

/// Maps a decision to the reply that should go out, if any.
pub fn compose_reply(decision: &Decision, config: &ServerConfig) -> Option<Reply> {
    let parameters = || LeaseParameters {
        subnet_mask: config.subnet_mask,
        router: config.router,
        dns_servers: config.dns_servers.clone(),
        lease_time: config.lease_duration,
    };

    match decision {
        Decision::Offer { ip } => Some(Reply {
            kind: ReplyKind::Offer,
            your_ip: Some(*ip),
            server_ip: config.server_ip,
            parameters: Some(parameters()),
            message: None,
        }),
        Decision::Ack { ip } => Some(Reply {
            kind: ReplyKind::Ack,
            your_ip: Some(*ip),
            server_ip: config.server_ip,
            parameters: Some(parameters()),
            message: None,
        }),
        Decision::Nak(reason) => Some(Reply {
            kind: ReplyKind::Nak,
            your_ip: None,
            server_ip: config.server_ip,
            parameters: None,
            message: Some(reason.to_string()),
        }),
        Decision::NoReply => None,
    }
}

const MAX_CHADDR_LEN: usize = 16;

/// Wire codec built on `dhcproto`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DhcprotoCodec;

impl Codec for DhcprotoCodec {
    fn decode(&self, datagram: &[u8]) -> Result<InboundMessage, StewardError> {
        let msg = v4::Message::decode(&mut v4::Decoder::new(datagram))?;

        let kind = match msg.opcode() {
            v4::Opcode::BootRequest => match msg.opts().get(OptionCode::MessageType) {
                Some(DhcpOption::MessageType(msg_type)) => Some(MessageKind::from(*msg_type)),
                _ => None,
            },
            _ => None,
        };

        // The header stores at most 16 bytes of hardware address.
        if usize::from(msg.hlen()) > MAX_CHADDR_LEN {
            return Err(StewardError::Malformed(format!(
                "hardware address length {} exceeds {}",
                msg.hlen(),
                MAX_CHADDR_LEN
            )));
        }
        let chaddr = Bytes::copy_from_slice(msg.chaddr());

        let client_id = match msg.opts().get(OptionCode::ClientIdentifier) {
            Some(DhcpOption::ClientIdentifier(id)) if !id.is_empty() => ClientId::new(id.clone()),
            _ if !chaddr.is_empty() => ClientId::new(chaddr.clone()),
            _ => {
                return Err(StewardError::Malformed(
                    "no client identifier and no hardware address".to_string(),
                ))
            }
        };

        let requested_ip = match msg.opts().get(OptionCode::RequestedIpAddress) {
            Some(DhcpOption::RequestedIpAddress(ip)) => Some(*ip),
            _ => None,
        };

        let server_id = match msg.opts().get(OptionCode::ServerIdentifier) {
            Some(DhcpOption::ServerIdentifier(ip)) => Some(*ip),
            _ => None,
        };

        let hostname = match msg.opts().get(OptionCode::Hostname) {
            Some(DhcpOption::Hostname(name)) if !name.is_empty() => Some(name.clone()),
            _ => None,
        };

        Ok(InboundMessage {
            kind,
            xid: msg.xid(),
            chaddr,
            client_id,
            broadcast: msg.flags().broadcast(),
            ciaddr: msg.ciaddr(),
            requested_ip,
            server_id,
            hostname,
        })
    }

    fn encode(&self, request: &InboundMessage, reply: &Reply) -> Result<Vec<u8>, StewardError> {
        let flags = if request.broadcast {
            v4::Flags::default().set_broadcast()
        } else {
            v4::Flags::default()
        };

        let mut msg = v4::Message::default();
        msg.set_opcode(v4::Opcode::BootReply)
            .set_htype(v4::HType::Eth)
            .set_xid(request.xid)
            .set_flags(flags)
            .set_yiaddr(reply.your_ip.unwrap_or(Ipv4Addr::UNSPECIFIED))
            .set_siaddr(reply.server_ip)
            .set_chaddr(&request.chaddr);

        // Only an ACK echoes the client's own address (RFC 2131 table 3).
        if reply.kind == ReplyKind::Ack {
            msg.set_ciaddr(request.ciaddr);
        }

        let opts = msg.opts_mut();
        opts.insert(DhcpOption::MessageType(reply.kind.into()));
        opts.insert(DhcpOption::ServerIdentifier(reply.server_ip));

        if let Some(params) = &reply.parameters {
            let lease_secs = u32::try_from(params.lease_time.as_secs()).unwrap_or(u32::MAX);
            opts.insert(DhcpOption::AddressLeaseTime(lease_secs));
            opts.insert(DhcpOption::SubnetMask(params.subnet_mask));
            opts.insert(DhcpOption::Router(vec![params.router]));
            if !params.dns_servers.is_empty() {
                opts.insert(DhcpOption::DomainNameServer(params.dns_servers.clone()));
            }
        }

        if let Some(text) = &reply.message {
            opts.insert(DhcpOption::Message(text.clone()));
        }

        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer);
        msg.encode(&mut encoder)?;
        Ok(buffer)
    }
}
