//! DHCPv4 server state machine implementation
//!
//! This module implements the per-client lease exchange on the server side:
//! DISCOVER is answered with an OFFER, REQUEST is confirmed with ACK or
//! refused with NAK, RELEASE frees the client's address.
//!
//! Per client the lease goes UNKNOWN → OFFERED → BOUND → (expired or
//! released) → UNKNOWN. Clients do not affect each other except through
//! contention for the same address.

use super::message::{InboundMessage, MessageKind};
use crate::{
    allocator::Allocator,
    config::ServerConfig,
    error::StewardError,
    lease::{Lease, LeaseState, LeaseTable},
    pool::IpPool,
    server::{Decision, DhcpStateMachine, NakReason},
};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};

pub struct DhcpV4Handler {
    config: Arc<ServerConfig>,
    pool: IpPool,
    allocator: Allocator,
    leases: Mutex<LeaseTable>,
}

impl DhcpV4Handler {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self, StewardError> {
        config.validate()?;
        let pool = IpPool::from_config(&config)?;
        let allocator = Allocator::new(config.policy);

        tracing::info!(
            "Lease engine ready: {} assignable addresses, {:?} allocation, {}s leases",
            pool.len(),
            allocator.policy(),
            config.lease_secs()
        );

        Ok(Self {
            config,
            pool,
            allocator,
            leases: Mutex::new(LeaseTable::new()),
        })
    }

    pub fn pool(&self) -> &IpPool {
        &self.pool
    }

    /// Every stored lease, ordered by address.
    pub fn snapshot(&self) -> Vec<Lease> {
        self.table().snapshot()
    }

    /// A copy of the current lease table.
    pub fn leases(&self) -> LeaseTable {
        self.table().clone()
    }

    /// Handles `message` as if it arrived at `now`.
    ///
    /// The whole message is processed under the table lock, so concurrent
    /// messages never observe each other half way.
    pub fn handle_at(
        &self,
        peer: SocketAddr,
        message: &InboundMessage,
        now: SystemTime,
    ) -> Decision {
        let mut table = self.table();

        let decision = match message.kind {
            Some(MessageKind::Discover) => self.handle_discover(&mut table, message, now),
            Some(MessageKind::Request) => self.handle_request(&mut table, message, now),
            Some(MessageKind::Release) => {
                Self::handle_release(&mut table, message);
                Decision::NoReply
            }
            other => {
                tracing::debug!(
                    "Ignoring message {:?} from {} ({})",
                    other,
                    message.client_id,
                    peer
                );
                return Decision::NoReply;
            }
        };

        if tracing::enabled!(tracing::Level::TRACE) {
            for lease in table.snapshot() {
                tracing::trace!(
                    "lease {} -> {} [{}, {}s left]",
                    lease.ip,
                    lease.client_id,
                    lease.state.name(),
                    lease.remaining(now).as_secs()
                );
            }
        }

        decision
    }

    // The table is only ever changed by whole-value assignments, so a panic
    // elsewhere cannot leave it half written.
    fn table(&self) -> MutexGuard<'_, LeaseTable> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_discover(
        &self,
        table: &mut LeaseTable,
        message: &InboundMessage,
        now: SystemTime,
    ) -> Decision {
        let client_id = &message.client_id;

        if let Some(lease) = table.lookup(client_id).filter(|lease| lease.is_active(now)) {
            tracing::info!(
                "DHCPDISCOVER from {}: re-offering {} ({}, {}s left)",
                client_id,
                lease.ip,
                lease.state.name(),
                lease.remaining(now).as_secs()
            );
            return Decision::Offer { ip: lease.ip };
        }

        let Some(ip) = self.allocator.allocate(&self.pool, table, client_id, now) else {
            tracing::warn!("DHCPDISCOVER from {}: no free address in pool", client_id);
            return Decision::NoReply;
        };

        table.put(Lease::new(
            ip,
            client_id.clone(),
            LeaseState::Offered,
            now + self.config.lease_duration,
            message.hostname.clone(),
        ));

        tracing::info!("DHCPOFFER {} to {}", ip, client_id);
        Decision::Offer { ip }
    }

    fn handle_request(
        &self,
        table: &mut LeaseTable,
        message: &InboundMessage,
        now: SystemTime,
    ) -> Decision {
        let client_id = &message.client_id;
        let requested = message.requested_address();

        if let Some(server_id) = message.server_id {
            if server_id != self.config.server_ip {
                tracing::debug!(
                    "DHCPREQUEST from {} is for server {}, staying silent",
                    client_id,
                    server_id
                );
                return Decision::NoReply;
            }
        }

        let Some(ip) = requested.filter(|ip| self.pool.contains(*ip)) else {
            match requested {
                Some(ip) => tracing::warn!(
                    "DHCPNAK: {} requested {} which is outside the pool",
                    client_id,
                    ip
                ),
                None => tracing::warn!("DHCPNAK: {} sent a request without an address", client_id),
            }
            return Decision::Nak(NakReason::NotInPool);
        };

        let expiry = now + self.config.lease_duration;
        let free = table.is_address_free(ip, Some(client_id), now);

        // An expired lease is only revived when nobody else took the
        // address in the meantime.
        if let Some(lease) = table.lookup_mut(client_id).filter(|lease| lease.ip == ip) {
            if lease.is_active(now) || free {
                lease.renew(expiry);
                if message.hostname.is_some() {
                    lease.hostname = message.hostname.clone();
                }
                tracing::info!("DHCPACK: renewed {} for {}", ip, client_id);
                return Decision::Ack { ip };
            }
        }

        if !free {
            tracing::warn!(
                "DHCPNAK: {} requested {} which is leased to another client",
                client_id,
                ip
            );
            return Decision::Nak(NakReason::Unavailable);
        }

        let previous = table.put(Lease::new(
            ip,
            client_id.clone(),
            LeaseState::Bound,
            expiry,
            message.hostname.clone(),
        ));

        match previous {
            Some(old) if old.ip != ip => tracing::info!(
                "DHCPACK: assigned {} to {} (replacing {})",
                ip,
                client_id,
                old.ip
            ),
            _ => tracing::info!("DHCPACK: assigned {} to {}", ip, client_id),
        }
        Decision::Ack { ip }
    }

    fn handle_release(table: &mut LeaseTable, message: &InboundMessage) {
        match table.remove(&message.client_id) {
            Some(lease) => tracing::info!(
                "DHCPRELEASE from {}: freed {}",
                message.client_id,
                lease.ip
            ),
            None => tracing::debug!(
                "DHCPRELEASE from {} without a lease",
                message.client_id
            ),
        }
    }
}

impl DhcpStateMachine for DhcpV4Handler {
    fn handle_message(&self, peer: SocketAddr, message: &InboundMessage) -> Decision {
        self.handle_at(peer, message, SystemTime::now())
    }
}
