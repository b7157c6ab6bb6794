//! Lease records and the table that holds them.
//!
//! Expiry is lazy: nothing removes a stale lease in the background. Every
//! query that cares about validity compares the stored expiry against the
//! `now` it is given.

use bytes::Bytes;
use std::{
    collections::HashMap,
    fmt,
    net::Ipv4Addr,
    time::{Duration, SystemTime},
};

/// Opaque client identifier: option 61 when the client sends one, otherwise
/// its hardware address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(Bytes);

impl ClientId {
    pub fn new(id: impl Into<Bytes>) -> Self {
        Self(id.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LeaseState {
    Offered,
    Bound,
}

impl LeaseState {
    pub fn name(&self) -> &'static str {
        match self {
            LeaseState::Offered => "Offered",
            LeaseState::Bound => "Bound",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub ip: Ipv4Addr,
    pub client_id: ClientId,
    pub state: LeaseState,
    pub expiry: SystemTime,
    pub hostname: Option<String>,
}

impl Lease {
    pub fn new(
        ip: Ipv4Addr,
        client_id: ClientId,
        state: LeaseState,
        expiry: SystemTime,
        hostname: Option<String>,
    ) -> Self {
        Self {
            ip,
            client_id,
            state,
            expiry,
            hostname,
        }
    }

    /// A lease holds its address only while `expiry > now`.
    pub fn is_active(&self, now: SystemTime) -> bool {
        self.expiry > now
    }

    /// Confirms the lease until `expiry`.
    pub fn renew(&mut self, expiry: SystemTime) {
        self.expiry = expiry;
        self.state = LeaseState::Bound;
    }

    pub fn remaining(&self, now: SystemTime) -> Duration {
        self.expiry.duration_since(now).unwrap_or(Duration::ZERO)
    }
}

/// At most one lease per client.
///
/// The table itself is not synchronized; the state machine keeps it behind
/// a single lock and performs every operation for one message while holding
/// it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LeaseTable {
    leases: HashMap<ClientId, Lease>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, client_id: &ClientId) -> Option<&Lease> {
        self.leases.get(client_id)
    }

    pub fn lookup_mut(&mut self, client_id: &ClientId) -> Option<&mut Lease> {
        self.leases.get_mut(client_id)
    }

    /// True when no lease, other than the one owned by `excluding`, holds
    /// `ip` past `now`.
    pub fn is_address_free(
        &self,
        ip: Ipv4Addr,
        excluding: Option<&ClientId>,
        now: SystemTime,
    ) -> bool {
        !self.leases.values().any(|lease| {
            lease.ip == ip && lease.is_active(now) && Some(&lease.client_id) != excluding
        })
    }

    /// Inserts the lease, replacing whatever the same client held before.
    pub fn put(&mut self, lease: Lease) -> Option<Lease> {
        self.leases.insert(lease.client_id.clone(), lease)
    }

    pub fn remove(&mut self, client_id: &ClientId) -> Option<Lease> {
        self.leases.remove(client_id)
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lease> {
        self.leases.values()
    }

    /// All stored leases, expired ones included, ordered by address.
    pub fn snapshot(&self) -> Vec<Lease> {
        let mut leases: Vec<Lease> = self.leases.values().cloned().collect();
        leases.sort_by_key(|lease| (lease.ip, lease.client_id.as_bytes().to_vec()));
        leases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn client(last: u8) -> ClientId {
        ClientId::new(vec![0x00, 0x0c, 0x29, 0xa8, 0x92, last])
    }

    fn bound(ip: Ipv4Addr, client_id: ClientId, expiry: SystemTime) -> Lease {
        Lease::new(ip, client_id, LeaseState::Bound, expiry, None)
    }

    #[test]
    fn test_client_id_display() {
        assert_eq!(client(0xf4).to_string(), "00:0c:29:a8:92:f4");
        assert_eq!(ClientId::new(Vec::<u8>::new()).to_string(), "");
    }

    #[test]
    fn test_put_overwrites_same_client() {
        let now = SystemTime::now();
        let mut table = LeaseTable::new();
        let ip_a = Ipv4Addr::new(10, 0, 0, 100);
        let ip_b = Ipv4Addr::new(10, 0, 0, 101);

        assert!(table.put(bound(ip_a, client(1), now + HOUR)).is_none());
        let previous = table.put(bound(ip_b, client(1), now + HOUR));

        assert_eq!(previous.map(|lease| lease.ip), Some(ip_a));
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(&client(1)).map(|lease| lease.ip), Some(ip_b));
        assert!(table.is_address_free(ip_a, None, now));
    }

    #[test]
    fn test_is_address_free_respects_expiry() {
        let now = SystemTime::now();
        let mut table = LeaseTable::new();
        let ip = Ipv4Addr::new(10, 0, 0, 100);

        table.put(bound(ip, client(1), now + HOUR));
        assert!(!table.is_address_free(ip, None, now));
        assert!(table.is_address_free(ip, None, now + HOUR));
        assert!(table.is_address_free(ip, None, now + HOUR * 2));
    }

    #[test]
    fn test_is_address_free_excludes_owner() {
        let now = SystemTime::now();
        let mut table = LeaseTable::new();
        let ip = Ipv4Addr::new(10, 0, 0, 100);

        table.put(bound(ip, client(1), now + HOUR));
        assert!(table.is_address_free(ip, Some(&client(1)), now));
        assert!(!table.is_address_free(ip, Some(&client(2)), now));
    }

    #[test]
    fn test_remove_frees_immediately() {
        let now = SystemTime::now();
        let mut table = LeaseTable::new();
        let ip = Ipv4Addr::new(10, 0, 0, 100);

        table.put(bound(ip, client(1), now + HOUR));
        let removed = table.remove(&client(1));

        assert_eq!(removed.map(|lease| lease.ip), Some(ip));
        assert!(table.is_empty());
        assert!(table.is_address_free(ip, None, now));
        assert!(table.remove(&client(1)).is_none());
    }

    #[test]
    fn test_renew_and_remaining() {
        let now = SystemTime::now();
        let ip = Ipv4Addr::new(10, 0, 0, 100);
        let mut lease = Lease::new(ip, client(1), LeaseState::Offered, now + HOUR, None);

        assert_eq!(lease.remaining(now), HOUR);
        assert_eq!(lease.remaining(now + HOUR * 3), Duration::ZERO);

        lease.renew(now + HOUR * 24);
        assert_eq!(lease.state, LeaseState::Bound);
        assert_eq!(lease.expiry, now + HOUR * 24);
        assert_eq!(lease.state.name(), "Bound");
    }

    #[test]
    fn test_snapshot_is_ordered_by_address() {
        let now = SystemTime::now();
        let mut table = LeaseTable::new();
        table.put(bound(Ipv4Addr::new(10, 0, 0, 102), client(1), now + HOUR));
        table.put(bound(Ipv4Addr::new(10, 0, 0, 100), client(2), now + HOUR));
        table.put(bound(Ipv4Addr::new(10, 0, 0, 101), client(3), now));

        let ips: Vec<_> = table.snapshot().into_iter().map(|lease| lease.ip).collect();
        assert_eq!(
            ips,
            vec![
                Ipv4Addr::new(10, 0, 0, 100),
                Ipv4Addr::new(10, 0, 0, 101),
                Ipv4Addr::new(10, 0, 0, 102),
            ]
        );
        assert_eq!(table.iter().filter(|lease| lease.is_active(now)).count(), 2);
    }
}
