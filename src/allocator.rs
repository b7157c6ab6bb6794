//! Address selection for clients that do not hold a lease yet.

use crate::{
    lease::{ClientId, LeaseTable},
    pool::IpPool,
};
use std::{net::Ipv4Addr, time::SystemTime};

/// Where the scan over the pool starts.
///
/// Both policies are deterministic: with the same table contents the same
/// client is always offered the same address.
#[derive(clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// Lowest free address.
    #[default]
    FirstFree,
    /// First free address at or above the middle of the pool, wrapping
    /// around to the start.
    Midpoint,
}

impl AllocationPolicy {
    fn start_index(self, pool_len: usize) -> usize {
        match self {
            AllocationPolicy::FirstFree => 0,
            AllocationPolicy::Midpoint => pool_len / 2,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Allocator {
    policy: AllocationPolicy,
}

impl Allocator {
    pub fn new(policy: AllocationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    /// Picks a free address for `client_id`, or `None` when every pool
    /// address is held by another client's unexpired lease.
    pub fn allocate(
        &self,
        pool: &IpPool,
        table: &LeaseTable,
        client_id: &ClientId,
        now: SystemTime,
    ) -> Option<Ipv4Addr> {
        let len = pool.len();
        let start = self.policy.start_index(len);

        (0..len)
            .filter_map(|step| pool.get((start + step) % len))
            .find(|ip| table.is_address_free(*ip, Some(client_id), now))
    }
}
