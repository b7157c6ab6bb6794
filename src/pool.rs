//! The set of addresses the server may hand out.

use crate::{config::ServerConfig, error::StewardError};
use std::net::Ipv4Addr;

/// Assignable addresses in ascending order.
///
/// Built once from an inclusive start/end range. The server's own address
/// is never part of the pool, even when it falls inside the range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpPool {
    addresses: Vec<Ipv4Addr>,
}

impl IpPool {
    pub fn new(
        start: Ipv4Addr,
        end: Ipv4Addr,
        server_ip: Ipv4Addr,
    ) -> Result<Self, StewardError> {
        let (first, last) = (u32::from(start), u32::from(end));
        if first > last {
            return Err(StewardError::InvalidConfig(format!(
                "pool start {start} is above pool end {end}"
            )));
        }

        let addresses: Vec<Ipv4Addr> = (first..=last)
            .map(Ipv4Addr::from)
            .filter(|ip| *ip != server_ip)
            .collect();

        if addresses.is_empty() {
            return Err(StewardError::InvalidConfig(format!(
                "pool {start}-{end} has no assignable address besides the server's own"
            )));
        }

        tracing::debug!(
            "Built address pool {}-{} with {} entries",
            start,
            end,
            addresses.len()
        );

        Ok(Self { addresses })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, StewardError> {
        Self::new(config.pool_start, config.pool_end, config.server_ip)
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.addresses.binary_search(&ip).is_ok()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Ipv4Addr> {
        self.addresses.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.addresses.iter().copied()
    }
}
