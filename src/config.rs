use crate::{allocator::AllocationPolicy, error::StewardError};
use clap::Parser;
use std::{net::Ipv4Addr, time::Duration};

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The network interface to serve (e.g., 'eth0'); every interface when omitted
    #[arg(short, long)]
    pub interface: Option<String>,

    /// This server's own address, announced as the server identifier
    #[arg(long, default_value_t = Ipv4Addr::new(192, 168, 1, 10))]
    pub server_ip: Ipv4Addr,

    #[arg(long, default_value_t = Ipv4Addr::new(255, 255, 255, 0))]
    pub subnet_mask: Ipv4Addr,

    /// Default gateway handed to clients
    #[arg(long, default_value_t = Ipv4Addr::new(192, 168, 1, 1))]
    pub router: Ipv4Addr,

    /// DNS servers handed to clients (comma separated)
    #[arg(
        long = "dns",
        value_delimiter = ',',
        default_values_t = [Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)]
    )]
    pub dns_servers: Vec<Ipv4Addr>,

    /// First address of the pool (inclusive)
    #[arg(long, default_value_t = Ipv4Addr::new(192, 168, 1, 100))]
    pub pool_start: Ipv4Addr,

    /// Last address of the pool (inclusive)
    #[arg(long, default_value_t = Ipv4Addr::new(192, 168, 1, 200))]
    pub pool_end: Ipv4Addr,

    /// Lease duration in seconds
    #[arg(long, default_value_t = 86_400)]
    pub lease_secs: u64,

    /// How a free address is picked for a new client
    #[arg(long, value_enum, default_value_t = AllocationPolicy::FirstFree)]
    pub policy: AllocationPolicy,

    /// UDP port to listen on
    #[arg(long, default_value_t = DHCP_SERVER_PORT)]
    pub port: u16,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

/// Read-only server settings, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub interface: Option<String>,
    pub server_ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub router: Ipv4Addr,
    pub dns_servers: Vec<Ipv4Addr>,
    pub pool_start: Ipv4Addr,
    pub pool_end: Ipv4Addr,
    pub lease_duration: Duration,
    pub policy: AllocationPolicy,
    pub port: u16,
}

impl ServerConfig {
    /// Builds a config for the given server address and pool range, with the
    /// remaining settings at their usual defaults (/24 mask, gateway .1,
    /// public DNS, 24 hour leases).
    pub fn new(server_ip: Ipv4Addr, pool_start: Ipv4Addr, pool_end: Ipv4Addr) -> Self {
        let [a, b, c, _] = server_ip.octets();
        Self {
            interface: None,
            server_ip,
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            router: Ipv4Addr::new(a, b, c, 1),
            dns_servers: vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)],
            pool_start,
            pool_end,
            lease_duration: Duration::from_secs(24 * 60 * 60),
            policy: AllocationPolicy::FirstFree,
            port: DHCP_SERVER_PORT,
        }
    }

    pub fn validate(&self) -> Result<(), StewardError> {
        if u32::from(self.pool_start) > u32::from(self.pool_end) {
            return Err(StewardError::InvalidConfig(format!(
                "pool start {} is above pool end {}",
                self.pool_start, self.pool_end
            )));
        }

        if self.lease_duration.is_zero() {
            return Err(StewardError::InvalidConfig(
                "lease duration must be greater than 0".to_string(),
            ));
        }

        // Option 51 carries the lease time as 32-bit seconds.
        if self.lease_duration.as_secs() > u64::from(u32::MAX) {
            return Err(StewardError::InvalidConfig(format!(
                "lease duration of {}s does not fit in a DHCP lease time option",
                self.lease_duration.as_secs()
            )));
        }

        Ok(())
    }

    /// Lease duration in whole seconds, as sent in option 51.
    pub fn lease_secs(&self) -> u32 {
        u32::try_from(self.lease_duration.as_secs()).unwrap_or(u32::MAX)
    }
}

impl TryFrom<&Args> for ServerConfig {
    type Error = StewardError;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let config = Self {
            interface: args.interface.clone(),
            server_ip: args.server_ip,
            subnet_mask: args.subnet_mask,
            router: args.router,
            dns_servers: args.dns_servers.clone(),
            pool_start: args.pool_start,
            pool_end: args.pool_end,
            lease_duration: Duration::from_secs(args.lease_secs),
            policy: args.policy,
            port: args.port,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["steward"]);
        let config = ServerConfig::try_from(&args).unwrap();

        assert_eq!(config.server_ip, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(config.router, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(
            config.dns_servers,
            vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)]
        );
        assert_eq!(config.pool_start, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(config.pool_end, Ipv4Addr::new(192, 168, 1, 200));
        assert_eq!(config.lease_duration, Duration::from_secs(86_400));
        assert_eq!(config.policy, AllocationPolicy::FirstFree);
        assert_eq!(config.port, DHCP_SERVER_PORT);
        assert_eq!(config.interface, None);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "steward",
            "--interface",
            "eth1",
            "--server-ip",
            "10.0.0.1",
            "--dns",
            "10.0.0.53,1.1.1.1",
            "--pool-start",
            "10.0.0.100",
            "--pool-end",
            "10.0.0.102",
            "--lease-secs",
            "600",
            "--policy",
            "midpoint",
        ]);
        let config = ServerConfig::try_from(&args).unwrap();

        assert_eq!(config.interface.as_deref(), Some("eth1"));
        assert_eq!(config.server_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(
            config.dns_servers,
            vec![Ipv4Addr::new(10, 0, 0, 53), Ipv4Addr::new(1, 1, 1, 1)]
        );
        assert_eq!(config.lease_secs(), 600);
        assert_eq!(config.policy, AllocationPolicy::Midpoint);
    }

    #[test]
    fn test_unparseable_address_is_rejected() {
        let result = Args::try_parse_from(["steward", "--server-ip", "192.168.1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_pool_start_above_end() {
        let config = ServerConfig::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 200),
            Ipv4Addr::new(10, 0, 0, 100),
        );
        assert!(matches!(
            config.validate(),
            Err(StewardError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_lease_duration() {
        let mut config = ServerConfig::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 100),
            Ipv4Addr::new(10, 0, 0, 200),
        );
        config.lease_duration = Duration::ZERO;
        assert!(config.validate().is_err());

        config.lease_duration = Duration::from_secs(u64::from(u32::MAX) + 1);
        assert!(config.validate().is_err());
    }
}
