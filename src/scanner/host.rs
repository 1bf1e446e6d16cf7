//! Identity of the scanning host.

use crate::core::types::HostIdentity;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use sysinfo::System;

/// Address used when no outbound route can be determined.
const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Public resolver used only to pick the outbound interface; nothing is sent.
const ROUTE_TARGET: &str = "8.8.8.8:80";

impl HostIdentity {
    /// Resolve hostname, outbound IP and OS of the current machine.
    pub fn resolve() -> Self {
        let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
        let os = System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
        let ip = outbound_ip().to_string();

        log::debug!("Host identity: {} ({}) running {}", hostname, ip, os);
        Self { hostname, ip, os }
    }
}

/// Local address of the interface that would route to the public internet.
///
/// Connecting a UDP socket only selects a route; no datagram leaves the host.
pub fn outbound_ip() -> IpAddr {
    let discover = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(ROUTE_TARGET)?;
        Ok(socket.local_addr()?.ip())
    };

    match discover() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => LOOPBACK,
        Err(e) => {
            log::debug!("No outbound route ({}); using loopback address", e);
            LOOPBACK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_fills_every_field() {
        let host = HostIdentity::resolve();
        assert!(!host.hostname.is_empty());
        assert!(!host.os.is_empty());
        assert!(host.ip.parse::<IpAddr>().is_ok());
    }

    #[test]
    fn test_outbound_ip_is_never_unspecified() {
        assert!(!outbound_ip().is_unspecified());
    }
}
