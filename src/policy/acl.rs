//! Network-segment access control: CIDR allow-list plus IP block-list.
//!
//! A pure function of config and a `SocketAddr`, independent of axum, so it
//! unit-tests without a running server.

use crate::config::NetworkSecurityConfig;
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Returns `true` if `addr` may proceed, per `config.network_security`.
///
/// Loopback is always allowed when the bound interface is itself loopback —
/// a misconfigured (or empty) `allowed_networks` list must never lock the
/// operator out of their own machine.
pub fn is_allowed(config: &NetworkSecurityConfig, addr: IpAddr, bind_is_loopback: bool) -> bool {
    if !config.enable_access_control {
        return true;
    }

    if bind_is_loopback && addr.is_loopback() {
        return true;
    }

    for blocked in &config.blocked_ips {
        if blocked.parse::<IpAddr>() == Ok(addr) {
            return false;
        }
    }

    config.allowed_networks.iter().any(|cidr| {
        cidr.parse::<IpNetwork>()
            .map(|net| net.contains(addr))
            .unwrap_or(false)
    })
}
