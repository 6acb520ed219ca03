//! Client IP extraction and normalization.

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// IPv6 segments kept when normalizing to a /64 prefix.
const IPV6_PREFIX_SEGMENTS: usize = 4;

/// Extract the client IP for rate limiting.
///
/// Checks the first X-Forwarded-For entry, then X-Real-IP, then the direct
/// connection address, falling back to 127.0.0.1 if none is available.
/// Identity here is best-effort, not an authentication boundary.
pub fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> IpAddr {
    if let Some(forwarded) = headers.get("X-Forwarded-For") {
        if let Ok(s) = forwarded.to_str() {
            if let Some(first_ip) = s.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse() {
                    return ip;
                }
            }
        }
    }
    if let Some(real_ip) = headers.get("X-Real-IP") {
        if let Ok(s) = real_ip.to_str() {
            if let Ok(ip) = s.trim().parse() {
                return ip;
            }
        }
    }
    connect_info
        .map(|c| c.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Normalize an IP address into a bucket identity.
///
/// IPv4 addresses are kept as-is. IPv6 addresses are normalized to their
/// /64 prefix to prevent circumvention by rotating through addresses
/// within the same allocation.
pub fn normalize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            let prefix: Vec<String> = (0..IPV6_PREFIX_SEGMENTS)
                .map(|i| format!("{:x}", seg[i]))
                .collect();
            format!("{}::/64", prefix.join(":"))
        }
    }
}
