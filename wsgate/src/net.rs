//! Client IP extraction with spoofing protection
//!
//! `X-Forwarded-For` is honored only when the immediate peer is a configured
//! trusted proxy (exact address or CIDR range).

use std::net::IpAddr;

use axum::http::HeaderMap;
use ipnet::IpNet;

/// Check whether an address belongs to the trusted proxy list.
///
/// Entries may be exact IPs or CIDR networks; invalid entries are skipped
/// with a warning.
pub fn is_trusted_proxy(addr: IpAddr, trusted_proxies: &[String]) -> bool {
    for entry in trusted_proxies {
        if entry.contains('/') {
            match entry.parse::<IpNet>() {
                Ok(net) => {
                    if net.contains(&addr) {
                        return true;
                    }
                }
                Err(e) => {
                    tracing::warn!("Invalid proxy network in TRUSTED_PROXIES: {} - {}", entry, e);
                }
            }
        } else {
            match entry.parse::<IpAddr>() {
                Ok(ip) => {
                    if ip == addr {
                        return true;
                    }
                }
                Err(e) => {
                    tracing::warn!("Invalid proxy address in TRUSTED_PROXIES: {} - {}", entry, e);
                }
            }
        }
    }
    false
}

/// Extract the client IP for a request.
///
/// The first `X-Forwarded-For` entry is used when the remote peer is a
/// trusted proxy; otherwise the remote address is returned regardless of the
/// header.
pub fn client_ip(headers: &HeaderMap, remote: IpAddr, trusted_proxies: &[String]) -> String {
    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());

    if let Some(forwarded) = forwarded_for {
        if is_trusted_proxy(remote, trusted_proxies) {
            if let Some(first) = forwarded.split(',').next() {
                let candidate = first.trim();
                if !candidate.is_empty() {
                    return candidate.to_string();
                }
            }
        } else {
            tracing::warn!(
                "Ignoring X-Forwarded-For from untrusted source: {}",
                remote
            );
        }
    }

    remote.to_string()
}
