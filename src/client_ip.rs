use axum::http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr};

/// Used when neither a forwarded-for header nor a peer address is available.
pub const LOOPBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Everything the redirect path knows about where a request came from,
/// captured once at the HTTP boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientAddress {
    /// Raw `X-Forwarded-For` value, possibly a comma-separated chain.
    pub forwarded_for: Option<String>,
    /// Transport-level peer address.
    pub peer: Option<IpAddr>,
}

impl ClientAddress {
    pub fn from_headers(headers: &HeaderMap, peer: Option<IpAddr>) -> Self {
        Self {
            forwarded_for: headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            peer,
        }
    }

    /// Best available client IP: the first forwarded-for entry, else the peer
    /// address, else loopback. The result is normalized with [`normalize`].
    pub fn resolve(&self) -> String {
        // X-Forwarded-For can be a comma-separated list; take the first entry.
        let forwarded = self
            .forwarded_for
            .as_deref()
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        match (forwarded, self.peer) {
            (Some(ip), _) => normalize(ip),
            (None, Some(peer)) => normalize(&peer.to_string()),
            (None, None) => LOOPBACK.to_string(),
        }
    }
}

/// Map IPv6 loopback (`::1`) and IPv4-mapped IPv6 (`::ffff:a.b.c.d`) to plain
/// IPv4. Anything that does not parse as an address is kept as observed.
pub fn normalize(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) if v6.is_loopback() => LOOPBACK.to_string(),
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        Ok(IpAddr::V4(v4)) => v4.to_string(),
        Err(_) => ip.to_owned(),
    }
}

/// `true` when `ip` is a globally routable address worth geolocating.
///
/// Loopback, private, link-local, shared (CGNAT), unspecified and broadcast
/// IPv4 space is excluded, as are IPv6 loopback, unspecified, link-local
/// (fe80::/10) and unique-local (fc00::/7) addresses. IPv4-mapped IPv6 is
/// judged by its IPv4 form. Text that is not an address is never public.
pub fn is_public(ip: &str) -> bool {
    let addr = match ip.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        Ok(addr) => addr,
        Err(_) => return false,
    };

    match addr {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            let shared = a == 100 && (64..=127).contains(&b);
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || shared)
        }
        IpAddr::V6(v6) => {
            let head = v6.segments()[0];
            let link_local = head & 0xffc0 == 0xfe80;
            let unique_local = head & 0xfe00 == 0xfc00;
            !(v6.is_loopback() || v6.is_unspecified() || link_local || unique_local)
        }
    }
}
