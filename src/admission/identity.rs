//! Client identity for rate limiting

use axum::extract::ConnectInfo;
use axum::http::Request;
use std::net::{IpAddr, SocketAddr};

/// The rate-limit key: normally the caller's IP address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    raw: String,
    addr: Option<IpAddr>,
}

impl ClientIdentity {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let addr = raw.parse().ok();
        Self { raw, addr }
    }

    /// Identity for a request. Uses the socket peer address, or the first
    /// `X-Forwarded-For` hop / `X-Real-IP` when the proxy is trusted.
    pub fn from_request<B>(request: &Request<B>, trust_forwarded_for: bool) -> Self {
        if trust_forwarded_for {
            let headers = request.headers();
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').next())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .or_else(|| {
                    headers
                        .get("x-real-ip")
                        .and_then(|h| h.to_str().ok())
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                });
            if let Some(ip) = forwarded {
                return Self::new(ip);
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| Self::new(addr.ip().to_string()))
            .unwrap_or_else(|| Self::new("unknown"))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.addr
    }

    /// Private, loopback or link-local infrastructure address
    pub fn is_private(&self) -> bool {
        self.addr.as_ref().map(is_private_address).unwrap_or(false)
    }
}

pub fn is_private_address(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_address(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                // fc00::/7 unique local
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_private_addresses() {
        for ip in [
            "10.1.2.3",
            "172.16.0.9",
            "192.168.1.1",
            "127.0.0.1",
            "169.254.10.10",
            "::1",
            "fd12:3456::1",
            "fe80::1",
            "::ffff:10.0.0.1",
        ] {
            assert!(ClientIdentity::new(ip).is_private(), "{ip} should be private");
        }
    }

    #[test]
    fn test_public_and_unparsable_addresses() {
        for ip in ["203.0.113.5", "8.8.8.8", "2001:db8::1", "::ffff:8.8.8.8", "unknown", ""] {
            assert!(!ClientIdentity::new(ip).is_private(), "{ip} should not be private");
        }
    }

    #[test]
    fn test_from_connect_info() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "198.51.100.7")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 5], 40000))));

        assert_eq!(ClientIdentity::from_request(&request, false).as_str(), "203.0.113.5");
        assert_eq!(ClientIdentity::from_request(&request, true).as_str(), "198.51.100.7");
    }

    #[test]
    fn test_forwarded_for_chain_and_fallbacks() {
        let request = Request::builder()
            .header("x-forwarded-for", " 198.51.100.7 , 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(ClientIdentity::from_request(&request, true).as_str(), "198.51.100.7");

        let request = Request::builder()
            .header("x-real-ip", "198.51.100.8")
            .body(Body::empty())
            .unwrap();
        assert_eq!(ClientIdentity::from_request(&request, true).as_str(), "198.51.100.8");

        let request = Request::builder().body(Body::empty()).unwrap();
        let identity = ClientIdentity::from_request(&request, true);
        assert_eq!(identity.as_str(), "unknown");
        assert!(identity.ip().is_none());
    }
}
