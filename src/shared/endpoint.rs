// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Remote endpoint description.
//!
//! A [`RemoteEndpoint`] is plain data: the peer's literal address, its port
//! when known, and a hostname resolved best-effort by the transport layer.
//! Policy evaluation and auditing accept this type instead of a live
//! connection so they can be exercised without a network session.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// The remote side of a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    address: IpAddr,
    port: Option<u16>,
    hostname: Option<String>,
}

impl RemoteEndpoint {
    /// Create an endpoint for a bare address.
    ///
    /// IPv4-mapped IPv6 addresses are normalized to their IPv4 form so that
    /// IPv4 CIDR ranges match peers accepted on a dual-stack listener.
    pub fn new(address: IpAddr) -> Self {
        Self {
            address: address.to_canonical(),
            port: None,
            hostname: None,
        }
    }

    /// Create an endpoint from a peer socket address.
    pub fn from_socket(addr: SocketAddr) -> Self {
        Self {
            port: Some(addr.port()),
            ..Self::new(addr.ip())
        }
    }

    /// Endpoint used when the transport could not report a peer address.
    pub fn unknown() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    /// Attach a resolved hostname.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        if !hostname.is_empty() {
            self.hostname = Some(hostname);
        }
        self
    }

    /// The literal IP address of the peer.
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// The peer port, if known.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The resolved hostname, if resolution succeeded.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Description of the remote socket used in log records.
    ///
    /// Formatted as `hostname/address:port`, omitting the parts that are
    /// not known.
    pub fn socket_description(&self) -> String {
        let socket = match self.port {
            Some(port) => SocketAddr::new(self.address, port).to_string(),
            None => self.address.to_string(),
        };
        match &self.hostname {
            Some(name) => format!("{name}/{socket}"),
            None => socket,
        }
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.socket_description())
    }
}

impl From<SocketAddr> for RemoteEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::from_socket(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_socket_description_without_hostname() {
        let endpoint = RemoteEndpoint::from_socket("10.0.0.1:2222".parse().unwrap());
        assert_eq!(endpoint.socket_description(), "10.0.0.1:2222");
    }

    #[test]
    fn test_socket_description_with_hostname() {
        let endpoint = RemoteEndpoint::from_socket("10.0.0.1:2222".parse().unwrap())
            .with_hostname("admin.example.org");
        assert_eq!(
            endpoint.socket_description(),
            "admin.example.org/10.0.0.1:2222"
        );
        assert_eq!(endpoint.to_string(), endpoint.socket_description());
    }

    #[test]
    fn test_ipv6_socket_description() {
        let endpoint = RemoteEndpoint::from_socket("[2001:db8::1]:22".parse().unwrap());
        assert_eq!(endpoint.socket_description(), "[2001:db8::1]:22");
    }

    #[test]
    fn test_mapped_ipv4_is_canonicalized() {
        let mapped = IpAddr::V6(Ipv4Addr::new(192, 168, 1, 7).to_ipv6_mapped());
        let endpoint = RemoteEndpoint::new(mapped);
        assert_eq!(endpoint.address(), IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)));

        let native = RemoteEndpoint::new(IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert!(native.address().is_ipv6());
    }

    #[test]
    fn test_empty_hostname_ignored() {
        let endpoint = RemoteEndpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST)).with_hostname("");
        assert!(endpoint.hostname().is_none());
    }
}
