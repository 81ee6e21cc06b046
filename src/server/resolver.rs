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

//! Best-effort hostname resolution for connecting peers.
//!
//! Host restrictions may name hosts rather than addresses, so each session
//! resolves its peer's hostname once, before the first authentication
//! attempt is evaluated. Which resolver is used is chosen by
//! [`HostnameLookup`]:
//!
//! - [`DnsResolver`]: reverse DNS through the system resolver (default)
//! - [`HostsFileResolver`]: a static `/etc/hosts`-format table loaded at startup
//! - [`NoResolver`]: never resolves; hostname patterns then never match
//!
//! A failed or slow lookup leaves the hostname unset. It never fails the
//! connection.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Maps a peer address to a hostname.
#[async_trait]
pub trait HostnameResolver: Send + Sync {
    async fn resolve(&self, address: IpAddr) -> Option<String>;
}

/// How peer hostnames are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostnameLookup {
    /// Do not resolve hostnames.
    None,
    /// Answer from `admin.hosts_file`.
    Hosts,
    /// Reverse DNS through the system resolver.
    #[default]
    Dns,
}

impl HostnameLookup {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Hosts => "hosts",
            Self::Dns => "dns",
        }
    }
}

impl fmt::Display for HostnameLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostnameLookup {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hosts" => Ok(Self::Hosts),
            "dns" => Ok(Self::Dns),
            other => anyhow::bail!("Unknown hostname lookup mode '{other}' (expected none, hosts or dns)"),
        }
    }
}

/// Resolver that never resolves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

#[async_trait]
impl HostnameResolver for NoResolver {
    async fn resolve(&self, _address: IpAddr) -> Option<String> {
        None
    }
}

/// Reverse DNS lookup through the system resolver.
///
/// The lookup runs on the blocking pool and is abandoned after `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct DnsResolver {
    timeout: Duration,
}

impl DnsResolver {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl HostnameResolver for DnsResolver {
    async fn resolve(&self, address: IpAddr) -> Option<String> {
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&address));

        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Ok(name))) => usable_hostname(&name),
            Ok(Ok(Err(e))) => {
                tracing::debug!(address = %address, error = %e, "Reverse lookup failed");
                None
            }
            Ok(Err(e)) => {
                tracing::debug!(address = %address, error = %e, "Reverse lookup task failed");
                None
            }
            Err(_) => {
                tracing::debug!(
                    address = %address,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Reverse lookup timed out"
                );
                None
            }
        }
    }
}

/// The system resolver hands back the numeric form when no name exists.
fn usable_hostname(name: &str) -> Option<String> {
    let name = name.trim_end_matches('.');
    if name.is_empty() || name.parse::<IpAddr>().is_ok() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Resolver backed by a hosts table.
///
/// For an address listed more than once, the first name on the first line
/// wins.
#[derive(Debug, Clone, Default)]
pub struct HostsFileResolver {
    names: HashMap<IpAddr, String>,
}

impl HostsFileResolver {
    /// Load a hosts file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read hosts file {}", path.display()))?;
        let resolver = Self::parse(&content);
        tracing::info!(
            path = %path.display(),
            entries = resolver.len(),
            "Loaded hosts table"
        );
        Ok(resolver)
    }

    /// Parse hosts-file content. Unparseable lines are skipped.
    pub fn parse(content: &str) -> Self {
        let mut names = HashMap::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(addr), Some(name)) = (fields.next(), fields.next()) else {
                tracing::debug!(line = %(line_num + 1), "Skipping hosts line without a name");
                continue;
            };

            match addr.parse::<IpAddr>() {
                Ok(ip) => {
                    names.entry(ip.to_canonical()).or_insert_with(|| name.to_string());
                }
                Err(_) => {
                    tracing::debug!(line = %(line_num + 1), address = %addr, "Skipping hosts line with invalid address");
                }
            }
        }

        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn lookup(&self, address: IpAddr) -> Option<String> {
        self.names.get(&address.to_canonical()).cloned()
    }
}

#[async_trait]
impl HostnameResolver for HostsFileResolver {
    async fn resolve(&self, address: IpAddr) -> Option<String> {
        self.lookup(address)
    }
}
