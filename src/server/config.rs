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

//! Server configuration types.
//!
//! [`ServerConfig`] is the runtime configuration consumed by
//! [`AdminServer`](crate::server::AdminServer). It is normally produced from
//! a YAML file via [`loader::load_config`], or assembled in code with
//! [`ServerConfig::builder`].

pub mod loader;
pub mod types;

use std::path::PathBuf;

use crate::server::resolver::HostnameLookup;
use crate::server::session::{IdleTimeout, TransportTimeouts};
use crate::shared::TimeoutError;

pub use loader::{generate_config_template, load_config, load_unvalidated, validate_config};
pub use types::ServerFileConfig;

/// Runtime configuration for the admin SSH server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:22224").
    pub listen_address: String,

    /// Paths to host key files.
    pub host_keys: Vec<PathBuf>,

    /// Idle timeout; the transport read timeout is twice this value.
    pub idle_timeout: IdleTimeout,

    /// Maximum number of authentication attempts per connection.
    pub max_auth_attempts: u32,

    /// Group whose members may log in with a password.
    pub admin_gid: u32,

    /// Authorized-credentials list for public key login.
    pub authorized_keys: PathBuf,

    /// YAML users file backing password login.
    pub users_file: Option<PathBuf>,

    /// How peer hostnames are resolved.
    pub hostname_lookup: HostnameLookup,

    /// Hosts table used when `hostname_lookup` is [`HostnameLookup::Hosts`].
    pub hosts_file: Option<PathBuf>,

    pub allow_password_auth: bool,

    pub allow_publickey_auth: bool,

    /// JSON-lines audit file.
    pub audit_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerFileConfig::default().into_server_config()
    }
}

impl ServerConfig {
    /// Create a new server configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for constructing server configuration.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Idle and read timeouts for the transport.
    pub fn transport_timeouts(&self) -> Result<TransportTimeouts, TimeoutError> {
        TransportTimeouts::from_idle(&self.idle_timeout)
    }

    pub fn has_host_keys(&self) -> bool {
        !self.host_keys.is_empty()
    }

    pub fn add_host_key(&mut self, path: impl Into<PathBuf>) {
        self.host_keys.push(path.into());
    }
}

/// Builder for constructing [`ServerConfig`].
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn host_keys(mut self, keys: Vec<PathBuf>) -> Self {
        self.config.host_keys = keys;
        self
    }

    pub fn host_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.config.host_keys.push(key.into());
        self
    }

    pub fn listen_address(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_address = addr.into();
        self
    }

    pub fn idle_timeout(mut self, timeout: IdleTimeout) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn max_auth_attempts(mut self, max: u32) -> Self {
        self.config.max_auth_attempts = max;
        self
    }

    pub fn admin_gid(mut self, gid: u32) -> Self {
        self.config.admin_gid = gid;
        self
    }

    pub fn authorized_keys(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.authorized_keys = path.into();
        self
    }

    pub fn users_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.users_file = Some(path.into());
        self
    }

    pub fn hostname_lookup(mut self, lookup: HostnameLookup) -> Self {
        self.config.hostname_lookup = lookup;
        self
    }

    pub fn hosts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.hosts_file = Some(path.into());
        self
    }

    pub fn allow_password_auth(mut self, allow: bool) -> Self {
        self.config.allow_password_auth = allow;
        self
    }

    pub fn allow_publickey_auth(mut self, allow: bool) -> Self {
        self.config.allow_publickey_auth = allow;
        self
    }

    pub fn audit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.audit_file = Some(path.into());
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
