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

//! Configuration types for sshadm-server.
//!
//! This module defines the YAML configuration schema. All types support
//! serde serialization/deserialization and every field has a default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ServerConfig;
use crate::server::resolver::HostnameLookup;
use crate::server::session::IdleTimeout;

/// Server configuration loaded from YAML files.
///
/// # Example YAML
///
/// ```yaml
/// server:
///   bind_address: "0.0.0.0"
///   port: 22224
///   host_keys:
///     - /etc/sshadm/ssh_host_ed25519_key
///   idle_timeout:
///     value: 5
///     unit: minutes
///
/// admin:
///   group_id: 0
///   authorized_keys: /etc/sshadm/authorized_keys
///   users_file: /etc/sshadm/users.yaml
///   hostname_lookup: dns
///
/// audit:
///   file: /var/log/sshadm/access.jsonl
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerFileConfig {
    /// Listener and transport settings.
    pub server: ServerSettings,

    /// Administrative access settings.
    pub admin: AdminSettings,

    /// Audit sink settings.
    pub audit: AuditSettings,
}

/// Listener and transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    ///
    /// Default: "0.0.0.0"
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on.
    ///
    /// Default: 22224
    #[serde(default = "default_port")]
    pub port: u16,

    /// Paths to SSH host private key files, passed through to the transport.
    #[serde(default)]
    pub host_keys: Vec<PathBuf>,

    /// Idle timeout. The transport read timeout is derived as twice this
    /// value.
    ///
    /// Default: 300 seconds
    #[serde(default)]
    pub idle_timeout: IdleTimeout,

    /// Maximum authentication attempts per connection.
    ///
    /// Default: 6
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            host_keys: Vec::new(),
            idle_timeout: IdleTimeout::default(),
            max_auth_attempts: default_max_auth_attempts(),
        }
    }
}

/// Administrative access settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminSettings {
    /// Group whose members may log in with a password.
    ///
    /// Default: 0
    pub group_id: u32,

    /// Authorized-credentials list for public key login.
    ///
    /// Default: /etc/sshadm/authorized_keys
    #[serde(default = "default_authorized_keys")]
    pub authorized_keys: PathBuf,

    /// YAML users file for password login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users_file: Option<PathBuf>,

    /// How connecting peers are named for hostname restrictions:
    /// `dns` (reverse lookup), `hosts` (the `hosts_file` table) or `none`.
    ///
    /// Default: dns
    pub hostname_lookup: HostnameLookup,

    /// Hosts table used when `hostname_lookup` is `hosts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts_file: Option<PathBuf>,

    /// Default: true
    #[serde(default = "default_true")]
    pub allow_password_auth: bool,

    /// Default: true
    #[serde(default = "default_true")]
    pub allow_publickey_auth: bool,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            group_id: 0,
            authorized_keys: default_authorized_keys(),
            users_file: None,
            hostname_lookup: HostnameLookup::default(),
            hosts_file: None,
            allow_password_auth: true,
            allow_publickey_auth: true,
        }
    }
}

/// Audit sink settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuditSettings {
    /// JSON-lines audit file. Records always go to the log as well.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    22224
}

fn default_max_auth_attempts() -> u32 {
    6
}

fn default_authorized_keys() -> PathBuf {
    PathBuf::from("/etc/sshadm/authorized_keys")
}

fn default_true() -> bool {
    true
}

impl ServerFileConfig {
    /// Convert the file schema into the runtime configuration.
    pub fn into_server_config(self) -> ServerConfig {
        let listen_address = if self.server.bind_address.contains(':') {
            format!("[{}]:{}", self.server.bind_address, self.server.port)
        } else {
            format!("{}:{}", self.server.bind_address, self.server.port)
        };

        ServerConfig {
            listen_address,
            host_keys: self.server.host_keys,
            idle_timeout: self.server.idle_timeout,
            max_auth_attempts: self.server.max_auth_attempts,
            admin_gid: self.admin.group_id,
            authorized_keys: self.admin.authorized_keys,
            users_file: self.admin.users_file,
            hostname_lookup: self.admin.hostname_lookup,
            hosts_file: self.admin.hosts_file,
            allow_password_auth: self.admin.allow_password_auth,
            allow_publickey_auth: self.admin.allow_publickey_auth,
            audit_file: self.audit.file,
        }
    }
}
