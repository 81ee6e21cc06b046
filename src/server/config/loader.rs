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

//! Configuration loader for sshadm-server.
//!
//! Sources are applied with the following precedence (highest to lowest):
//! 1. CLI arguments (applied by the binary)
//! 2. Environment variables (`SSHADM_*`)
//! 3. Configuration file (YAML)
//! 4. Default values

use super::types::ServerFileConfig;
use crate::server::resolver::HostnameLookup;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load configuration from file and environment, then validate it.
///
/// If no config path is given, the first existing file among
/// `./sshadm-server.yaml`, `/etc/sshadm/server.yaml` and
/// `$XDG_CONFIG_HOME/sshadm/server.yaml` is used.
///
/// # Environment Variables
///
/// - `SSHADM_PORT` - Server port
/// - `SSHADM_BIND_ADDRESS` - Bind address
/// - `SSHADM_HOST_KEY` - Comma-separated host key paths
/// - `SSHADM_AUTHORIZED_KEYS` - Authorized-credentials list path
/// - `SSHADM_ADMIN_GID` - Admin group id
/// - `SSHADM_IDLE_TIMEOUT` - Idle timeout value, in the configured unit
/// - `SSHADM_HOSTNAME_LOOKUP` - Peer hostname lookup: `dns`, `hosts` or `none`
///
/// # Example
///
/// ```no_run
/// use sshadm::server::config::load_config;
///
/// # fn main() -> anyhow::Result<()> {
/// let config = load_config(Some("/etc/sshadm/custom.yaml".as_ref()))?;
/// # Ok(())
/// # }
/// ```
pub fn load_config(config_path: Option<&Path>) -> Result<ServerFileConfig> {
    let config = load_unvalidated(config_path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from file and environment without validating it.
///
/// The binary uses this so CLI overrides can be applied before
/// [`validate_config`] runs.
pub fn load_unvalidated(config_path: Option<&Path>) -> Result<ServerFileConfig> {
    let mut config = ServerFileConfig::default();

    if let Some(path) = config_path {
        config = load_config_file(path).context("Failed to load configuration file")?;
        tracing::info!(path = %path.display(), "Loaded configuration from file");
    } else {
        for path in default_config_paths() {
            if path.exists() {
                config = load_config_file(&path).context("Failed to load configuration file")?;
                tracing::info!(path = %path.display(), "Loaded configuration from file");
                break;
            }
        }
    }

    apply_env_overrides(config)
}

/// Generate a configuration template as YAML string.
///
/// ```
/// use sshadm::server::config::generate_config_template;
///
/// let template = generate_config_template();
/// assert!(template.contains("admin:"));
/// ```
pub fn generate_config_template() -> String {
    let config = ServerFileConfig::default();
    let mut yaml = String::new();

    yaml.push_str("# sshadm-server configuration file\n");
    yaml.push_str("#\n");
    yaml.push_str("# Configuration hierarchy (highest to lowest precedence):\n");
    yaml.push_str("# 1. CLI arguments\n");
    yaml.push_str("# 2. Environment variables (SSHADM_* prefix)\n");
    yaml.push_str("# 3. This configuration file\n");
    yaml.push_str("# 4. Default values\n\n");

    yaml.push_str(&serde_yaml::to_string(&config).unwrap_or_default());

    yaml
}

/// Load configuration from a YAML file.
fn load_config_file(path: &Path) -> Result<ServerFileConfig> {
    let content =
        std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;

    serde_yaml::from_str(&content).context(format!("Failed to parse {}", path.display()))
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("./sshadm-server.yaml"),
        PathBuf::from("/etc/sshadm/server.yaml"),
    ];

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("sshadm/server.yaml"));
    }

    paths
}

fn apply_env_overrides(mut config: ServerFileConfig) -> Result<ServerFileConfig> {
    if let Ok(port_str) = std::env::var("SSHADM_PORT") {
        config.server.port = port_str
            .parse()
            .context(format!("Invalid SSHADM_PORT value: {port_str}"))?;
        tracing::debug!(port = config.server.port, "Applied SSHADM_PORT override");
    }

    if let Ok(addr) = std::env::var("SSHADM_BIND_ADDRESS") {
        tracing::debug!(address = %addr, "Applied SSHADM_BIND_ADDRESS override");
        config.server.bind_address = addr;
    }

    if let Ok(keys) = std::env::var("SSHADM_HOST_KEY") {
        config.server.host_keys = keys
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        tracing::debug!(
            key_count = config.server.host_keys.len(),
            "Applied SSHADM_HOST_KEY override"
        );
    }

    if let Ok(path) = std::env::var("SSHADM_AUTHORIZED_KEYS") {
        tracing::debug!(path = %path, "Applied SSHADM_AUTHORIZED_KEYS override");
        config.admin.authorized_keys = PathBuf::from(path);
    }

    if let Ok(gid_str) = std::env::var("SSHADM_ADMIN_GID") {
        config.admin.group_id = gid_str
            .parse()
            .context(format!("Invalid SSHADM_ADMIN_GID value: {gid_str}"))?;
        tracing::debug!(gid = config.admin.group_id, "Applied SSHADM_ADMIN_GID override");
    }

    if let Ok(timeout_str) = std::env::var("SSHADM_IDLE_TIMEOUT") {
        config.server.idle_timeout.value = timeout_str
            .parse()
            .context(format!("Invalid SSHADM_IDLE_TIMEOUT value: {timeout_str}"))?;
        tracing::debug!(
            timeout = %config.server.idle_timeout,
            "Applied SSHADM_IDLE_TIMEOUT override"
        );
    }

    if let Ok(lookup) = std::env::var("SSHADM_HOSTNAME_LOOKUP") {
        config.admin.hostname_lookup = lookup
            .parse()
            .context("Invalid SSHADM_HOSTNAME_LOOKUP value")?;
        tracing::debug!(
            lookup = %config.admin.hostname_lookup,
            "Applied SSHADM_HOSTNAME_LOOKUP override"
        );
    }

    Ok(config)
}

/// Validate configuration for correctness.
pub fn validate_config(config: &ServerFileConfig) -> Result<()> {
    if config.server.host_keys.is_empty() {
        anyhow::bail!(
            "At least one host key must be configured (server.host_keys or SSHADM_HOST_KEY)"
        );
    }

    for key_path in &config.server.host_keys {
        if !key_path.exists() {
            anyhow::bail!("Host key file not found: {}", key_path.display());
        }
    }

    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    config
        .server
        .idle_timeout
        .validate()
        .context("Invalid server.idle_timeout")?;

    if !config.admin.allow_password_auth && !config.admin.allow_publickey_auth {
        anyhow::bail!("At least one of password or public key authentication must be enabled");
    }

    if config.admin.hostname_lookup == HostnameLookup::Hosts && config.admin.hosts_file.is_none() {
        anyhow::bail!("admin.hostname_lookup is 'hosts' but admin.hosts_file is not set");
    }

    tracing::info!("Configuration validation passed");
    Ok(())
}
