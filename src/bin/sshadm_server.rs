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

//! sshadm-server binary - admin SSH access endpoint
//!
//! This binary provides a command-line interface for running and configuring
//! the admin SSH server.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use sshadm::server::config::{
    generate_config_template, load_unvalidated, validate_config, ServerFileConfig,
};
use sshadm::server::AdminServer;
use sshadm::utils::logging;
use std::io::{self, Write};
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Admin SSH access server
#[derive(Parser, Debug)]
#[command(name = "sshadm-server")]
#[command(version)]
#[command(about = "Admin SSH access server with host-restricted keys and audited logins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short = 'b', long, global = true, value_name = "ADDR")]
    bind_address: Option<String>,

    /// Port to listen on
    #[arg(short, long, global = true, value_name = "PORT")]
    port: Option<u16>,

    /// Host key file(s)
    #[arg(short = 'k', long = "host-key", global = true, value_name = "FILE")]
    host_keys: Vec<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server (default)
    Run,

    /// Generate a configuration file template
    GenConfig {
        /// Output path (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Hash a password for the users file
    HashPassword,

    /// Check configuration for errors
    CheckConfig,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.verbose);

    match &cli.command {
        None | Some(Commands::Run) => run_server(&cli).await,
        Some(Commands::GenConfig { output }) => gen_config(output.clone()),
        Some(Commands::HashPassword) => hash_password(),
        Some(Commands::CheckConfig) => check_config(&cli),
        Some(Commands::Version) => show_version(),
    }
}

/// Load file and environment configuration, then apply CLI overrides.
fn resolve_config(cli: &Cli) -> Result<ServerFileConfig> {
    let mut config = load_unvalidated(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(bind_address) = &cli.bind_address {
        config.server.bind_address = bind_address.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if !cli.host_keys.is_empty() {
        config.server.host_keys = cli.host_keys.clone();
    }

    validate_config(&config)?;
    Ok(config)
}

async fn run_server(cli: &Cli) -> Result<()> {
    tracing::info!("Starting sshadm-server");

    let config = resolve_config(cli)?.into_server_config();

    tracing::info!(
        address = %config.listen_address,
        host_keys = %config.host_keys.len(),
        authorized_keys = %config.authorized_keys.display(),
        admin_gid = config.admin_gid,
        "Server configuration loaded"
    );

    let server = AdminServer::from_config(config).await?;
    server
        .run_until(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

fn gen_config(output: Option<PathBuf>) -> Result<()> {
    let template = generate_config_template();

    if let Some(path) = output {
        #[cfg(unix)]
        {
            use std::fs::OpenOptions;
            use std::os::unix::fs::OpenOptionsExt;

            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)
                .context("Failed to create configuration file")?;

            file.write_all(template.as_bytes())
                .context("Failed to write configuration file")?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(&path, &template).context("Failed to write configuration file")?;
        }

        println!("Configuration template written to {}", path.display());
    } else {
        print!("{template}");
    }

    Ok(())
}

fn hash_password() -> Result<()> {
    use rpassword::read_password;
    use sshadm::server::auth::hash_password as generate_hash;

    print!("Enter password: ");
    io::stdout().flush()?;
    let password = Zeroizing::new(read_password()?);

    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    if password.len() < 8 {
        println!("\nWarning: Password is shorter than 8 characters.\n");
    }

    print!("Confirm password: ");
    io::stdout().flush()?;
    let confirm = Zeroizing::new(read_password()?);

    if *password != *confirm {
        anyhow::bail!("Passwords do not match");
    }

    let hash = generate_hash(&password).context("Failed to hash password")?;

    println!("\nPassword hash:");
    println!("{hash}");
    println!("\nExample users file entry:");
    println!("users:");
    println!("  - name: username");
    println!("    password_hash: \"{hash}\"");
    println!("    gids: [0]");

    Ok(())
}

fn check_config(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;

    println!("Configuration is valid\n");
    println!("Server:");
    println!("  Bind address: {}", config.server.bind_address);
    println!("  Port: {}", config.server.port);
    println!("  Host keys: {}", config.server.host_keys.len());
    for key in &config.server.host_keys {
        println!("    - {}", key.display());
    }
    println!("  Idle timeout: {}", config.server.idle_timeout);
    if let Ok(read) = config.server.idle_timeout.read_timeout() {
        println!("  Read timeout: {read}");
    }
    println!("  Max auth attempts: {}", config.server.max_auth_attempts);

    println!("\nAdmin access:");
    println!("  Group id: {}", config.admin.group_id);
    println!("  Authorized keys: {}", config.admin.authorized_keys.display());
    if let Some(users) = &config.admin.users_file {
        println!("  Users file: {}", users.display());
    }
    println!("  Hostname lookup: {}", config.admin.hostname_lookup);
    if let Some(hosts) = &config.admin.hosts_file {
        println!("  Hosts file: {}", hosts.display());
    }
    println!("  Password auth: {}", config.admin.allow_password_auth);
    println!("  Public key auth: {}", config.admin.allow_publickey_auth);

    if let Some(file) = &config.audit.file {
        println!("\nAudit file: {}", file.display());
    }

    Ok(())
}

fn show_version() -> Result<()> {
    println!("sshadm-server {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cli_parsing() {
        use clap::CommandFactory;

        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parsing_with_subcommand() {
        let args = Cli::try_parse_from(["sshadm-server", "run"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Run)));

        let args = Cli::try_parse_from(["sshadm-server", "gen-config", "-o", "/tmp/x.yaml"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Commands::GenConfig { output: Some(_) })
        ));

        let args = Cli::try_parse_from(["sshadm-server", "hash-password"]).unwrap();
        assert!(matches!(args.command, Some(Commands::HashPassword)));
    }

    #[test]
    fn test_cli_overrides() {
        let args = Cli::try_parse_from([
            "sshadm-server",
            "-b",
            "127.0.0.1",
            "-p",
            "2200",
            "-k",
            "/k1",
            "-k",
            "/k2",
            "-vv",
        ])
        .unwrap();

        assert_eq!(args.bind_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(args.port, Some(2200));
        assert_eq!(args.host_keys.len(), 2);
        assert_eq!(args.verbose, 2);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_gen_config_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.yaml");
        gen_config(Some(path.clone())).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, generate_config_template());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_config_cli_wins() {
        let key = tempfile::NamedTempFile::new().unwrap();
        let config_file = tempfile::NamedTempFile::new().unwrap();
        fs::write(config_file.path(), "server:\n  port: 2299\n").unwrap();
        std::env::remove_var("SSHADM_PORT");

        let args = Cli::try_parse_from([
            "sshadm-server",
            "-c",
            config_file.path().to_str().unwrap(),
            "-p",
            "2300",
            "-k",
            key.path().to_str().unwrap(),
        ])
        .unwrap();

        let config = resolve_config(&args).unwrap();
        assert_eq!(config.server.port, 2300);
        assert_eq!(config.server.host_keys.len(), 1);
    }
}
