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

//! YAML users-file identity backend.
//!
//! ```yaml
//! users:
//!   - name: admin
//!     password_hash: "$argon2id$v=19$m=19456,t=2,p=1$..."
//!     gids: [0]
//!   - name: operator
//!     password_hash: "$2b$12$..."
//!     gids: [100, 1000]
//! ```
//!
//! Argon2id hashes are preferred; bcrypt hashes are accepted for
//! compatibility. Unknown users are verified against a dummy hash and every
//! verification is padded to a minimum duration so that response time does
//! not reveal whether a user exists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier as _},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use super::backend::{Credential, Identity, IdentityBackend, LoginRequest};
use crate::shared::error::LoginFailure;

const MIN_VERIFY_TIME: Duration = Duration::from_millis(100);

/// One user definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    pub password_hash: String,
    #[serde(default)]
    pub gids: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserEntry>,
}

/// Identity backend reading users and password hashes from a YAML file.
pub struct UsersFileBackend {
    path: Option<PathBuf>,
    users: RwLock<HashMap<String, UserEntry>>,
    dummy_hash: String,
}

impl UsersFileBackend {
    /// Load users from a file.
    ///
    /// A missing file is logged and leaves the backend with no users.
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let backend = Self {
            path: Some(path.into()),
            users: RwLock::new(HashMap::new()),
            dummy_hash: hash_password("dummy_password_for_timing_attack_mitigation")?,
        };
        backend.reload().await?;
        Ok(backend)
    }

    /// Build a backend from in-memory definitions.
    pub fn from_users(users: Vec<UserEntry>) -> Result<Self> {
        let users = users.into_iter().map(|u| (u.name.clone(), u)).collect();
        Ok(Self {
            path: None,
            users: RwLock::new(users),
            dummy_hash: hash_password("dummy_password_for_timing_attack_mitigation")?,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the users file. Has no effect for in-memory backends.
    pub async fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let users = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let file: UsersFile = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse users file: {}", path.display()))?;
                file.users
                    .into_iter()
                    .map(|u| (u.name.clone(), u))
                    .collect::<HashMap<_, _>>()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Users file not found");
                HashMap::new()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read users file: {}", path.display()));
            }
        };

        let user_count = users.len();
        *self.users.write().await = users;
        tracing::info!(user_count = %user_count, "Users loaded for password authentication");
        Ok(())
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    async fn verify(&self, username: &str, password: &Zeroizing<String>) -> Result<Identity, LoginFailure> {
        let users = self.users.read().await;

        let Some(user) = users.get(username) else {
            let _ = verify_argon2(password.as_bytes(), &self.dummy_hash);
            tracing::debug!(user = %username, "Password login failed: user not found");
            return Err(LoginFailure::InvalidCredential);
        };

        let hash = &user.password_hash;
        let verified = if hash.starts_with("$argon2") {
            verify_argon2(password.as_bytes(), hash)
        } else if hash.starts_with("$2") {
            bcrypt::verify(password.as_str(), hash).map_err(|e| e.to_string())
        } else {
            Err("unknown password hash format".to_string())
        };

        match verified {
            Ok(true) => Ok(Identity::new(&user.name).with_gids(user.gids.iter().copied())),
            Ok(false) => {
                tracing::debug!(user = %username, "Password login failed: incorrect password");
                Err(LoginFailure::InvalidCredential)
            }
            Err(e) => {
                tracing::warn!(user = %username, error = %e, "Stored password hash is unusable");
                Err(LoginFailure::InvalidCredential)
            }
        }
    }
}

#[async_trait]
impl IdentityBackend for UsersFileBackend {
    async fn login(&self, request: &LoginRequest) -> Result<Identity, LoginFailure> {
        let Credential::Password { username, secret } = &request.credential else {
            return Err(LoginFailure::Unsupported(request.credential.kind().to_string()));
        };

        let start = Instant::now();
        let result = self.verify(username, secret).await;

        let elapsed = start.elapsed();
        if elapsed < MIN_VERIFY_TIME {
            tokio::time::sleep(MIN_VERIFY_TIME - elapsed).await;
        }

        result
    }
}

fn verify_argon2(password: &[u8], hash: &str) -> Result<bool, String> {
    let hash = PasswordHash::new(hash).map_err(|e| format!("invalid Argon2 hash: {e}"))?;
    match Argon2::default().verify_password(password, &hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(format!("Argon2 verification error: {e}")),
    }
}

/// Generate an Argon2id password hash suitable for the users file.
///
/// # Example
///
/// ```no_run
/// use sshadm::server::auth::hash_password;
///
/// let hash = hash_password("my_secure_password").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::SaltString;

    let salt = SaltString::generate(&mut OsRng);

    // m=19456 KiB, t=2, p=1
    let params = Params::new(19456, 2, 1, None)
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;

    Ok(hash.to_string())
}
