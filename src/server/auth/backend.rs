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

//! Identity backend seam used by password authentication.
//!
//! The backend maps a credential, tagged with the origin address of the
//! connection, to a resolved [`Identity`] or a [`LoginFailure`].

use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use russh::keys::ssh_key::PublicKey;
use zeroize::Zeroizing;

use crate::shared::error::LoginFailure;

/// A credential presented by a client.
#[derive(Clone)]
pub enum Credential {
    Password {
        username: String,
        secret: Zeroizing<String>,
    },
    PublicKey {
        username: String,
        key: PublicKey,
    },
}

impl Credential {
    pub fn password(username: impl Into<String>, secret: &str) -> Self {
        Credential::Password {
            username: username.into(),
            secret: Zeroizing::new(secret.to_string()),
        }
    }

    pub fn public_key(username: impl Into<String>, key: PublicKey) -> Self {
        Credential::PublicKey {
            username: username.into(),
            key,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Credential::Password { username, .. } | Credential::PublicKey { username, .. } => {
                username
            }
        }
    }

    /// Short name of the credential kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Password { .. } => "password",
            Credential::PublicKey { .. } => "publickey",
        }
    }

    /// Attach the connection's origin address.
    pub fn with_origin(self, origin: IpAddr) -> LoginRequest {
        LoginRequest {
            credential: self,
            origin: Some(origin),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("secret", &"<redacted>")
                .finish(),
            Credential::PublicKey { username, key } => f
                .debug_struct("PublicKey")
                .field("username", username)
                .field("algorithm", &key.algorithm().as_str())
                .finish(),
        }
    }
}

/// A credential with its origin, as handed to the backend.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub credential: Credential,
    pub origin: Option<IpAddr>,
}

impl From<Credential> for LoginRequest {
    fn from(credential: Credential) -> Self {
        Self {
            credential,
            origin: None,
        }
    }
}

/// A principal resolved by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    principal: String,
    gids: Vec<u32>,
}

impl Identity {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            gids: Vec::new(),
        }
    }

    pub fn with_gid(mut self, gid: u32) -> Self {
        if !self.gids.contains(&gid) {
            self.gids.push(gid);
        }
        self
    }

    pub fn with_gids(mut self, gids: impl IntoIterator<Item = u32>) -> Self {
        for gid in gids {
            self = self.with_gid(gid);
        }
        self
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn gids(&self) -> &[u32] {
        &self.gids
    }

    /// Whether the identity is a member of the given group.
    pub fn has_gid(&self, gid: u32) -> bool {
        self.gids.contains(&gid)
    }
}

/// External login service.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Verify a credential and resolve the identity behind it.
    async fn login(&self, request: &LoginRequest) -> Result<Identity, LoginFailure>;
}
