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

//! Public key authentication against the authorized-credentials list.
//!
//! For every attempt the list is re-read and scanned in file order. Each
//! line's `from=` restriction is evaluated against the remote endpoint
//! first; only lines that pass are key-decoded and compared with the
//! presented key.
//!
//! The SSH transport asks about a key twice: once when the client offers it
//! ([`PublicKeyAuthenticator::probe`]) and again after the client proves
//! possession with a signature ([`PublicKeyAuthenticator::authenticate`]).
//! Only `authenticate` moves the session to authenticated, and a success is
//! audited only by the call that performed that transition.

use anyhow::Result;
use russh::keys::ssh_key::PublicKey;

use super::authorized_keys::{decode_logged, AuthorizedEntryStore};
use crate::server::audit::{LoginAttempt, LoginAuditor, LoginMethod};
use crate::server::security;
use crate::server::session::SessionState;
use crate::shared::endpoint::RemoteEndpoint;

/// Audit reason when no permitted entry carries the presented key.
pub const KEY_NOT_AUTHORIZED: &str = "key not authorized";

/// Audit reason when the authorized list could not be read.
pub const KEYS_UNAVAILABLE: &str = "authorized keys unavailable";

/// Authenticates public keys against an [`AuthorizedEntryStore`].
pub struct PublicKeyAuthenticator {
    store: AuthorizedEntryStore,
    auditor: LoginAuditor,
}

impl PublicKeyAuthenticator {
    pub fn new(store: AuthorizedEntryStore, auditor: LoginAuditor) -> Self {
        Self { store, auditor }
    }

    pub fn store(&self) -> &AuthorizedEntryStore {
        &self.store
    }

    /// Authenticate a verified key for the given session.
    pub async fn authenticate(&self, username: &str, key: &PublicKey, session: &SessionState) -> bool {
        let remote = session.remote();
        let method = LoginMethod::public_key(key);

        match self.find_match(key, remote).await {
            Ok(true) => {
                if session.mark_authenticated(username) {
                    self.auditor
                        .login(session, LoginAttempt::success(username, remote, method))
                        .await;
                }
                true
            }
            Ok(false) => {
                self.audit_failure(username, session, method, KEY_NOT_AUTHORIZED)
                    .await;
                false
            }
            Err(e) => {
                tracing::error!(
                    path = %self.store.path().display(),
                    error = %e,
                    "Failed to read authorized keys"
                );
                self.audit_failure(username, session, method, KEYS_UNAVAILABLE)
                    .await;
                false
            }
        }
    }

    /// Check whether an offered key would be accepted, without changing
    /// session state. Refusals are audited; acceptance is not, since the
    /// signed attempt that follows is audited by [`Self::authenticate`].
    pub async fn probe(&self, username: &str, key: &PublicKey, session: &SessionState) -> bool {
        let remote = session.remote();

        match self.find_match(key, remote).await {
            Ok(true) => true,
            Ok(false) => {
                self.audit_failure(username, session, LoginMethod::public_key(key), KEY_NOT_AUTHORIZED)
                    .await;
                false
            }
            Err(e) => {
                tracing::error!(
                    path = %self.store.path().display(),
                    error = %e,
                    "Failed to read authorized keys"
                );
                self.audit_failure(username, session, LoginMethod::public_key(key), KEYS_UNAVAILABLE)
                    .await;
                false
            }
        }
    }

    /// Scan the list for a permitted entry carrying `key`.
    async fn find_match(&self, key: &PublicKey, remote: &RemoteEndpoint) -> Result<bool> {
        let list = self.store.load().await?;

        let matched = list
            .lines()
            .filter(|line| security::evaluate(line.restriction(), remote))
            .filter_map(|line| decode_logged(&line))
            .any(|entry| entry.matches_key(key));

        tracing::debug!(
            key_type = %key.algorithm(),
            remote = %remote,
            matched,
            "Scanned authorized keys"
        );
        Ok(matched)
    }

    async fn audit_failure(
        &self,
        username: &str,
        session: &SessionState,
        method: LoginMethod,
        reason: &str,
    ) {
        if session.is_authenticated() {
            return;
        }
        self.auditor
            .login(
                session,
                LoginAttempt::failure(username, session.remote(), method, Some(reason.to_string())),
            )
            .await;
    }
}
