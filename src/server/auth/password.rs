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

//! Password authentication for administrative sessions.
//!
//! The credential is tagged with the connection's origin address and handed
//! to an [`IdentityBackend`]. A login succeeds only if the backend accepts
//! the credential and the resolved identity belongs to the configured
//! administrative group. The two refusal causes are audited with different
//! reasons; the client only ever sees a plain failure.

use std::sync::Arc;

use super::backend::{Credential, IdentityBackend};
use crate::server::audit::{LoginAttempt, LoginAuditor, LoginMethod};
use crate::server::session::SessionState;

/// Audit reason for a valid credential whose identity lacks the admin group.
pub const NOT_IN_ADMIN_GROUP: &str = "not member of admin group";

/// Authenticates passwords through an identity backend.
pub struct PasswordAuthenticator {
    backend: Arc<dyn IdentityBackend>,
    admin_gid: u32,
    auditor: LoginAuditor,
}

impl PasswordAuthenticator {
    pub fn new(backend: Arc<dyn IdentityBackend>, admin_gid: u32, auditor: LoginAuditor) -> Self {
        Self {
            backend,
            admin_gid,
            auditor,
        }
    }

    pub fn admin_gid(&self) -> u32 {
        self.admin_gid
    }

    /// Authenticate `username` with `password` for the given session.
    ///
    /// On success the session is moved to authenticated; the success is
    /// audited only by the call that performed that transition. Failures are
    /// audited unless the session is already authenticated.
    pub async fn authenticate(&self, username: &str, password: &str, session: &SessionState) -> bool {
        let remote = session.remote();
        let request = Credential::password(username, password).with_origin(remote.address());

        let refusal = match self.backend.login(&request).await {
            Ok(identity) if identity.has_gid(self.admin_gid) => None,
            Ok(identity) => {
                tracing::warn!(
                    user = %username,
                    principal = %identity.principal(),
                    admin_gid = self.admin_gid,
                    remote = %remote,
                    "Password accepted but identity is not in the admin group"
                );
                Some(NOT_IN_ADMIN_GROUP.to_string())
            }
            Err(failure) => {
                tracing::debug!(
                    user = %username,
                    remote = %remote,
                    error = %failure,
                    "Password rejected by login backend"
                );
                Some(failure.to_string())
            }
        };

        match refusal {
            None => {
                if session.mark_authenticated(username) {
                    self.auditor
                        .login(
                            session,
                            LoginAttempt::success(username, remote, LoginMethod::Password),
                        )
                        .await;
                }
                true
            }
            Some(reason) => {
                if !session.is_authenticated() {
                    self.auditor
                        .login(
                            session,
                            LoginAttempt::failure(
                                username,
                                remote,
                                LoginMethod::Password,
                                Some(reason),
                            ),
                        )
                        .await;
                }
                false
            }
        }
    }
}
