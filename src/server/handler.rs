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

//! SSH handler implementation for the russh server.
//!
//! One [`AdminHandler`] exists per accepted connection. It owns the
//! connection's [`SessionState`] and routes the authentication callbacks to
//! the public key and password authenticators. Interactive channels are
//! refused.
//!
//! Live handlers and the tasks writing their connect and disconnect records
//! are tracked in [`AccessServices::sessions`], so shutdown can wait for
//! every record to land before the audit exporters are closed.

use std::sync::Arc;
use std::time::Duration;

use russh::keys::ssh_key;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, MethodKind, MethodSet};
use tokio::task::JoinHandle;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use zeroize::Zeroizing;

use super::audit::LoginAuditor;
use super::auth::{
    AuthorizedEntryStore, IdentityBackend, PasswordAuthenticator, PublicKeyAuthenticator,
};
use super::config::ServerConfig;
use super::resolver::{HostnameResolver, NoResolver};
use super::session::SessionState;

/// Everything a handler needs that is shared across connections.
pub struct AccessServices {
    pub config: Arc<ServerConfig>,
    pub publickey: PublicKeyAuthenticator,
    pub password: PasswordAuthenticator,
    pub auditor: LoginAuditor,
    pub resolver: Arc<dyn HostnameResolver>,
    /// Open handlers and their pending lifecycle records.
    pub sessions: TaskTracker,
}

impl AccessServices {
    /// Wire the authenticators for `config`. Hostnames are not resolved
    /// until a resolver is attached with [`with_resolver`](Self::with_resolver).
    pub fn new(config: ServerConfig, backend: Arc<dyn IdentityBackend>, auditor: LoginAuditor) -> Self {
        let store = AuthorizedEntryStore::new(config.authorized_keys.clone());
        Self {
            publickey: PublicKeyAuthenticator::new(store, auditor.clone()),
            password: PasswordAuthenticator::new(backend, config.admin_gid, auditor.clone()),
            config: Arc::new(config),
            auditor,
            resolver: Arc::new(NoResolver),
            sessions: TaskTracker::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostnameResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Wait until every handler is gone and every lifecycle record written.
    ///
    /// Returns `false` if `grace` elapses first. Handlers created afterwards
    /// are still tracked, but a later call returns as soon as the set is
    /// empty.
    pub async fn drain_sessions(&self, grace: Duration) -> bool {
        self.sessions.close();
        let drained = tokio::time::timeout(grace, self.sessions.wait()).await.is_ok();
        if !drained {
            tracing::warn!(
                pending = self.sessions.len(),
                grace_ms = grace.as_millis() as u64,
                "Sessions still open after shutdown grace period"
            );
        }
        drained
    }
}

/// SSH handler for a single client connection.
pub struct AdminHandler {
    session: Arc<SessionState>,
    services: Arc<AccessServices>,
    auth_attempts: u32,
    /// Task emitting the connect record; awaited before disconnect is emitted.
    opened: Option<JoinHandle<()>>,
    _tracked: TaskTrackerToken,
}

impl AdminHandler {
    /// Create a handler without emitting any lifecycle records.
    pub fn new(session: Arc<SessionState>, services: Arc<AccessServices>) -> Self {
        let tracked = services.sessions.token();
        Self {
            session,
            services,
            auth_attempts: 0,
            opened: None,
            _tracked: tracked,
        }
    }

    /// Create a handler, then resolve the peer's hostname and emit the
    /// connect record in the background.
    pub fn open(session: Arc<SessionState>, services: Arc<AccessServices>) -> Self {
        let mut handler = Self::new(session, services);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let session = Arc::clone(&handler.session);
            let services = Arc::clone(&handler.services);
            handler.opened = Some(handler.services.sessions.spawn_on(
                async move {
                    session.resolve_remote(services.resolver.as_ref()).await;
                    services.auditor.session_opened(&session).await;
                },
                &runtime,
            ));
        }
        handler
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn auth_attempts(&self) -> u32 {
        self.auth_attempts
    }

    fn allowed_methods(&self) -> MethodSet {
        let mut methods = MethodSet::empty();

        if self.services.config.allow_publickey_auth {
            methods.push(MethodKind::PublicKey);
        }
        if self.services.config.allow_password_auth {
            methods.push(MethodKind::Password);
        }

        methods
    }

    /// Count an attempt and report whether the per-connection limit is hit.
    fn register_attempt(&mut self) -> bool {
        self.auth_attempts = self.auth_attempts.saturating_add(1);
        self.auth_attempts > self.services.config.max_auth_attempts
    }

    fn reject(&self) -> Auth {
        let methods = self.allowed_methods();
        Auth::Reject {
            proceed_with_methods: if methods.is_empty() {
                None
            } else {
                Some(methods)
            },
            partial_success: false,
        }
    }

    fn reject_final() -> Auth {
        Auth::Reject {
            proceed_with_methods: None,
            partial_success: false,
        }
    }
}

impl russh::server::Handler for AdminHandler {
    type Error = anyhow::Error;

    /// Always rejects and advertises available authentication methods.
    fn auth_none(
        &mut self,
        user: &str,
    ) -> impl std::future::Future<Output = Result<Auth, Self::Error>> + Send {
        tracing::debug!(
            user = %user,
            session_id = %self.session.id(),
            remote = %self.session.remote(),
            "Auth none attempt"
        );

        let auth = self.reject();
        async move { Ok(auth) }
    }

    /// Answer whether a key the client offers would be accepted.
    fn auth_publickey_offered(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> impl std::future::Future<Output = Result<Auth, Self::Error>> + Send {
        let exceeded = self.register_attempt();
        let enabled = self.services.config.allow_publickey_auth;
        let rejection = self.reject();
        let services = Arc::clone(&self.services);
        let session = Arc::clone(&self.session);
        let user = user.to_string();
        let key = public_key.clone();

        async move {
            if exceeded {
                tracing::warn!(
                    session_id = %session.id(),
                    remote = %session.remote(),
                    "Max authentication attempts exceeded"
                );
                return Ok(Self::reject_final());
            }
            if !enabled {
                return Ok(rejection);
            }
            session.resolve_remote(services.resolver.as_ref()).await;

            if services.publickey.probe(&user, &key, &session).await {
                Ok(Auth::Accept)
            } else {
                Ok(rejection)
            }
        }
    }

    /// Handle a signed public key authentication request.
    fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> impl std::future::Future<Output = Result<Auth, Self::Error>> + Send {
        tracing::debug!(
            user = %user,
            session_id = %self.session.id(),
            key_type = %public_key.algorithm(),
            "Public key authentication attempt"
        );

        let exceeded = self.register_attempt();
        let enabled = self.services.config.allow_publickey_auth;
        let rejection = self.reject();
        let services = Arc::clone(&self.services);
        let session = Arc::clone(&self.session);
        let user = user.to_string();
        let key = public_key.clone();

        async move {
            if exceeded {
                tracing::warn!(
                    session_id = %session.id(),
                    remote = %session.remote(),
                    "Max authentication attempts exceeded"
                );
                return Ok(Self::reject_final());
            }
            if !enabled {
                return Ok(rejection);
            }
            session.resolve_remote(services.resolver.as_ref()).await;

            if services.publickey.authenticate(&user, &key, &session).await {
                Ok(Auth::Accept)
            } else {
                Ok(rejection)
            }
        }
    }

    fn auth_password(
        &mut self,
        user: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Auth, Self::Error>> + Send {
        tracing::debug!(
            user = %user,
            session_id = %self.session.id(),
            "Password authentication attempt"
        );

        let exceeded = self.register_attempt();
        let enabled = self.services.config.allow_password_auth;
        let rejection = self.reject();
        let services = Arc::clone(&self.services);
        let session = Arc::clone(&self.session);
        let user = user.to_string();
        let password = Zeroizing::new(password.to_string());

        async move {
            if exceeded {
                tracing::warn!(
                    session_id = %session.id(),
                    remote = %session.remote(),
                    "Max authentication attempts exceeded"
                );
                return Ok(Self::reject_final());
            }
            if !enabled {
                return Ok(rejection);
            }
            session.resolve_remote(services.resolver.as_ref()).await;

            if services
                .password
                .authenticate(&user, &password, &session)
                .await
            {
                Ok(Auth::Accept)
            } else {
                Ok(rejection)
            }
        }
    }

    /// The admin shell is not served here; every session channel is refused.
    fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> impl std::future::Future<Output = Result<bool, Self::Error>> + Send {
        tracing::debug!(
            session_id = %self.session.id(),
            user = self.session.username().unwrap_or(""),
            "Refusing session channel"
        );
        async { Ok(false) }
    }
}

impl Drop for AdminHandler {
    fn drop(&mut self) {
        tracing::info!(
            session_id = %self.session.id(),
            remote = %self.session.remote(),
            duration_secs = %self.session.duration_secs(),
            authenticated = %self.session.is_authenticated(),
            "Session ended"
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(
                session_id = %self.session.id(),
                "No runtime available, disconnect record not emitted"
            );
            return;
        };

        let session = Arc::clone(&self.session);
        let auditor = self.services.auditor.clone();
        let opened = self.opened.take();
        self.services.sessions.spawn_on(
            async move {
                if let Some(opened) = opened {
                    let _ = opened.await;
                }
                auditor.session_opened(&session).await;
                auditor.session_closed(&session).await;
            },
            &runtime,
        );
    }
}
