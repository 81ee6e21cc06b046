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

//! Audit logging for administrative access.
//!
//! # Overview
//!
//! - [`LoginAuditor`]: emits login, connect and disconnect records
//! - [`AuditEvent`]: the structured record handed to exporters
//! - [`AuditExporter`]: destination trait, with [`NullExporter`],
//!   [`MemoryExporter`] and [`FileExporter`] implementations
//!
//! Every record is also emitted as a `tracing` event on the
//! [`ACCESS_LOG_TARGET`] target, at `info` for successes and lifecycle
//! events and at `warn` for refused logins.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sshadm::server::audit::{LoginAuditor, MemoryExporter};
//! use sshadm::server::session::SessionState;
//! use sshadm::shared::RemoteEndpoint;
//!
//! # async fn example() {
//! let memory = MemoryExporter::new();
//! let auditor = LoginAuditor::new().with_exporter(Arc::new(memory.clone()));
//!
//! let session = SessionState::new(RemoteEndpoint::from_socket("10.0.0.1:5000".parse().unwrap()));
//! auditor.session_opened(&session).await;
//! auditor.session_closed(&session).await;
//! assert_eq!(memory.len().await, 2);
//! # }
//! ```

pub mod event;
pub mod exporter;
pub mod file;

use std::sync::Arc;

use anyhow::Result;

pub use event::{AuditEvent, EventType, LoginAttempt, LoginMethod};
pub use exporter::{AuditExporter, MemoryExporter, NullExporter};
pub use file::FileExporter;

use crate::server::session::SessionState;

/// `tracing` target carrying access records.
pub const ACCESS_LOG_TARGET: &str = "sshadm::access";

/// Emits audit records for authentication attempts and connection
/// lifecycle events.
///
/// The auditor is cheap to clone; clones share the same exporters.
/// Exporter failures are logged and never propagate to the caller.
#[derive(Clone, Default)]
pub struct LoginAuditor {
    exporters: Vec<Arc<dyn AuditExporter>>,
}

impl std::fmt::Debug for LoginAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAuditor")
            .field("exporters", &self.exporters.len())
            .finish()
    }
}

impl LoginAuditor {
    /// Create an auditor that only writes to the `tracing` access target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exporter.
    pub fn with_exporter(mut self, exporter: Arc<dyn AuditExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    pub fn exporter_count(&self) -> usize {
        self.exporters.len()
    }

    /// Record one login attempt.
    ///
    /// Callers decide whether an attempt is worth recording; this method
    /// emits exactly one record per call.
    pub async fn login(&self, session: &SessionState, attempt: LoginAttempt) {
        let remote_socket = attempt.remote.socket_description();
        if attempt.successful {
            tracing::info!(
                target: ACCESS_LOG_TARGET,
                event = "login",
                session_id = %session.id(),
                username = %attempt.username,
                remote_socket = %remote_socket,
                method = %attempt.method,
                successful = true,
                "Login"
            );
        } else {
            tracing::warn!(
                target: ACCESS_LOG_TARGET,
                event = "login",
                session_id = %session.id(),
                username = %attempt.username,
                remote_socket = %remote_socket,
                method = %attempt.method,
                successful = false,
                reason = attempt.reason.as_deref().unwrap_or(""),
                "Login"
            );
        }

        self.dispatch(AuditEvent::login(&attempt, session.id().to_string()))
            .await;
    }

    /// Record that a connection was accepted. Emits at most once per session.
    pub async fn session_opened(&self, session: &SessionState) {
        if session.mark_opened() {
            self.lifecycle(EventType::Connect, session).await;
        }
    }

    /// Record that a connection closed. Emits at most once per session.
    pub async fn session_closed(&self, session: &SessionState) {
        if session.mark_closed() {
            self.lifecycle(EventType::Disconnect, session).await;
        }
    }

    async fn lifecycle(&self, event_type: EventType, session: &SessionState) {
        let event = AuditEvent::lifecycle(event_type, session);
        tracing::info!(
            target: ACCESS_LOG_TARGET,
            event = %event_type,
            session_id = %session.id(),
            username = event.username.as_deref().unwrap_or(""),
            remote_socket = %event.remote_socket,
            "Connection {}", event_type
        );
        self.dispatch(event).await;
    }

    async fn dispatch(&self, event: AuditEvent) {
        for exporter in &self.exporters {
            if let Err(e) = exporter.export(event.clone()).await {
                tracing::error!(
                    error = %e,
                    event_id = %event.id,
                    "Failed to export audit event"
                );
            }
        }
    }

    /// Flush all exporters, returning the first error after trying each.
    pub async fn flush(&self) -> Result<()> {
        let mut first_error = None;
        for exporter in &self.exporters {
            if let Err(e) = exporter.flush().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Close all exporters, returning the first error after trying each.
    pub async fn close(&self) -> Result<()> {
        let mut first_error = None;
        for exporter in &self.exporters {
            if let Err(e) = exporter.close().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
