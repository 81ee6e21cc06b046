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

//! Audit event types for administrative access.
//!
//! Three kinds of record are produced: `login` for every meaningful
//! authentication attempt, and `connect`/`disconnect` once per connection.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use russh::keys::ssh_key::{HashAlg, PublicKey};
use serde::{Deserialize, Serialize};

use crate::server::session::SessionState;
use crate::shared::endpoint::RemoteEndpoint;

/// Audit record for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier
    pub id: String,

    /// Timestamp when the event occurred
    pub timestamp: DateTime<Utc>,

    /// Type of event
    pub event_type: EventType,

    /// Session ID associated with this event
    pub session_id: String,

    /// Username, when one is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Remote socket description, `hostname/address:port`
    pub remote_socket: String,

    /// Literal client address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,

    /// Authentication method (login events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Whether the login succeeded (login events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful: Option<bool>,

    /// Why a login was refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Type of audit event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Authentication attempt
    Login,
    /// Connection accepted
    Connect,
    /// Connection closed
    Disconnect,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Login => "login",
            EventType::Connect => "connect",
            EventType::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuditEvent {
    /// Create a new audit event for a session.
    ///
    /// # Example
    ///
    /// ```
    /// use sshadm::server::audit::{AuditEvent, EventType};
    /// use sshadm::shared::RemoteEndpoint;
    ///
    /// let remote = RemoteEndpoint::from_socket("10.0.0.1:40022".parse().unwrap());
    /// let event = AuditEvent::new(EventType::Connect, "session-1".to_string(), &remote)
    ///     .with_username("admin");
    /// assert_eq!(event.remote_socket, "10.0.0.1:40022");
    /// ```
    pub fn new(event_type: EventType, session_id: String, remote: &RemoteEndpoint) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            session_id,
            username: None,
            remote_socket: remote.socket_description(),
            client_ip: Some(remote.address()),
            method: None,
            successful: None,
            reason: None,
        }
    }

    /// Create a connect or disconnect event from session state.
    pub fn lifecycle(event_type: EventType, session: &SessionState) -> Self {
        let mut event = Self::new(event_type, session.id().to_string(), session.remote());
        event.username = session.username().map(str::to_string);
        event
    }

    /// Create a login event from an attempt.
    pub fn login(attempt: &LoginAttempt, session_id: String) -> Self {
        let mut event = Self::new(EventType::Login, session_id, &attempt.remote);
        event.timestamp = attempt.timestamp;
        event.username = Some(attempt.username.clone());
        event.method = Some(attempt.method.to_string());
        event.successful = Some(attempt.successful);
        event.reason = attempt.reason.clone();
        event
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// How a login was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginMethod {
    /// Public key, identified by algorithm and SHA-256 fingerprint.
    PublicKey {
        algorithm: String,
        fingerprint: String,
    },
    Password,
}

impl LoginMethod {
    pub fn public_key(key: &PublicKey) -> Self {
        LoginMethod::PublicKey {
            algorithm: key.algorithm().as_str().to_string(),
            fingerprint: key.fingerprint(HashAlg::Sha256).to_string(),
        }
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginMethod::PublicKey {
                algorithm,
                fingerprint,
            } => write!(f, "PublicKey ({algorithm} {fingerprint})"),
            LoginMethod::Password => f.write_str("Password"),
        }
    }
}

/// One authentication attempt as seen by the auditor.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub username: String,
    pub remote: RemoteEndpoint,
    pub method: LoginMethod,
    pub successful: bool,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LoginAttempt {
    pub fn success(username: &str, remote: &RemoteEndpoint, method: LoginMethod) -> Self {
        Self {
            username: username.to_string(),
            remote: remote.clone(),
            method,
            successful: true,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        username: &str,
        remote: &RemoteEndpoint,
        method: LoginMethod,
        reason: Option<String>,
    ) -> Self {
        Self {
            username: username.to_string(),
            remote: remote.clone(),
            method,
            successful: false,
            reason,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";

    fn remote() -> RemoteEndpoint {
        RemoteEndpoint::from_socket("192.0.2.10:51000".parse().unwrap())
    }

    #[test]
    fn test_public_key_method_format() {
        let key = russh::keys::parse_public_key_base64(KEY).unwrap();
        let method = LoginMethod::public_key(&key).to_string();
        assert!(method.starts_with("PublicKey (ssh-ed25519 SHA256:"));
        assert!(method.ends_with(')'));
    }

    #[test]
    fn test_password_method_format() {
        assert_eq!(LoginMethod::Password.to_string(), "Password");
    }

    #[test]
    fn test_login_event_fields() {
        let attempt = LoginAttempt::failure(
            "admin",
            &remote(),
            LoginMethod::Password,
            Some("invalid credential".into()),
        );
        let event = AuditEvent::login(&attempt, "session-9".into());

        assert_eq!(event.event_type, EventType::Login);
        assert_eq!(event.username.as_deref(), Some("admin"));
        assert_eq!(event.method.as_deref(), Some("Password"));
        assert_eq!(event.successful, Some(false));
        assert_eq!(event.reason.as_deref(), Some("invalid credential"));
        assert_eq!(event.remote_socket, "192.0.2.10:51000");
        assert_eq!(event.timestamp, attempt.timestamp);
    }

    #[test]
    fn test_lifecycle_event_omits_login_fields() {
        let session = SessionState::new(remote());
        let event = AuditEvent::lifecycle(EventType::Connect, &session);
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"event_type\":\"connect\""));
        assert!(!json.contains("username"));
        assert!(!json.contains("successful"));
        assert!(!json.contains("method"));
    }

    #[test]
    fn test_event_json_roundtrip() {
        let event = AuditEvent::new(EventType::Disconnect, "session-1".into(), &remote())
            .with_username("admin")
            .with_reason("closed by peer");
        let json = serde_json::to_string(&event).unwrap();
        let back: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.username.as_deref(), Some("admin"));
        assert_eq!(back.client_ip, Some("192.0.2.10".parse().unwrap()));
    }
}
