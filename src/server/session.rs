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

//! Per-connection session state and the idle-timeout contract.
//!
//! # Types
//!
//! - [`SessionId`]: Unique identifier for a session
//! - [`SessionState`]: Authentication state machine for one connection
//! - [`IdleTimeout`]: Configured idle timeout with its unit
//! - [`TransportTimeouts`]: Durations handed to the transport layer
//!
//! # Authentication state
//!
//! A session starts unauthenticated and moves to authenticated at most once.
//! The move is a single compare-and-swap, so when the transport calls an
//! authenticator several times for one session (a key probe followed by the
//! signed attempt, or two racing attempts) exactly one caller observes the
//! transition and is responsible for auditing it.
//!
//! # Idle timeout
//!
//! The transport's read timeout is always twice the idle timeout, so a
//! connection is never torn down by the read timer while an idle-triggered
//! keepalive round-trip is still in flight.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::resolver::HostnameResolver;
use crate::shared::endpoint::RemoteEndpoint;
use crate::shared::error::TimeoutError;

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new unique session ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw numeric value of the session ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Authentication state of one connection.
///
/// Shared between the transport handler and the authenticators behind an
/// `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct SessionState {
    id: SessionId,
    remote: RemoteEndpoint,
    resolved: tokio::sync::OnceCell<RemoteEndpoint>,
    created_at: Instant,
    started_at: DateTime<Utc>,
    timeouts: Option<TransportTimeouts>,
    authenticated: AtomicBool,
    username: OnceLock<String>,
    opened: AtomicBool,
    closed: AtomicBool,
}

impl SessionState {
    /// Create state for a newly accepted connection.
    pub fn new(remote: RemoteEndpoint) -> Self {
        Self {
            id: SessionId::new(),
            remote,
            resolved: tokio::sync::OnceCell::new(),
            created_at: Instant::now(),
            started_at: Utc::now(),
            timeouts: None,
            authenticated: AtomicBool::new(false),
            username: OnceLock::new(),
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach the transport timeouts in force for this connection.
    pub fn with_timeouts(mut self, timeouts: TransportTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The peer, including its hostname once [`resolve_remote`] has run.
    ///
    /// [`resolve_remote`]: Self::resolve_remote
    pub fn remote(&self) -> &RemoteEndpoint {
        self.resolved.get().unwrap_or(&self.remote)
    }

    /// Look up the peer's hostname, at most once per session.
    ///
    /// Concurrent callers share a single lookup. An endpoint that already
    /// carries a hostname is kept as is.
    pub async fn resolve_remote(&self, resolver: &dyn HostnameResolver) -> &RemoteEndpoint {
        self.resolved
            .get_or_init(|| async {
                if self.remote.hostname().is_some() {
                    return self.remote.clone();
                }
                match resolver.resolve(self.remote.address()).await {
                    Some(name) => {
                        tracing::debug!(
                            session_id = %self.id,
                            address = %self.remote.address(),
                            hostname = %name,
                            "Resolved peer hostname"
                        );
                        self.remote.clone().with_hostname(name)
                    }
                    None => self.remote.clone(),
                }
            })
            .await
    }

    /// Wall-clock time at which the connection was accepted.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn timeouts(&self) -> Option<&TransportTimeouts> {
        self.timeouts.as_ref()
    }

    /// Seconds since the connection was accepted.
    pub fn duration_secs(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// The authenticated username, once authentication has succeeded.
    pub fn username(&self) -> Option<&str> {
        self.username.get().map(String::as_str)
    }

    /// Move the session to authenticated.
    ///
    /// Returns `true` only for the single call that performed the
    /// transition. Later calls, including concurrent ones, return `false`
    /// and leave the recorded username unchanged.
    pub fn mark_authenticated(&self, username: &str) -> bool {
        let won = self
            .authenticated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if won {
            let _ = self.username.set(username.to_string());
            tracing::debug!(
                session_id = %self.id,
                user = %username,
                "Session authenticated"
            );
        }
        won
    }

    /// Claim the connect event. Returns `true` exactly once.
    pub fn mark_opened(&self) -> bool {
        !self.opened.swap(true, Ordering::AcqRel)
    }

    /// Claim the disconnect event. Returns `true` exactly once.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

/// Unit of a configured timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Number of milliseconds in one unit.
    pub fn millis(self) -> u64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ms" | "millisecond" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            "s" | "sec" | "second" | "seconds" => Ok(TimeUnit::Seconds),
            "m" | "min" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hour" | "hours" => Ok(TimeUnit::Hours),
            "d" | "day" | "days" => Ok(TimeUnit::Days),
            other => Err(format!("unknown time unit: {other}")),
        }
    }
}

/// Configured idle timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleTimeout {
    pub value: u64,
    pub unit: TimeUnit,
}

impl Default for IdleTimeout {
    fn default() -> Self {
        Self {
            value: 300,
            unit: TimeUnit::Seconds,
        }
    }
}

impl IdleTimeout {
    pub fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    /// The transport read timeout: twice the idle timeout, in the same unit.
    pub fn read_timeout(&self) -> Result<IdleTimeout, TimeoutError> {
        let value = self.value.checked_mul(2).ok_or(TimeoutError::Overflow {
            value: self.value,
            unit: self.unit.as_str(),
        })?;
        Ok(IdleTimeout {
            value,
            unit: self.unit,
        })
    }

    /// Convert to a [`Duration`].
    pub fn as_duration(&self) -> Result<Duration, TimeoutError> {
        self.value
            .checked_mul(self.unit.millis())
            .map(Duration::from_millis)
            .ok_or(TimeoutError::Overflow {
                value: self.value,
                unit: self.unit.as_str(),
            })
    }

    /// Check that the timeout is positive and that both it and the derived
    /// read timeout are representable.
    pub fn validate(&self) -> Result<(), TimeoutError> {
        if self.value == 0 {
            return Err(TimeoutError::Zero);
        }
        self.read_timeout()?.as_duration()?;
        Ok(())
    }
}

impl fmt::Display for IdleTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Timeouts handed to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTimeouts {
    /// Close the connection after this long without activity.
    pub idle: Duration,
    /// Read timeout on the underlying socket.
    pub read: Duration,
}

impl TransportTimeouts {
    /// Derive transport timeouts from a validated idle timeout.
    pub fn from_idle(idle: &IdleTimeout) -> Result<Self, TimeoutError> {
        idle.validate()?;
        Ok(Self {
            idle: idle.as_duration()?,
            read: idle.read_timeout()?.as_duration()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn state() -> SessionState {
        SessionState::new(RemoteEndpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))))
    }

    #[test]
    fn test_session_id_uniqueness() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
        assert!(id1.to_string().starts_with("session-"));
    }

    #[test]
    fn test_new_session_is_unauthenticated() {
        let session = state();
        assert!(!session.is_authenticated());
        assert!(session.username().is_none());
        assert!(session.timeouts().is_none());
    }

    #[test]
    fn test_authenticated_transition_happens_once() {
        let session = state();
        assert!(session.mark_authenticated("admin"));
        assert!(!session.mark_authenticated("admin"));
        assert!(!session.mark_authenticated("other"));
        assert!(session.is_authenticated());
        assert_eq!(session.username(), Some("admin"));
    }

    #[test]
    fn test_concurrent_transition_has_single_winner() {
        let session = Arc::new(state());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || session.mark_authenticated(&format!("user{i}")))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(session.username().is_some());
    }

    #[test]
    fn test_open_and_close_claimed_once() {
        let session = state();
        assert!(session.mark_opened());
        assert!(!session.mark_opened());
        assert!(session.mark_closed());
        assert!(!session.mark_closed());
    }

    #[test]
    fn test_read_timeout_is_double_in_same_unit() {
        for unit in [
            TimeUnit::Milliseconds,
            TimeUnit::Seconds,
            TimeUnit::Minutes,
            TimeUnit::Hours,
            TimeUnit::Days,
        ] {
            for value in [1, 7, 30, 1_000] {
                let idle = IdleTimeout::new(value, unit);
                let read = idle.read_timeout().unwrap();
                assert_eq!(read.unit, unit);
                assert_eq!(read.value, value * 2);
                assert_eq!(
                    read.as_duration().unwrap(),
                    idle.as_duration().unwrap() * 2
                );
            }
        }
    }

    #[test]
    fn test_read_timeout_overflow() {
        let idle = IdleTimeout::new(u64::MAX, TimeUnit::Milliseconds);
        assert!(matches!(
            idle.read_timeout(),
            Err(TimeoutError::Overflow { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_and_unrepresentable() {
        assert_eq!(
            IdleTimeout::new(0, TimeUnit::Seconds).validate(),
            Err(TimeoutError::Zero)
        );
        assert!(IdleTimeout::new(u64::MAX / 4, TimeUnit::Days)
            .validate()
            .is_err());
        assert!(IdleTimeout::default().validate().is_ok());
    }

    #[test]
    fn test_transport_timeouts() {
        let timeouts = TransportTimeouts::from_idle(&IdleTimeout::new(5, TimeUnit::Minutes)).unwrap();
        assert_eq!(timeouts.idle, Duration::from_secs(300));
        assert_eq!(timeouts.read, Duration::from_secs(600));
    }

    #[test]
    fn test_time_unit_parsing() {
        assert_eq!("ms".parse::<TimeUnit>().unwrap(), TimeUnit::Milliseconds);
        assert_eq!("Minutes".parse::<TimeUnit>().unwrap(), TimeUnit::Minutes);
        assert!("fortnight".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_idle_timeout_yaml() {
        let idle: IdleTimeout = serde_yaml::from_str("value: 2\nunit: hours\n").unwrap();
        assert_eq!(idle, IdleTimeout::new(2, TimeUnit::Hours));
    }

    struct CountingResolver {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl HostnameResolver for CountingResolver {
        async fn resolve(&self, address: IpAddr) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            (address == IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))).then(|| "ops.example.org".to_string())
        }
    }

    #[tokio::test]
    async fn test_resolve_remote_runs_once() {
        let session = Arc::new(state());
        let resolver = Arc::new(CountingResolver {
            calls: Default::default(),
        });
        assert!(session.remote().hostname().is_none());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let session = Arc::clone(&session);
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                session.resolve_remote(resolver.as_ref()).await.hostname().map(str::to_string)
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Some("ops.example.org"));
        }

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.remote().hostname(), Some("ops.example.org"));
    }

    #[tokio::test]
    async fn test_resolve_remote_keeps_known_hostname() {
        let session = SessionState::new(
            RemoteEndpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))).with_hostname("pinned"),
        );
        let resolver = CountingResolver {
            calls: Default::default(),
        };
        assert_eq!(session.resolve_remote(&resolver).await.hostname(), Some("pinned"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unresolved_peer_has_no_hostname() {
        let session = SessionState::new(RemoteEndpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))));
        let resolver = CountingResolver {
            calls: Default::default(),
        };
        assert!(session.resolve_remote(&resolver).await.hostname().is_none());
        assert_eq!(session.remote().address(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
    }
}
