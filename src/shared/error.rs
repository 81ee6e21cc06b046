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

//! Error types shared across the access-control components.
//!
//! # Error Categories
//!
//! - [`EntryParseError`]: one authorized-credentials line could not be used
//! - [`LoginFailure`]: the identity backend refused a credential
//! - [`TimeoutError`]: idle-timeout configuration is unusable

use thiserror::Error;

/// Errors produced while parsing or decoding one authorized-credentials line.
///
/// These never abort a scan; the offending line is logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryParseError {
    #[error("missing key data")]
    MissingKeyData,

    #[error("unterminated quote in options")]
    UnterminatedQuote,

    #[error("from= option given more than once")]
    DuplicateFrom,

    #[error("invalid {algorithm} key material: {reason}")]
    InvalidKey { algorithm: String, reason: String },

    #[error("declared key type '{declared}' does not match encoded type '{actual}'")]
    AlgorithmMismatch { declared: String, actual: String },
}

/// Reasons an identity backend refuses a login.
///
/// The message text ends up in the audit record's `reason` field and is
/// never sent to the remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginFailure {
    /// Wrong password, unknown user, or an unusable credential.
    #[error("invalid credential")]
    InvalidCredential,

    /// The backend does not handle this kind of credential.
    #[error("unsupported credential type: {0}")]
    Unsupported(String),

    /// The backend could not reach a decision.
    #[error("login backend unavailable: {0}")]
    Unavailable(String),
}

/// Invalid idle-timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutError {
    #[error("idle timeout must be greater than zero")]
    Zero,

    #[error("idle timeout of {value} {unit} is too large to derive a read timeout")]
    Overflow { value: u64, unit: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_failure_messages_are_distinct() {
        let invalid = LoginFailure::InvalidCredential.to_string();
        let unavailable = LoginFailure::Unavailable("connection refused".into()).to_string();
        assert_ne!(invalid, unavailable);
        assert!(unavailable.contains("connection refused"));
    }

    #[test]
    fn test_entry_parse_error_display() {
        let err = EntryParseError::AlgorithmMismatch {
            declared: "ssh-rsa".into(),
            actual: "ssh-ed25519".into(),
        };
        assert!(err.to_string().contains("ssh-rsa"));
        assert!(err.to_string().contains("ssh-ed25519"));
    }
}
