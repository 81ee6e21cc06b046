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

//! Host access policy for authorized entries.
//!
//! [`evaluate`] decides whether a remote endpoint may use an entry given the
//! entry's optional restriction clause:
//!
//! - no restriction: always allowed
//! - otherwise each pattern yields [`Outcome::Allow`], [`Outcome::Deny`] or
//!   [`Outcome::Defer`], and the endpoint is allowed only if some pattern
//!   allowed it and none denied it
//!
//! A clause in which every pattern defers is a denial.
//!
//! # Example
//!
//! ```
//! use sshadm::server::security::{evaluate, HostRestriction};
//! use sshadm::shared::RemoteEndpoint;
//!
//! let restriction = HostRestriction::parse("10.0.0.0/8,!10.0.1.5");
//! let inside = RemoteEndpoint::new("10.0.2.7".parse().unwrap());
//! let excluded = RemoteEndpoint::new("10.0.1.5".parse().unwrap());
//!
//! assert!(evaluate(Some(&restriction), &inside));
//! assert!(!evaluate(Some(&restriction), &excluded));
//! assert!(evaluate(None, &excluded));
//! ```

use super::host_pattern::{HostRestriction, Outcome};
use crate::shared::endpoint::RemoteEndpoint;

/// Evaluate an optional restriction against a remote endpoint.
pub fn evaluate(restriction: Option<&HostRestriction>, remote: &RemoteEndpoint) -> bool {
    let Some(restriction) = restriction else {
        return true;
    };

    let (saw_allow, saw_deny) = restriction
        .patterns()
        .map(|pattern| {
            let outcome = pattern.evaluate(remote);
            tracing::trace!(
                pattern = %pattern,
                remote = %remote,
                outcome = ?outcome,
                "Evaluated host pattern"
            );
            outcome
        })
        .fold((false, false), |(allow, deny), outcome| match outcome {
            Outcome::Allow => (true, deny),
            Outcome::Deny => (allow, true),
            Outcome::Defer => (allow, deny),
        });

    let permitted = saw_allow && !saw_deny;
    if !permitted {
        tracing::debug!(
            restriction = %restriction,
            remote = %remote,
            denied_by_negation = saw_deny,
            "Remote host not permitted by restriction"
        );
    }
    permitted
}
