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

//! Authentication for administrative SSH sessions.
//!
//! # Architecture
//!
//! - [`AuthorizedEntryStore`]: reads the authorized-credentials list
//! - [`PublicKeyAuthenticator`]: matches offered keys against that list,
//!   honoring each entry's `from=` host restriction
//! - [`PasswordAuthenticator`]: verifies passwords through an
//!   [`IdentityBackend`] and requires admin-group membership
//! - [`UsersFileBackend`]: YAML-backed [`IdentityBackend`] with Argon2id and
//!   bcrypt hashes
//!
//! Both authenticators share the same discipline: the session's
//! authenticated flag is flipped with a single compare-and-swap, and only
//! the caller that flips it records the successful login.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sshadm::server::audit::LoginAuditor;
//! use sshadm::server::auth::{
//!     AuthorizedEntryStore, PasswordAuthenticator, PublicKeyAuthenticator, UsersFileBackend,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let auditor = LoginAuditor::new();
//! let publickey = PublicKeyAuthenticator::new(
//!     AuthorizedEntryStore::new("/etc/sshadm/authorized_keys"),
//!     auditor.clone(),
//! );
//! let backend = Arc::new(UsersFileBackend::from_file("/etc/sshadm/users.yaml").await?);
//! let password = PasswordAuthenticator::new(backend, 0, auditor);
//! # Ok(())
//! # }
//! ```

pub mod authorized_keys;
pub mod backend;
pub mod password;
pub mod publickey;
pub mod users_file;

pub use authorized_keys::{AuthorizedEntry, AuthorizedEntryStore, AuthorizedLine, AuthorizedList};
pub use backend::{Credential, Identity, IdentityBackend, LoginRequest};
pub use password::{PasswordAuthenticator, NOT_IN_ADMIN_GROUP};
pub use publickey::{PublicKeyAuthenticator, KEYS_UNAVAILABLE, KEY_NOT_AUTHORIZED};
pub use users_file::{hash_password, UserEntry, UsersFileBackend};
