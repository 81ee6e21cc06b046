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

//! Authorized-credentials list for administrative public key login.
//!
//! # Format
//!
//! One entry per line, in the OpenSSH `authorized_keys` style:
//!
//! ```text
//! # Comment line
//! ssh-ed25519 AAAAC3NzaC1lZDI1NTE5... admin@workstation
//! from="10.0.0.0/8,!10.0.1.5" ssh-ed25519 AAAAC3NzaC1lZDI1NTE5... ops@bastion
//! from="*.example.org",no-pty ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABgQ...
//! ```
//!
//! Only the `from=` option is interpreted; other options are accepted and
//! ignored. Blank lines and lines whose first non-blank character is `#`
//! are skipped.
//!
//! # Loading
//!
//! [`AuthorizedEntryStore::load`] reads the backing file fresh on every call
//! so edits take effect without a restart. The returned [`AuthorizedList`]
//! is scanned lazily: [`AuthorizedList::lines`] yields structurally valid
//! lines with their restriction parsed but the key still encoded, and
//! [`AuthorizedLine::decode`] performs the comparatively expensive key
//! decoding. Any line that fails either stage is logged and skipped without
//! affecting the rest of the scan.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use russh::keys::ssh_key::PublicKey;

use crate::server::security::HostRestriction;
use crate::shared::error::EntryParseError;

/// One structurally valid line whose key material is not decoded yet.
#[derive(Debug, Clone)]
pub struct AuthorizedLine {
    line_number: usize,
    restriction: Option<HostRestriction>,
    algorithm: String,
    key_data: String,
    comment: Option<String>,
}

impl AuthorizedLine {
    /// Parse a single line.
    ///
    /// The caller is expected to have skipped blank and comment lines.
    pub fn parse(line_number: usize, line: &str) -> Result<Self, EntryParseError> {
        let line = line.trim();
        let (options, rest) = split_options(line)?;

        let restriction = match options {
            Some(options) => parse_options(options)?,
            None => None,
        };

        let mut parts = rest.split_whitespace();
        let algorithm = parts.next().ok_or(EntryParseError::MissingKeyData)?;
        let key_data = parts.next().ok_or(EntryParseError::MissingKeyData)?;
        let comment = parts.collect::<Vec<_>>().join(" ");

        Ok(Self {
            line_number,
            restriction,
            algorithm: algorithm.to_string(),
            key_data: key_data.to_string(),
            comment: (!comment.is_empty()).then_some(comment),
        })
    }

    /// One-based line number in the backing list.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The host restriction from the `from=` option, if present.
    pub fn restriction(&self) -> Option<&HostRestriction> {
        self.restriction.as_ref()
    }

    /// The declared key type, e.g. `ssh-ed25519`.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Decode the key material into a usable entry.
    pub fn decode(&self) -> Result<AuthorizedEntry, EntryParseError> {
        let key = russh::keys::parse_public_key_base64(&self.key_data).map_err(|e| {
            EntryParseError::InvalidKey {
                algorithm: self.algorithm.clone(),
                reason: e.to_string(),
            }
        })?;

        let actual = key.algorithm();
        if actual.as_str() != self.algorithm {
            return Err(EntryParseError::AlgorithmMismatch {
                declared: self.algorithm.clone(),
                actual: actual.as_str().to_string(),
            });
        }

        Ok(AuthorizedEntry {
            restriction: self.restriction.clone(),
            key,
            comment: self.comment.clone(),
        })
    }
}

/// A fully decoded authorized entry.
#[derive(Debug, Clone)]
pub struct AuthorizedEntry {
    restriction: Option<HostRestriction>,
    key: PublicKey,
    comment: Option<String>,
}

impl AuthorizedEntry {
    pub fn restriction(&self) -> Option<&HostRestriction> {
        self.restriction.as_ref()
    }

    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Compare key material with a presented key.
    ///
    /// Only the algorithm and key data take part; comments differ freely
    /// between the list and what a client presents.
    pub fn matches_key(&self, presented: &PublicKey) -> bool {
        self.key.key_data() == presented.key_data()
    }
}

/// The contents of one read of the authorized-credentials list.
#[derive(Debug, Clone, Default)]
pub struct AuthorizedList {
    content: String,
}

impl AuthorizedList {
    /// Wrap already-read list content.
    pub fn parse(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// An empty list, used when the backing file does not exist.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Structurally valid lines, in file order.
    ///
    /// Each call starts a new scan over the same content.
    pub fn lines(&self) -> impl Iterator<Item = AuthorizedLine> + '_ {
        self.content
            .lines()
            .enumerate()
            .filter(|(_, line)| !is_skippable(line))
            .filter_map(|(index, line)| match AuthorizedLine::parse(index + 1, line) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::warn!(
                        line = %(index + 1),
                        error = %e,
                        "Skipping malformed authorized_keys line"
                    );
                    None
                }
            })
    }

    /// Decoded entries, in file order. Lines whose key cannot be decoded are
    /// logged and skipped.
    pub fn entries(&self) -> impl Iterator<Item = AuthorizedEntry> + '_ {
        self.lines().filter_map(|line| decode_logged(&line))
    }
}

/// Decode a line, logging and discarding failures.
pub(crate) fn decode_logged(line: &AuthorizedLine) -> Option<AuthorizedEntry> {
    match line.decode() {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(
                line = %line.line_number(),
                error = %e,
                "Skipping authorized_keys line with undecodable key"
            );
            None
        }
    }
}

/// File-backed source of authorized entries.
///
/// # Example
///
/// ```no_run
/// use sshadm::server::auth::AuthorizedEntryStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = AuthorizedEntryStore::new("/etc/sshadm/authorized_keys");
/// let list = store.load().await?;
/// for entry in list.entries() {
///     println!("{}", entry.key().algorithm());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthorizedEntryStore {
    path: PathBuf,
}

impl AuthorizedEntryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the backing file.
    ///
    /// A missing file yields an empty list. Any other read failure is an
    /// error. Loose permissions on Unix are logged but do not stop the scan.
    pub async fn load(&self) -> Result<AuthorizedList> {
        #[cfg(unix)]
        check_file_permissions(&self.path).await?;

        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(AuthorizedList::parse(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %self.path.display(),
                    "No authorized_keys file found"
                );
                Ok(AuthorizedList::empty())
            }
            Err(e) => Err(e).with_context(|| {
                format!("Failed to read authorized_keys file: {}", self.path.display())
            }),
        }
    }
}

/// Warn about world-writable and group-writable lists.
#[cfg(unix)]
async fn check_file_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to get metadata for {}", path.display()));
        }
    };

    let mode = metadata.permissions().mode();

    if mode & 0o002 != 0 {
        tracing::warn!(
            path = %path.display(),
            mode = %format!("{:o}", mode & 0o777),
            "authorized_keys file is world-writable"
        );
    } else if mode & 0o020 != 0 {
        tracing::warn!(
            path = %path.display(),
            mode = %format!("{:o}", mode & 0o777),
            "authorized_keys file is group-writable"
        );
    }

    Ok(())
}

fn is_skippable(line: &str) -> bool {
    let line = line.trim_start();
    line.is_empty() || line.starts_with('#')
}

/// Check if a string looks like a key type.
fn is_key_type(s: &str) -> bool {
    matches!(
        s,
        "ssh-rsa"
            | "ssh-dss"
            | "ssh-ed25519"
            | "ssh-ed448"
            | "ecdsa-sha2-nistp256"
            | "ecdsa-sha2-nistp384"
            | "ecdsa-sha2-nistp521"
            | "sk-ssh-ed25519@openssh.com"
            | "sk-ecdsa-sha2-nistp256@openssh.com"
    )
}

/// Split a leading options field from the rest of the line.
///
/// The options field ends at the first whitespace outside double quotes.
fn split_options(line: &str) -> Result<(Option<&str>, &str), EntryParseError> {
    let first = line.split_whitespace().next().unwrap_or_default();
    if is_key_type(first) {
        return Ok((None, line));
    }

    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                return Ok((Some(&line[..i]), line[i..].trim_start()));
            }
            _ => {}
        }
    }

    if in_quotes {
        Err(EntryParseError::UnterminatedQuote)
    } else {
        Ok((Some(line), ""))
    }
}

/// Parse a comma-separated options field, returning the `from=` restriction.
fn parse_options(options: &str) -> Result<Option<HostRestriction>, EntryParseError> {
    let mut restriction = None;

    for option in split_unquoted_commas(options) {
        let option = option.trim();
        if option.is_empty() {
            continue;
        }

        match option.split_once('=') {
            Some((name, value)) if name.eq_ignore_ascii_case("from") => {
                if restriction.is_some() {
                    return Err(EntryParseError::DuplicateFrom);
                }
                restriction = Some(HostRestriction::parse(&unquote(value)));
            }
            Some((name, _)) => {
                tracing::debug!(option = %name, "Ignoring authorized_keys option");
            }
            None => {
                tracing::debug!(option = %option, "Ignoring authorized_keys option");
            }
        }
    }

    Ok(restriction)
}

fn split_unquoted_commas(options: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in options.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&options[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&options[start..]);
    parts
}

/// Strip surrounding quotes and resolve `\"` escapes.
fn unquote(value: &str) -> String {
    let inner = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    inner.replace("\\\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const KEY_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";
    const KEY_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIOWbRzS2eH506U98qCmnb0dV1oyME0cvuu70BBOWIN1f";

    #[test]
    fn test_is_key_type() {
        assert!(is_key_type("ssh-ed25519"));
        assert!(is_key_type("ssh-rsa"));
        assert!(is_key_type("ecdsa-sha2-nistp256"));
        assert!(!is_key_type("no-pty"));
        assert!(!is_key_type("from=\"10.0.0.0/8\""));
    }

    #[test]
    fn test_parse_plain_line() {
        let line = AuthorizedLine::parse(1, &format!("ssh-ed25519 {KEY_A} admin@example")).unwrap();
        assert!(line.restriction().is_none());
        assert_eq!(line.algorithm(), "ssh-ed25519");
        assert_eq!(line.comment(), Some("admin@example"));

        let entry = line.decode().unwrap();
        assert_eq!(entry.comment(), Some("admin@example"));
    }

    #[test]
    fn test_parse_from_option() {
        let text = format!("from=\"10.0.0.0/8,!10.0.1.5\" ssh-ed25519 {KEY_A}");
        let line = AuthorizedLine::parse(3, &text).unwrap();
        let restriction = line.restriction().unwrap();
        assert_eq!(restriction.len(), 2);
        assert_eq!(restriction.to_string(), "10.0.0.0/8,!10.0.1.5");
        assert!(line.comment().is_none());
        assert_eq!(line.line_number(), 3);
    }

    #[test]
    fn test_from_with_spaces_inside_quotes() {
        let text = format!("from=\"10.0.0.0/8, *.example.org\",no-pty ssh-ed25519 {KEY_A} c");
        let line = AuthorizedLine::parse(1, &text).unwrap();
        assert_eq!(line.restriction().unwrap().len(), 2);
        assert_eq!(line.comment(), Some("c"));
    }

    #[test]
    fn test_other_options_are_ignored() {
        let text = format!("no-pty,command=\"/bin/date\" ssh-ed25519 {KEY_A}");
        let line = AuthorizedLine::parse(1, &text).unwrap();
        assert!(line.restriction().is_none());
        assert!(line.decode().is_ok());
    }

    #[test]
    fn test_duplicate_from_is_rejected() {
        let text = format!("from=\"10.0.0.1\",from=\"10.0.0.2\" ssh-ed25519 {KEY_A}");
        assert_eq!(
            AuthorizedLine::parse(1, &text).unwrap_err(),
            EntryParseError::DuplicateFrom
        );
    }

    #[test]
    fn test_unterminated_quote_is_rejected() {
        let text = format!("from=\"10.0.0.1 ssh-ed25519 {KEY_A}");
        assert_eq!(
            AuthorizedLine::parse(1, &text).unwrap_err(),
            EntryParseError::UnterminatedQuote
        );
    }

    #[test]
    fn test_missing_key_data() {
        assert_eq!(
            AuthorizedLine::parse(1, "ssh-ed25519").unwrap_err(),
            EntryParseError::MissingKeyData
        );
        assert_eq!(
            AuthorizedLine::parse(1, "from=\"10.0.0.1\"").unwrap_err(),
            EntryParseError::MissingKeyData
        );
    }

    #[test]
    fn test_invalid_key_material() {
        let line = AuthorizedLine::parse(1, "ssh-ed25519 notbase64!@#$").unwrap();
        assert!(matches!(
            line.decode(),
            Err(EntryParseError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_algorithm_mismatch() {
        let line = AuthorizedLine::parse(1, &format!("ssh-rsa {KEY_A}")).unwrap();
        assert!(matches!(
            line.decode(),
            Err(EntryParseError::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn test_list_skips_comments_and_blanks() {
        let content = format!("# header\n\n   # indented comment\n   \nssh-ed25519 {KEY_A} a\n");
        let list = AuthorizedList::parse(content);
        let entries: Vec<_> = list.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(list.lines().next().unwrap().line_number(), 5);
    }

    #[test]
    fn test_malformed_line_does_not_stop_scan() {
        let content = format!(
            "ssh-ed25519 {KEY_A} first\nssh-ed25519 AAAA-broken\nfrom=\"oops ssh-ed25519 {KEY_A}\nssh-ed25519 {KEY_B} second\n"
        );
        let list = AuthorizedList::parse(content);
        let comments: Vec<_> = list
            .entries()
            .map(|e| e.comment().unwrap_or_default().to_string())
            .collect();
        assert_eq!(comments, vec!["first", "second"]);
    }

    #[test]
    fn test_scan_is_restartable() {
        let list = AuthorizedList::parse(format!("ssh-ed25519 {KEY_A}\nssh-ed25519 {KEY_B}\n"));
        assert_eq!(list.entries().count(), 2);
        assert_eq!(list.entries().count(), 2);
    }

    #[test]
    fn test_matches_key_ignores_comment() {
        let list = AuthorizedList::parse(format!("ssh-ed25519 {KEY_A} listed-comment\n"));
        let entry = list.entries().next().unwrap();
        let presented = russh::keys::parse_public_key_base64(KEY_A).unwrap();
        let other = russh::keys::parse_public_key_base64(KEY_B).unwrap();
        assert!(entry.matches_key(&presented));
        assert!(!entry.matches_key(&other));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthorizedEntryStore::new(dir.path().join("authorized_keys"));
        let list = store.load().await.unwrap();
        assert_eq!(list.entries().count(), 0);
    }

    #[tokio::test]
    async fn test_load_reads_file_each_time() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ssh-ed25519 {KEY_A}").unwrap();
        file.flush().unwrap();

        let store = AuthorizedEntryStore::new(file.path());
        assert_eq!(store.load().await.unwrap().entries().count(), 1);

        writeln!(file, "ssh-ed25519 {KEY_B}").unwrap();
        file.flush().unwrap();
        assert_eq!(store.load().await.unwrap().entries().count(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_world_writable_file_is_still_read() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ssh-ed25519 {KEY_A}").unwrap();
        file.flush().unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o666)).unwrap();

        let store = AuthorizedEntryStore::new(file.path());
        let list = store.load().await.unwrap();
        assert_eq!(list.entries().count(), 1);
    }

    #[tokio::test]
    async fn test_directory_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthorizedEntryStore::new(dir.path());
        assert!(store.load().await.is_err());
    }
}
