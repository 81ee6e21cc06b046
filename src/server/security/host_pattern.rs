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

//! Host patterns used in `from="..."` restriction clauses.
//!
//! A pattern is one item of a comma-separated restriction clause. Each item
//! may carry a leading `!` to negate it, and the remaining text is
//! interpreted by the first rule that accepts it:
//!
//! 1. An IP network in CIDR notation (`10.0.0.0/8`, `2001:db8::/32`) or a
//!    bare address, matched against the peer's literal address.
//! 2. A glob containing `*` or `?`, matched against both the literal address
//!    string and the resolved hostname.
//! 3. Anything else, compared exactly against the resolved hostname.
//!
//! All comparisons are case-sensitive.

use std::fmt;

use ipnetwork::IpNetwork;
use regex::{Regex, RegexBuilder};

use crate::shared::endpoint::RemoteEndpoint;

/// Upper bound on the compiled size of a glob regex.
const GLOB_REGEX_SIZE_LIMIT: usize = 64 * 1024;

/// Result of evaluating a single pattern against a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A non-negated pattern matched.
    Allow,
    /// A negated pattern matched.
    Deny,
    /// The pattern did not match.
    Defer,
}

#[derive(Debug, Clone)]
enum Matcher {
    Network(IpNetwork),
    Glob(Regex),
    Exact,
}

/// One item of a host restriction clause.
#[derive(Debug, Clone)]
pub struct HostPattern {
    negated: bool,
    text: String,
    matcher: Matcher,
}

impl HostPattern {
    /// Parse a single pattern item.
    ///
    /// Parsing never fails: text that is neither a network nor a glob
    /// becomes an exact hostname pattern.
    pub fn parse(item: &str) -> Self {
        let (negated, text) = match item.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, item),
        };

        let matcher = if let Ok(network) = text.parse::<IpNetwork>() {
            Matcher::Network(network)
        } else if is_glob(text) {
            match glob_to_regex(text) {
                Ok(regex) => Matcher::Glob(regex),
                Err(e) => {
                    tracing::warn!(
                        pattern = %text,
                        error = %e,
                        "Host glob could not be compiled, comparing literally"
                    );
                    Matcher::Exact
                }
            }
        } else {
            Matcher::Exact
        };

        Self {
            negated,
            text: text.to_string(),
            matcher,
        }
    }

    /// Whether the pattern was written with a leading `!`.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// The pattern text without the negation marker.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the text parsed as an IP network.
    pub fn is_network(&self) -> bool {
        matches!(self.matcher, Matcher::Network(_))
    }

    /// Whether the text is a wildcard pattern.
    pub fn is_glob(&self) -> bool {
        matches!(self.matcher, Matcher::Glob(_))
    }

    /// Check whether the pattern text matches the endpoint, ignoring negation.
    pub fn matches(&self, remote: &RemoteEndpoint) -> bool {
        match &self.matcher {
            Matcher::Network(network) => network.contains(remote.address()),
            Matcher::Glob(regex) => {
                regex.is_match(&remote.address().to_string())
                    || remote.hostname().is_some_and(|name| regex.is_match(name))
            }
            Matcher::Exact => remote.hostname() == Some(self.text.as_str()),
        }
    }

    /// Classify this pattern against the endpoint.
    pub fn evaluate(&self, remote: &RemoteEndpoint) -> Outcome {
        match (self.matches(remote), self.negated) {
            (true, true) => Outcome::Deny,
            (true, false) => Outcome::Allow,
            (false, _) => Outcome::Defer,
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        f.write_str(&self.text)
    }
}

/// An ordered list of host patterns taken from one `from="..."` clause.
#[derive(Debug, Clone, Default)]
pub struct HostRestriction {
    patterns: Vec<HostPattern>,
}

impl HostRestriction {
    /// Parse a comma-separated clause. Items are trimmed and empty items
    /// are dropped.
    pub fn parse(clause: &str) -> Self {
        let patterns = clause
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(HostPattern::parse)
            .collect();
        Self { patterns }
    }

    /// Patterns in the order they were written.
    pub fn patterns(&self) -> impl Iterator<Item = &HostPattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl fmt::Display for HostRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pattern) in self.patterns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{pattern}")?;
        }
        Ok(())
    }
}

fn is_glob(text: &str) -> bool {
    text.contains(['*', '?'])
}

/// Translate a `*`/`?` glob into an anchored regex. Every other character
/// is matched literally.
fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let body = regex::escape(glob)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");

    RegexBuilder::new(&format!("^{body}$"))
        .size_limit(GLOB_REGEX_SIZE_LIMIT)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn remote(addr: &str) -> RemoteEndpoint {
        RemoteEndpoint::new(addr.parse::<IpAddr>().unwrap())
    }

    #[test]
    fn test_parse_network_pattern() {
        let pattern = HostPattern::parse("10.0.0.0/8");
        assert!(pattern.is_network());
        assert!(!pattern.is_negated());
        assert!(pattern.matches(&remote("10.200.3.4")));
        assert!(!pattern.matches(&remote("11.0.0.1")));
    }

    #[test]
    fn test_bare_address_is_single_host_network() {
        let pattern = HostPattern::parse("!10.0.1.5");
        assert!(pattern.is_network());
        assert!(pattern.is_negated());
        assert_eq!(pattern.text(), "10.0.1.5");
        assert_eq!(pattern.evaluate(&remote("10.0.1.5")), Outcome::Deny);
        assert_eq!(pattern.evaluate(&remote("10.0.1.6")), Outcome::Defer);
    }

    #[test]
    fn test_ipv6_network() {
        let pattern = HostPattern::parse("2001:db8::/32");
        assert!(pattern.is_network());
        assert_eq!(pattern.evaluate(&remote("2001:db8:1::9")), Outcome::Allow);
        assert_eq!(pattern.evaluate(&remote("10.0.0.1")), Outcome::Defer);
    }

    #[test]
    fn test_malformed_cidr_falls_back_to_exact() {
        let pattern = HostPattern::parse("10.0.0.0/99");
        assert!(!pattern.is_network());
        assert!(!pattern.is_glob());

        let named = remote("10.0.0.1").with_hostname("10.0.0.0/99");
        assert!(pattern.matches(&named));
        assert!(!pattern.matches(&remote("10.0.0.1")));
    }

    #[test]
    fn test_glob_matches_hostname() {
        let pattern = HostPattern::parse("*.example.org");
        assert!(pattern.is_glob());

        let a = remote("192.0.2.1").with_hostname("a.example.org");
        let bare = remote("192.0.2.1").with_hostname("example.org");
        let unresolved = remote("192.0.2.1");

        assert!(pattern.matches(&a));
        assert!(!pattern.matches(&bare));
        assert!(!pattern.matches(&unresolved));
    }

    #[test]
    fn test_glob_matches_address_string() {
        let pattern = HostPattern::parse("192.168.1.?");
        assert!(pattern.matches(&remote("192.168.1.7")));
        assert!(!pattern.matches(&remote("192.168.1.17")));
        // The dot is literal, not a regex wildcard.
        let tricky = HostPattern::parse("192.168*");
        assert!(!tricky.matches(&remote("192.1.68.1")));
        assert!(tricky.matches(&remote("192.168.4.4")));
    }

    #[test]
    fn test_glob_is_case_sensitive() {
        let pattern = HostPattern::parse("*.Example.org");
        let lower = remote("192.0.2.1").with_hostname("a.example.org");
        assert!(!pattern.matches(&lower));
    }

    #[test]
    fn test_exact_hostname() {
        let pattern = HostPattern::parse("admin.example.org");
        assert!(!pattern.is_glob());
        assert!(!pattern.is_network());

        let hit = remote("192.0.2.1").with_hostname("admin.example.org");
        let miss = remote("192.0.2.1").with_hostname("other.example.org");
        assert_eq!(pattern.evaluate(&hit), Outcome::Allow);
        assert_eq!(pattern.evaluate(&miss), Outcome::Defer);
    }

    #[test]
    fn test_glob_metacharacters_are_literal() {
        let pattern = HostPattern::parse("host+(1)*");
        let hit = remote("192.0.2.1").with_hostname("host+(1).lab");
        let miss = remote("192.0.2.1").with_hostname("hostt(1).lab");
        assert!(pattern.matches(&hit));
        assert!(!pattern.matches(&miss));
    }

    #[test]
    fn test_restriction_parse_trims_and_drops_empty() {
        let restriction = HostRestriction::parse(" 10.0.0.0/8 , ,!10.0.1.5,");
        assert_eq!(restriction.len(), 2);
        assert_eq!(restriction.to_string(), "10.0.0.0/8,!10.0.1.5");
    }

    #[test]
    fn test_empty_restriction() {
        let restriction = HostRestriction::parse("");
        assert!(restriction.is_empty());
    }
}
