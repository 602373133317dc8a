//! Lenient version ordering.
//!
//! Plugin versions are semver more often than not, but catalogs also carry
//! dotted-numeric forms with ad-hoc suffixes (`2.3.1-beta-2`, `1.0.0.1`).
//! Parsing never fails: anything unrecognized orders by its raw text, so
//! update detection degrades instead of erroring.

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version as SemVer;

static DOTTED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?<nums>[0-9]+(?:\.[0-9]+)*)(?:[-.+](?<suffix>.+))?$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Parsed {
    SemVer(SemVer),
    Dotted { nums: Vec<u64>, suffix: Option<String> },
    Opaque,
}

#[derive(Debug, Clone)]
pub struct PluginVersion {
    raw: String,
    parsed: Parsed,
}

impl PluginVersion {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let parsed = if let Ok(v) = SemVer::parse(raw) {
            Parsed::SemVer(v)
        } else if let Some(caps) = DOTTED_REGEX.captures(raw) {
            let nums = caps["nums"]
                .split('.')
                .map(|n| n.parse::<u64>().unwrap_or(u64::MAX))
                .collect();
            Parsed::Dotted {
                nums,
                suffix: caps.name("suffix").map(|m| m.as_str().to_string()),
            }
        } else {
            Parsed::Opaque
        };
        Self {
            raw: raw.to_string(),
            parsed,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn numbers(&self) -> Option<(Vec<u64>, Option<String>)> {
        match &self.parsed {
            Parsed::SemVer(v) => {
                let suffix = if v.pre.is_empty() {
                    None
                } else {
                    Some(v.pre.as_str().to_string())
                };
                Some((vec![v.major, v.minor, v.patch], suffix))
            }
            Parsed::Dotted { nums, suffix } => Some((nums.clone(), suffix.clone())),
            Parsed::Opaque => None,
        }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialEq for PluginVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PluginVersion {}

impl PartialOrd for PluginVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PluginVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numbers(), other.numbers()) {
            (Some((a, asuf)), Some((b, bsuf))) => {
                let len = a.len().max(b.len());
                for i in 0..len {
                    let x = a.get(i).copied().unwrap_or(0);
                    let y = b.get(i).copied().unwrap_or(0);
                    match x.cmp(&y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                // A release outranks any suffixed build of the same numbers.
                match (asuf, bsuf) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(a), Some(b)) => a.cmp(&b),
                }
            }
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PluginVersion {
        PluginVersion::parse(s)
    }

    #[test]
    fn semver_ordering() {
        assert!(v("2.0.0") > v("1.9.9"));
        assert!(v("1.0.0") == v("1.0.0"));
    }

    #[test]
    fn dotted_numeric_ordering() {
        assert!(v("1.0.0.1") > v("1.0.0"));
        assert!(v("2.10") > v("2.9"));
        assert!(v("1.0") == v("1.0.0"));
    }

    #[test]
    fn release_outranks_prerelease() {
        assert!(v("1.0.0") > v("1.0.0-beta"));
        assert!(v("2.3.1") > v("2.3.1-beta-2"));
    }

    #[test]
    fn suffixes_order_lexicographically() {
        assert!(v("1.0-beta") > v("1.0-alpha"));
    }

    #[test]
    fn opaque_versions_never_panic() {
        assert!(v("trunk") != v("tip"));
        assert!(v("1.0") > v("trunk"));
    }
}
