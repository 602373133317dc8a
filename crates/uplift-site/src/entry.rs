//! Parsed catalog data model.
//!
//! Catalogs are tolerant-parsed: unknown fields are ignored and optional
//! fields default, so a site publishing a newer schema still loads.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uplift_verify::ExpectedDigests;

use crate::version::PluginVersion;

/// One installable plugin as published by a site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginEntry {
    pub name: String,
    pub version: String,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub url: String,
    #[serde(alias = "labels")]
    pub categories: Vec<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub sha512: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub required_core: Option<String>,
    /// Id of the owning site; stamped after parsing, never published.
    #[serde(skip)]
    pub source_id: String,
}

impl PluginEntry {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn parsed_version(&self) -> PluginVersion {
        PluginVersion::parse(&self.version)
    }

    pub fn expected_digests(&self) -> ExpectedDigests {
        ExpectedDigests {
            sha1: self.sha1.clone(),
            sha256: self.sha256.clone(),
            sha512: self.sha512.clone(),
        }
    }

    pub fn has_absolute_url(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }

    /// Non-optional dependencies, the ones an install must satisfy.
    pub fn required_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| !d.optional)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    pub optional: bool,
}

/// The core (host binary) release a site offers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreEntry {
    pub name: Option<String>,
    pub version: String,
    pub url: String,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub sha512: Option<String>,
}

impl CoreEntry {
    pub fn expected_digests(&self) -> ExpectedDigests {
        ExpectedDigests {
            sha1: self.sha1.clone(),
            sha256: self.sha256.clone(),
            sha512: self.sha512.clone(),
        }
    }
}

/// Published security warning, matched against plugin name and version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Warning {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub message: String,
    pub url: Option<String>,
    pub versions: Vec<WarningVersionRange>,
}

impl Warning {
    /// A warning with no version ranges applies to every version.
    pub fn applies_to(&self, name: &str, version: &str) -> bool {
        if self.name != name {
            return false;
        }
        if self.versions.is_empty() {
            return true;
        }
        self.versions.iter().any(|range| range.matches(version))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WarningVersionRange {
    pub pattern: Option<String>,
    pub last_version: Option<String>,
}

impl WarningVersionRange {
    pub fn matches(&self, version: &str) -> bool {
        if let Some(pattern) = &self.pattern {
            match Regex::new(&format!("^{pattern}$")) {
                Ok(re) => return re.is_match(version),
                Err(_) => return false,
            }
        }
        if let Some(last) = &self.last_version {
            return PluginVersion::parse(version) <= PluginVersion::parse(last);
        }
        false
    }
}

/// One site's parsed catalog. Replaced atomically as a unit; readers only
/// ever see a complete snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteData {
    pub id: Option<String>,
    pub connection_check_url: Option<String>,
    pub core: Option<CoreEntry>,
    pub plugins: BTreeMap<String, PluginEntry>,
    pub warnings: Vec<Warning>,
}

impl SiteData {
    /// Parse a catalog document and stamp every plugin with its source.
    pub fn parse(json: &str, source_id: &str) -> Result<Self, serde_json::Error> {
        let mut data: SiteData = serde_json::from_str(json)?;
        for (name, plugin) in data.plugins.iter_mut() {
            if plugin.name.is_empty() {
                plugin.name = name.clone();
            }
            plugin.source_id = source_id.to_string();
        }
        Ok(data)
    }

    pub fn warnings_for(&self, name: &str, version: &str) -> Vec<&Warning> {
        self.warnings
            .iter()
            .filter(|w| w.applies_to(name, version))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "id": "default",
        "connectionCheckUrl": "http://www.google.com/",
        "core": {"version": "2.401.3", "url": "https://updates.example.org/core.war", "sha256": "q1w2"},
        "plugins": {
            "git": {
                "name": "git",
                "version": "5.0.0",
                "title": "Git plugin",
                "url": "https://updates.example.org/git.jpi",
                "sha512": "abc",
                "labels": ["scm"],
                "dependencies": [
                    {"name": "scm-api", "version": "2.0", "optional": false},
                    {"name": "credentials", "version": "3.0", "optional": true}
                ],
                "unknownField": {"future": true}
            }
        },
        "warnings": [
            {"id": "SEC-1", "type": "plugin", "name": "git", "message": "XSS",
             "versions": [{"pattern": "4\\..*"}]}
        ]
    }"#;

    #[test]
    fn parses_and_stamps_source() {
        let data = SiteData::parse(CATALOG, "default").unwrap();
        let git = &data.plugins["git"];
        assert_eq!(git.source_id, "default");
        assert_eq!(git.version, "5.0.0");
        assert_eq!(git.categories, vec!["scm"]);
        assert_eq!(git.required_dependencies().count(), 1);
        assert_eq!(data.core.as_ref().unwrap().version, "2.401.3");
    }

    #[test]
    fn fills_plugin_name_from_map_key() {
        let data =
            SiteData::parse(r#"{"plugins": {"git": {"version": "1.0", "url": "x"}}}"#, "s").unwrap();
        assert_eq!(data.plugins["git"].name, "git");
    }

    #[test]
    fn warning_version_patterns() {
        let data = SiteData::parse(CATALOG, "default").unwrap();
        assert_eq!(data.warnings_for("git", "4.11.1").len(), 1);
        assert!(data.warnings_for("git", "5.0.0").is_empty());
        assert!(data.warnings_for("subversion", "4.1").is_empty());
    }

    #[test]
    fn warning_last_version_bound() {
        let range = WarningVersionRange {
            pattern: None,
            last_version: Some("2.3".to_string()),
        };
        assert!(range.matches("2.3"));
        assert!(range.matches("1.9"));
        assert!(!range.matches("2.4"));
    }

    #[test]
    fn expected_digests_carry_all_declared_hashes() {
        let data = SiteData::parse(CATALOG, "default").unwrap();
        let digests = data.plugins["git"].expected_digests();
        assert_eq!(digests.sha512.as_deref(), Some("abc"));
        assert!(digests.sha256.is_none());
        assert!(digests.sha1.is_none());
    }
}
