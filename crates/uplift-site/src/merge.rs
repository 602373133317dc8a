use std::collections::BTreeMap;

use crate::entry::PluginEntry;

/// Collapse per-site plugin lists into one map.
///
/// Site order is significant: the first site publishing a name owns the
/// primary entry. A later site contributing a *different* version of the
/// same name is retained under the synthetic key `name:version`, so the
/// UI can offer alternate versions without duplicate rows. A later site
/// republishing the same (name, version) is dropped.
pub fn merge_site_plugins(per_site: &[Vec<PluginEntry>]) -> BTreeMap<String, PluginEntry> {
    let mut merged: BTreeMap<String, PluginEntry> = BTreeMap::new();
    for plugins in per_site {
        for plugin in plugins {
            match merged.get(&plugin.name) {
                None => {
                    merged.insert(plugin.name.clone(), plugin.clone());
                }
                Some(primary) if primary.version != plugin.version => {
                    let key = format!("{}:{}", plugin.name, plugin.version);
                    merged.entry(key).or_insert_with(|| plugin.clone());
                }
                Some(_) => {}
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, version: &str, source: &str) -> PluginEntry {
        PluginEntry {
            name: name.to_string(),
            version: version.to_string(),
            url: format!("https://{source}.example.org/{name}.jpi"),
            source_id: source.to_string(),
            ..PluginEntry::default()
        }
    }

    #[test]
    fn first_site_wins_primary_entry() {
        let merged = merge_site_plugins(&[
            vec![entry("foo", "1.0", "a")],
            vec![entry("foo", "2.0", "b")],
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged["foo"].version, "1.0");
        assert_eq!(merged["foo"].source_id, "a");
        assert_eq!(merged["foo:2.0"].source_id, "b");
    }

    #[test]
    fn identical_version_from_later_site_is_dropped() {
        let merged = merge_site_plugins(&[
            vec![entry("foo", "1.0", "a")],
            vec![entry("foo", "1.0", "b")],
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged["foo"].source_id, "a");
    }

    #[test]
    fn disjoint_names_pass_through() {
        let merged = merge_site_plugins(&[
            vec![entry("foo", "1.0", "a")],
            vec![entry("bar", "3.0", "b")],
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged["bar"].source_id, "b");
    }

    #[test]
    fn synthetic_keys_collide_first_wins() {
        let merged = merge_site_plugins(&[
            vec![entry("foo", "1.0", "a")],
            vec![entry("foo", "2.0", "b")],
            vec![entry("foo", "2.0", "c")],
        ]);

        assert_eq!(merged["foo:2.0"].source_id, "b");
    }
}
