// src/index/resolver.rs

//! Variant selection and dependency tracing over fetched indices
//!
//! Pure functions; nothing here touches the network or the disk.

use super::{DirectDescriptor, PackageDescriptor, RemoteIndex, WILDCARD};
use std::collections::{BTreeMap, HashSet};
use tracing::trace;

/// Package map of one index
pub type PackageMap = BTreeMap<String, PackageDescriptor>;

/// Pick the descriptor that applies to a distribution version
///
/// Direct descriptors apply to every version. A switch needs a version:
/// the first key whose comma-separated list contains it wins, then the
/// wildcard key. An absent or empty version never matches a switch.
pub fn select_variant<'a>(
    descriptor: &'a PackageDescriptor,
    version: Option<&str>,
) -> Option<&'a DirectDescriptor> {
    let variants = match descriptor {
        PackageDescriptor::Direct(direct) => return Some(direct),
        PackageDescriptor::Switch(variants) => variants,
    };

    let version = version.filter(|v| !v.is_empty())?;

    variants
        .iter()
        .find(|(key, _)| {
            key.as_str() != WILDCARD && key.split(',').any(|candidate| candidate.trim() == version)
        })
        .map(|(_, direct)| direct)
        .or_else(|| variants.get(WILDCARD))
}

/// Whether `name` and all of its requirements resolve for `version`
///
/// `maps` are the package maps of the configured sources in order; the
/// first map carrying a name provides its descriptor. A requirement that
/// leads back to a package on the current chain counts as unresolvable.
pub fn trace_dependencies(maps: &[&PackageMap], version: Option<&str>, name: &str) -> bool {
    let mut chain = HashSet::new();
    trace_inner(maps, version, name, &mut chain)
}

fn trace_inner<'a>(
    maps: &[&'a PackageMap],
    version: Option<&str>,
    name: &'a str,
    chain: &mut HashSet<&'a str>,
) -> bool {
    let Some(descriptor) = maps.iter().copied().find_map(|map| map.get(name)) else {
        trace!("{} is not published by any source", name);
        return false;
    };
    let Some(direct) = select_variant(descriptor, version) else {
        trace!("{} has no variant for version {:?}", name, version);
        return false;
    };

    if !chain.insert(name) {
        trace!("Dependency cycle through {}", name);
        return false;
    }
    let resolved = direct
        .requirements
        .iter()
        .all(|req| trace_inner(maps, version, req, chain));
    chain.remove(name);

    resolved
}

/// A package installable into a distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailablePackage {
    pub name: String,
    /// `None` for virtual packages
    pub revision: Option<i64>,
}

impl AvailablePackage {
    /// `<rev>` or `virtual`
    pub fn revision_label(&self) -> String {
        match self.revision {
            Some(revision) => revision.to_string(),
            None => "virtual".to_string(),
        }
    }
}

/// Packages whose dependencies resolve for `version`, sorted by name
///
/// When several sources publish a name the highest revision is reported;
/// a concrete revision always beats a virtual entry.
pub fn available_packages(indices: &[RemoteIndex], version: Option<&str>) -> Vec<AvailablePackage> {
    let mut best: BTreeMap<&str, Option<i64>> = BTreeMap::new();

    for index in indices {
        for (name, descriptor) in &index.packages {
            let Some(direct) = select_variant(descriptor, version) else {
                continue;
            };
            best.entry(name.as_str())
                .and_modify(|current| {
                    if direct.revision > *current {
                        *current = direct.revision;
                    }
                })
                .or_insert(direct.revision);
        }
    }

    let maps: Vec<&PackageMap> = indices.iter().map(|index| &index.packages).collect();
    best.into_iter()
        .filter(|(name, _)| trace_dependencies(&maps, version, name))
        .map(|(name, revision)| AvailablePackage {
            name: name.to_string(),
            revision,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(revision: Option<i64>, requirements: &[&str]) -> DirectDescriptor {
        DirectDescriptor {
            revision,
            path: revision.map(|r| format!("pkg-{r}.zip")),
            uri: None,
            checksum: None,
            requirements: requirements.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn switch(entries: &[(&str, DirectDescriptor)]) -> PackageDescriptor {
        PackageDescriptor::Switch(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn map(entries: Vec<(&str, PackageDescriptor)>) -> PackageMap {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_select_variant() {
        let a = direct(Some(1), &[]);
        let b = direct(Some(2), &[]);
        let c = direct(Some(3), &[]);
        let with_wildcard = switch(&[("1.0,1.1", a.clone()), ("2.0", b.clone()), ("*", c.clone())]);
        let without_wildcard = switch(&[("1.0,1.1", a.clone()), ("2.0", b.clone())]);

        assert_eq!(select_variant(&with_wildcard, Some("1.1")), Some(&a));
        assert_eq!(select_variant(&with_wildcard, Some("2.0")), Some(&b));
        assert_eq!(select_variant(&with_wildcard, Some("3.0")), Some(&c));
        assert_eq!(select_variant(&without_wildcard, Some("3.0")), None);
        assert_eq!(select_variant(&with_wildcard, None), None);
        assert_eq!(select_variant(&with_wildcard, Some("")), None);
    }

    #[test]
    fn test_direct_ignores_version() {
        let d = PackageDescriptor::Direct(direct(Some(4), &[]));
        assert!(select_variant(&d, None).is_some());
        assert!(select_variant(&d, Some("9.9")).is_some());
    }

    #[test]
    fn test_trace_dependencies() {
        let packages = map(vec![
            ("base", PackageDescriptor::Direct(direct(Some(1), &[]))),
            ("meta-ok", PackageDescriptor::Direct(direct(None, &["base"]))),
            ("meta-broken", PackageDescriptor::Direct(direct(None, &["base", "ghost"]))),
            ("old-only", switch(&[("1.0", direct(Some(1), &[]))])),
        ]);
        let maps = [&packages];

        assert!(trace_dependencies(&maps, Some("2.0"), "base"));
        assert!(trace_dependencies(&maps, Some("2.0"), "meta-ok"));
        assert!(!trace_dependencies(&maps, Some("2.0"), "meta-broken"));
        assert!(!trace_dependencies(&maps, Some("2.0"), "old-only"));
        assert!(trace_dependencies(&maps, Some("1.0"), "old-only"));
    }

    #[test]
    fn test_trace_first_map_wins() {
        let first = map(vec![("pak", PackageDescriptor::Direct(direct(None, &["ghost"])))]);
        let second = map(vec![("pak", PackageDescriptor::Direct(direct(Some(1), &[])))]);
        assert!(!trace_dependencies(&[&first, &second], None, "pak"));
        assert!(trace_dependencies(&[&second, &first], None, "pak"));
    }

    #[test]
    fn test_trace_cycle_is_unresolvable() {
        let packages = map(vec![
            ("a", PackageDescriptor::Direct(direct(Some(1), &["b"]))),
            ("b", PackageDescriptor::Direct(direct(Some(1), &["a"]))),
            ("self", PackageDescriptor::Direct(direct(Some(1), &["self"]))),
        ]);
        assert!(!trace_dependencies(&[&packages], None, "a"));
        assert!(!trace_dependencies(&[&packages], None, "self"));
    }

    #[test]
    fn test_trace_diamond_is_not_a_cycle() {
        let packages = map(vec![
            ("top", PackageDescriptor::Direct(direct(None, &["left", "right"]))),
            ("left", PackageDescriptor::Direct(direct(Some(1), &["base"]))),
            ("right", PackageDescriptor::Direct(direct(Some(1), &["base"]))),
            ("base", PackageDescriptor::Direct(direct(Some(1), &[]))),
        ]);
        assert!(trace_dependencies(&[&packages], None, "top"));
    }

    #[test]
    fn test_available_packages() {
        let first = RemoteIndex {
            source: "http://a/".to_string(),
            repo: "wapkg".to_string(),
            version: 1,
            distributions: BTreeMap::new(),
            packages: map(vec![
                ("pak", PackageDescriptor::Direct(direct(Some(3), &[]))),
                ("meta", PackageDescriptor::Direct(direct(None, &["pak"]))),
                ("broken", PackageDescriptor::Direct(direct(Some(1), &["ghost"]))),
            ]),
        };
        let second = RemoteIndex {
            source: "http://b/".to_string(),
            packages: map(vec![
                ("pak", PackageDescriptor::Direct(direct(Some(7), &[]))),
                ("skin", switch(&[("1.0", direct(Some(2), &[]))])),
            ]),
            ..first.clone()
        };

        let available = available_packages(&[first, second], Some("2.0"));
        let listed: Vec<(String, String)> = available
            .iter()
            .map(|p| (p.name.clone(), p.revision_label()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("meta".to_string(), "virtual".to_string()),
                ("pak".to_string(), "7".to_string()),
            ]
        );
    }
}
