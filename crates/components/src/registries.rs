//! Registry merge and diff
//!
//! The registry set a cluster's container runtime trusts is assembled from
//! three sources: the insecure host list, addon image mirrors, and explicit
//! registry entries. Every source is merged through [`RegistrySet::insert`],
//! which keeps entries sorted by identity key (`scheme + host`) and ignores
//! duplicates, so the result is canonical regardless of insertion order.

use crds::{Addon, ClusterSpec, RegistrySpec};
use serde::Deserialize;
use std::cmp::Ordering;
use tracing::debug;

/// Sorted, duplicate-free set of registries keyed by `scheme + host`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySet {
    entries: Vec<RegistrySpec>,
}

impl RegistrySet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a registry unless one with the same identity key is present.
    ///
    /// Returns `true` if the registry was inserted.
    pub fn insert(&mut self, spec: RegistrySpec) -> bool {
        match self
            .entries
            .binary_search_by(|existing| compare_identity(existing, &spec))
        {
            Ok(_) => false,
            Err(index) => {
                self.entries.insert(index, spec);
                true
            }
        }
    }

    /// Insert both endpoints of an insecure host (`http`, then `https` without
    /// certificate verification)
    pub fn insert_insecure_host(&mut self, host: &str) {
        for spec in RegistrySpec::insecure_pair(host) {
            self.insert(spec);
        }
    }

    /// Whether a registry with this scheme and host is present
    pub fn contains(&self, scheme: &str, host: &str) -> bool {
        let key = format!("{scheme}{host}");
        self.entries
            .binary_search_by(|existing| existing.identity_key().cmp(&key))
            .is_ok()
    }

    /// Entries in identity key order
    pub fn as_slice(&self) -> &[RegistrySpec] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the set into its sorted entries
    pub fn into_vec(self) -> Vec<RegistrySpec> {
        self.entries
    }
}

impl Extend<RegistrySpec> for RegistrySet {
    fn extend<T: IntoIterator<Item = RegistrySpec>>(&mut self, iter: T) {
        for spec in iter {
            self.insert(spec);
        }
    }
}

impl FromIterator<RegistrySpec> for RegistrySet {
    fn from_iter<T: IntoIterator<Item = RegistrySpec>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

fn compare_identity(a: &RegistrySpec, b: &RegistrySpec) -> Ordering {
    a.identity_key().cmp(&b.identity_key())
}

/// Insert `value` into a sorted list unless it is already present.
///
/// Returns `true` if the value was inserted.
pub fn insert_sorted_unique(list: &mut Vec<String>, value: String) -> bool {
    match list.binary_search(&value) {
        Ok(_) => false,
        Err(index) => {
            list.insert(index, value);
            true
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddonMirror {
    #[serde(default)]
    image_repo_mirror: String,
}

/// Image mirror host an addon asks the runtime to trust, if any.
///
/// Addons are not required to carry the field; configurations that do not
/// parse are skipped.
pub fn addon_mirror(addon: &Addon) -> Option<String> {
    match serde_json::from_value::<AddonMirror>(addon.config.clone()) {
        Ok(mirror) if !mirror.image_repo_mirror.is_empty() => Some(mirror.image_repo_mirror),
        Ok(_) => None,
        Err(e) => {
            debug!("Addon {} carries no image mirror: {}", addon.name, e);
            None
        }
    }
}

/// Sorted insecure hosts of a cluster, including addon image mirrors
pub fn insecure_hosts(cluster: &ClusterSpec) -> Vec<String> {
    let mut hosts = cluster.container_runtime.insecure_registry.clone();
    hosts.sort();
    hosts.dedup();
    for mirror in cluster.addons.iter().filter_map(addon_mirror) {
        insert_sorted_unique(&mut hosts, mirror);
    }
    hosts
}

/// Whether the recorded registry set differs from the desired one.
///
/// Both sides are expected in canonical order, so the comparison is
/// order-sensitive and structural.
pub fn needs_update(recorded: &[RegistrySpec], desired: &[RegistrySpec]) -> bool {
    recorded.len() != desired.len() || recorded.iter().zip(desired).any(|(a, b)| a != b)
}

/// Registries that carry credentials (rendered into the daemon config)
pub fn filter_with_auth(registries: &[RegistrySpec]) -> Vec<RegistrySpec> {
    registries
        .iter()
        .filter(|r| r.registry_auth.is_some())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{RegistryAuth, SCHEME_HTTP, SCHEME_HTTPS};
    use serde_json::json;

    fn keys(set: &RegistrySet) -> Vec<String> {
        set.as_slice().iter().map(RegistrySpec::identity_key).collect()
    }

    #[test]
    fn test_insert_keeps_sorted_and_unique() {
        let mut set = RegistrySet::new();
        for host in ["c.local", "a.local", "b.local", "a.local", "c.local"] {
            set.insert_insecure_host(host);
        }
        assert_eq!(set.len(), 6);

        let keys = keys(&set);
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_insert_is_order_independent() {
        let hosts = ["z.io", "docker.io", "10.0.0.1:5000", "quay.io"];
        let forward: RegistrySet = hosts
            .iter()
            .flat_map(|h| RegistrySpec::insecure_pair(h))
            .collect();
        let backward: RegistrySet = hosts
            .iter()
            .rev()
            .flat_map(|h| RegistrySpec::insecure_pair(h))
            .collect();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_duplicate_insert_keeps_first() {
        let mut set = RegistrySet::new();
        assert!(set.insert(RegistrySpec::https_insecure("harbor.local")));

        let with_ca = RegistrySpec {
            ca: "PEM".to_string(),
            ..RegistrySpec::https_insecure("harbor.local")
        };
        assert!(!set.insert(with_ca));
        assert!(set.as_slice()[0].ca.is_empty());
    }

    #[test]
    fn test_same_host_across_sources_dedups() {
        let mut set = RegistrySet::new();
        set.insert_insecure_host("x");
        set.insert_insecure_host("x");
        set.extend(RegistrySpec::insecure_pair("x"));

        assert_eq!(set.len(), 2);
        assert!(set.contains(SCHEME_HTTP, "x"));
        assert!(set.contains(SCHEME_HTTPS, "x"));
    }

    #[test]
    fn test_insert_sorted_unique() {
        let mut list = vec!["a".to_string(), "c".to_string()];
        assert!(insert_sorted_unique(&mut list, "b".to_string()));
        assert!(!insert_sorted_unique(&mut list, "c".to_string()));
        assert_eq!(list, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insecure_hosts_merges_addon_mirrors() {
        let mut cluster = ClusterSpec::default();
        cluster.container_runtime.insecure_registry =
            vec!["z.local".to_string(), "a.local".to_string()];
        cluster.addons = vec![
            Addon {
                name: "monitoring".to_string(),
                config: json!({ "imageRepoMirror": "m.local" }),
                ..Default::default()
            },
            Addon {
                name: "dup".to_string(),
                config: json!({ "imageRepoMirror": "a.local" }),
                ..Default::default()
            },
            Addon {
                name: "empty".to_string(),
                config: json!({ "imageRepoMirror": "" }),
                ..Default::default()
            },
            Addon {
                name: "opaque".to_string(),
                config: json!("not an object"),
                ..Default::default()
            },
            Addon {
                name: "wrong-type".to_string(),
                config: json!({ "imageRepoMirror": 42 }),
                ..Default::default()
            },
        ];

        assert_eq!(insecure_hosts(&cluster), vec!["a.local", "m.local", "z.local"]);
    }

    #[test]
    fn test_needs_update() {
        let a: Vec<_> = RegistrySpec::insecure_pair("a.local").into();
        assert!(!needs_update(&a, &a));
        assert!(!needs_update(&[], &[]));

        assert!(needs_update(&a, &a[..1]));
        assert!(needs_update(&[], &a));

        let mut changed = a.clone();
        changed[1].ca = "PEM".to_string();
        assert!(needs_update(&a, &changed));
    }

    #[test]
    fn test_filter_with_auth() {
        let with_auth = RegistrySpec {
            registry_auth: Some(RegistryAuth {
                username: "admin".to_string(),
                password: "secret".to_string(),
            }),
            ..RegistrySpec::https_insecure("harbor.local")
        };
        let registries = vec![RegistrySpec::http("plain.local"), with_auth.clone()];
        assert_eq!(filter_with_auth(&registries), vec![with_auth]);
    }
}
