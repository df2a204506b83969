//! Node queries

use crds::LABEL_CLUSTER_NAME;
use std::collections::BTreeMap;

/// Label based node query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeQuery {
    /// Required label values
    pub labels: BTreeMap<String, String>,
}

impl NodeQuery {
    /// Nodes labeled as members of `cluster`
    pub fn for_cluster(cluster: &str) -> Self {
        Self::default().with_label(LABEL_CLUSTER_NAME, cluster)
    }

    /// Add a required label
    #[must_use]
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Render as a Kubernetes label selector (`k1=v1,k2=v2`)
    pub fn label_selector(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether a label map satisfies this query
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_selector() {
        let query = NodeQuery::for_cluster("prod");
        assert_eq!(query.label_selector(), "nodesmith.io/cluster-name=prod");
    }

    #[test]
    fn test_matches_requires_every_label() {
        let query = NodeQuery::for_cluster("prod").with_label("role", "worker");
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_CLUSTER_NAME.to_string(), "prod".to_string());
        assert!(!query.matches(&labels));

        labels.insert("role".to_string(), "worker".to_string());
        assert!(query.matches(&labels));

        labels.insert(LABEL_CLUSTER_NAME.to_string(), "staging".to_string());
        assert!(!query.matches(&labels));
    }
}
