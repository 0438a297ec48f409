//! The slice of the Kubernetes object model the canary lifecycle reads.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// `spec.clusterIP` value that marks a headless service.
pub const CLUSTER_IP_NONE: &str = "None";

/// A Kubernetes `Service`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub cluster_ip: String,
    /// Pod label selector; an empty selector selects everything.
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
}

impl Service {
    /// True when the service has no virtual IP.
    pub fn is_headless(&self) -> bool {
        self.cluster_ip == CLUSTER_IP_NONE
    }

    /// The service selector as a [`LabelSelector`].
    pub fn label_selector(&self) -> LabelSelector {
        LabelSelector::new(self.selector.clone())
    }
}

/// A Kubernetes `apps/v1` `Deployment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub namespace: String,
    /// `spec.replicas`; the API server defaults an unset value to 1.
    #[serde(default)]
    pub replicas: Option<i32>,
    /// Labels on the pod template (`spec.template.metadata.labels`).
    #[serde(default)]
    pub template_labels: BTreeMap<String, String>,
}

impl Deployment {
    /// Desired replica count with the API server default applied.
    pub fn desired_replicas(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }
}

/// Equality-based label selector (`k1=v1,k2=v2`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSelector(BTreeMap<String, String>);

impl LabelSelector {
    pub fn new(requirements: BTreeMap<String, String>) -> Self {
        Self(requirements)
    }

    /// Every requirement must be present with an equal value.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn selector_matches_superset_of_labels() {
        let selector = LabelSelector::new(labels(&[("app", "web")]));
        assert!(selector.matches(&labels(&[("app", "web"), ("tier", "front")])));
        assert!(!selector.matches(&labels(&[("app", "api")])));
        assert!(!selector.matches(&labels(&[("tier", "front")])));
    }

    #[test]
    fn empty_selector_matches_everything() {
        let selector = LabelSelector::default();
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn selector_renders_sorted_requirements() {
        let selector = LabelSelector::new(labels(&[("tier", "front"), ("app", "web")]));
        assert_eq!(selector.to_string(), "app=web,tier=front");
    }

    #[test]
    fn headless_service_is_detected() {
        let service = Service {
            name: "db".into(),
            namespace: "prod".into(),
            cluster_ip: "None".into(),
            selector: BTreeMap::new(),
        };
        assert!(service.is_headless());
    }

    #[test]
    fn unset_replicas_default_to_one() {
        let deployment = Deployment {
            name: "web".into(),
            namespace: "prod".into(),
            replicas: None,
            template_labels: BTreeMap::new(),
        };
        assert_eq!(deployment.desired_replicas(), 1);
    }
}
