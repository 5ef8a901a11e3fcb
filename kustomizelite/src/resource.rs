use core::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::tree;

/// A Kubernetes API object as a raw mapping tree, the unit of output. No
/// fields are required: transforms and patches address whatever is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource {
    root: Mapping,
}

impl Resource {
    pub fn new(root: Mapping) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Mapping {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Mapping {
        &mut self.root
    }

    pub fn into_root(self) -> Mapping {
        self.root
    }

    pub fn kind(&self) -> Option<&str> {
        tree::get(&self.root, "kind").ok()
    }

    pub fn api_version(&self) -> Option<&str> {
        tree::get(&self.root, "apiVersion").ok()
    }

    pub fn name(&self) -> Option<&str> {
        tree::get(&self.root, "metadata.name").ok()
    }

    pub fn namespace(&self) -> Option<&str> {
        tree::get(&self.root, "metadata.namespace").ok()
    }

    /// Splits `apiVersion` into (group, version): the substring before the
    /// slash is the group, empty for core-group resources. `None` when
    /// `apiVersion` is absent or malformed.
    pub fn group_version(&self) -> Option<(&str, &str)> {
        let api_version = self.api_version()?;
        match api_version.matches('/').count() {
            0 => Some(("", api_version)),
            1 => api_version.split_once('/'),
            _ => None,
        }
    }
}

impl From<Mapping> for Resource {
    fn from(root: Mapping) -> Self {
        Self::new(root)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind(), self.name()) {
            (Some(kind), Some(name)) => write!(f, "{kind}/{name}"),
            (Some(kind), None) => write!(f, "{kind}"),
            (None, Some(name)) => write!(f, "{name}"),
            (None, None) => write!(f, "<unnamed>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(text: &str) -> Resource {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn field_helpers() {
        let resource = resource(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: app\n  namespace: prod\n",
        );
        assert_eq!(resource.kind(), Some("Deployment"));
        assert_eq!(resource.name(), Some("app"));
        assert_eq!(resource.namespace(), Some("prod"));
        assert_eq!(resource.group_version(), Some(("apps", "v1")));
    }

    #[test]
    fn core_group_version() {
        let resource = resource("apiVersion: v1\nkind: ConfigMap\n");
        assert_eq!(resource.group_version(), Some(("", "v1")));
    }

    #[test]
    fn malformed_api_version() {
        assert_eq!(resource("apiVersion: a/b/c\nkind: ConfigMap\n").group_version(), None);
        assert_eq!(resource("kind: ConfigMap\n").group_version(), None);
    }

    #[test]
    fn rejects_non_mapping_documents() {
        assert!(serde_yaml::from_str::<Resource>("null").is_err());
        assert!(serde_yaml::from_str::<Resource>("- a\n- b\n").is_err());
    }
}
