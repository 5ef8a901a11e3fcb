use std::path::Path;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use crate::error::{Context as _, Error, Result};
use crate::jsonpatch::{self, PatchOp};
use crate::manifest::PatchTarget;
use crate::merge;
use crate::resource::Resource;
use crate::selector::Selector;
use crate::{tree, yaml};

/// A parsed patch, created once per declaration and reused across every
/// targeted resource.
#[derive(Debug, Clone)]
pub enum PatchObject {
    Json(Vec<PatchOp>),
    StrategicMerge(Mapping),
}

impl PatchObject {
    /// Parses a patch document.
    ///
    /// A document is a JSON patch iff it is a sequence and every element
    /// validates as an operation (string `op` and `path`, plus what the op
    /// requires); anything else must be a mapping and is treated as a
    /// strategic merge. A strategic-merge patch that happens to be a
    /// sequence of op-shaped mappings is therefore indistinguishable from a
    /// JSON patch; the sequence form is reserved for operations.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(Error::Patch("patch is empty".to_string()));
        }

        let document: Value = yaml::from_str(text, "patch YAML")?;
        match document {
            Value::Sequence(items) => {
                let ops = items
                    .iter()
                    .map(PatchOp::from_value)
                    .collect::<Result<Vec<_>>>()
                    .context("parsing json patch")?;
                Ok(PatchObject::Json(ops))
            }
            Value::Mapping(mapping) => Ok(PatchObject::StrategicMerge(mapping)),
            _ => Err(Error::Patch(
                "patch is neither a json patch nor a strategic merge patch".to_string(),
            )),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading patch file {}", path.display()))?;
        Self::parse(&content)
    }

    /// Applies the patch to one resource, returning the patched copy. The
    /// input resource is untouched on failure.
    pub fn apply(&self, resource: &Resource) -> Result<Resource> {
        match self {
            PatchObject::Json(ops) => {
                let mut doc = Value::Mapping(resource.root().clone());
                jsonpatch::apply_all(ops, &mut doc)?;
                match doc {
                    Value::Mapping(root) => Ok(Resource::new(root)),
                    _ => Err(Error::Patch(
                        "json patch replaced the resource with a non-mapping".to_string(),
                    )),
                }
            }
            PatchObject::StrategicMerge(patch) => {
                let mut root = resource.root().clone();
                merge::apply(&mut root, patch);
                Ok(Resource::new(root))
            }
        }
    }
}

/// Matching for declared patch targets: every populated field must match.
pub fn matches_target(target: &PatchTarget, resource: &Resource) -> bool {
    if let Some(kind) = populated(&target.kind) {
        if resource.kind() != Some(kind) {
            return false;
        }
    }

    if let Some(name) = populated(&target.name) {
        if resource.name() != Some(name) {
            return false;
        }
    }

    if let Some(namespace) = populated(&target.namespace) {
        if resource.namespace() != Some(namespace) {
            return false;
        }
    }

    let want_group = populated(&target.group);
    let want_version = populated(&target.version);
    if want_group.is_some() || want_version.is_some() {
        let Some((group, version)) = resource.group_version() else {
            return false;
        };
        if want_group.is_some_and(|want| want != group) {
            return false;
        }
        if want_version.is_some_and(|want| want != version) {
            return false;
        }
    }

    if let Some(selector) = populated(&target.label_selector) {
        if !selector_matches(selector, resource, "metadata.labels") {
            return false;
        }
    }

    if let Some(selector) = populated(&target.annotation_selector) {
        if !selector_matches(selector, resource, "metadata.annotations") {
            return false;
        }
    }

    true
}

fn populated(field: &Option<crate::manifest::Str>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

fn selector_matches(selector_text: &str, resource: &Resource, path: &str) -> bool {
    let Ok(selector) = selector_text.parse::<Selector>() else {
        return false;
    };
    // Missing labels/annotations are an empty map; malformed ones never match.
    let map = if tree::has(resource.root(), path) {
        match tree::get_string_map(resource.root(), path) {
            Ok(map) => map,
            Err(_) => return false,
        }
    } else {
        IndexMap::new()
    };
    selector.matches(&map)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::manifest::Str;

    fn resource(text: &str) -> Resource {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn detects_json_patch() {
        let patch = PatchObject::parse(indoc! {"
            - op: replace
              path: /spec/replicas
              value: 5
            - op: remove
              path: /spec/template
        "})
        .unwrap();
        assert!(matches!(patch, PatchObject::Json(ref ops) if ops.len() == 2));
    }

    #[test]
    fn detects_strategic_merge() {
        let patch = PatchObject::parse("metadata:\n  labels:\n    app: web\n").unwrap();
        assert!(matches!(patch, PatchObject::StrategicMerge(_)));
    }

    #[test]
    fn empty_json_patch_is_valid() {
        let patch = PatchObject::parse("[]").unwrap();
        assert!(matches!(patch, PatchObject::Json(ref ops) if ops.is_empty()));
    }

    #[test]
    fn op_shaped_sequence_with_invalid_element_fails() {
        // A sequence that is not entirely operations is not a strategic
        // merge either.
        assert!(PatchObject::parse("- op: replace\n  path: /a\n  value: 1\n- name: x\n").is_err());
    }

    #[test]
    fn empty_patch_fails() {
        assert!(PatchObject::parse("").is_err());
        assert!(PatchObject::parse("   \n").is_err());
    }

    #[test]
    fn scalar_patch_fails() {
        assert!(PatchObject::parse("42").is_err());
    }

    #[test]
    fn apply_json_patch() {
        let patch = PatchObject::parse("- op: replace\n  path: /spec/replicas\n  value: 5\n").unwrap();
        let patched = patch
            .apply(&resource("spec:\n  replicas: 3\n"))
            .unwrap();
        assert_eq!(patched, resource("spec:\n  replicas: 5\n"));
    }

    #[test]
    fn failed_json_patch_leaves_resource_untouched() {
        let patch = PatchObject::parse("- op: remove\n  path: /missing\n").unwrap();
        let original = resource("spec: {}\n");
        assert!(patch.apply(&original).is_err());
        assert_eq!(original, resource("spec: {}\n"));
    }

    #[test]
    fn apply_strategic_merge() {
        let patch = PatchObject::parse("metadata:\n  labels:\n    app: web\n").unwrap();
        let patched = patch
            .apply(&resource("metadata:\n  name: c\n"))
            .unwrap();
        assert_eq!(
            patched,
            resource("metadata:\n  name: c\n  labels:\n    app: web\n")
        );
    }

    fn target(text: &str) -> PatchTarget {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn target_kind_name_namespace() {
        let deployment = resource(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: app\n  namespace: prod\n",
        );
        assert!(matches_target(&target("kind: Deployment"), &deployment));
        assert!(!matches_target(&target("kind: Service"), &deployment));
        assert!(matches_target(&target("name: app"), &deployment));
        assert!(!matches_target(&target("name: other"), &deployment));
        assert!(matches_target(
            &target("kind: Deployment\nname: app\nnamespace: prod"),
            &deployment
        ));
        assert!(!matches_target(&target("namespace: dev"), &deployment));
    }

    #[test]
    fn target_group_version() {
        let deployment = resource("apiVersion: apps/v1\nkind: Deployment\n");
        assert!(matches_target(&target("group: apps"), &deployment));
        assert!(matches_target(&target("version: v1"), &deployment));
        assert!(!matches_target(&target("group: batch"), &deployment));

        let config_map = resource("apiVersion: v1\nkind: ConfigMap\n");
        assert!(matches_target(&target("version: v1"), &config_map));
        assert!(matches_target(&target("group: \"\""), &config_map));
        assert!(!matches_target(&target("group: apps"), &config_map));
    }

    #[test]
    fn target_without_api_version_never_matches_group_or_version() {
        let bare = resource("kind: ConfigMap\n");
        assert!(!matches_target(&target("group: apps"), &bare));
        assert!(!matches_target(&target("version: v1"), &bare));
        assert!(matches_target(&target("kind: ConfigMap"), &bare));
    }

    #[test]
    fn target_label_selector() {
        let labeled = resource("kind: Service\nmetadata:\n  labels:\n    app: web\n");
        assert!(matches_target(&target("labelSelector: app=web"), &labeled));
        assert!(!matches_target(&target("labelSelector: app=db"), &labeled));

        let unlabeled = resource("kind: Service\n");
        assert!(!matches_target(&target("labelSelector: app=web"), &unlabeled));
        assert!(matches_target(&target("labelSelector: \"!app\""), &unlabeled));
    }

    #[test]
    fn target_annotation_selector() {
        let annotated =
            resource("kind: Service\nmetadata:\n  annotations:\n    team: platform\n");
        assert!(matches_target(
            &target("annotationSelector: team=platform"),
            &annotated
        ));
        assert!(!matches_target(
            &target("annotationSelector: team=web"),
            &annotated
        ));
    }

    #[test]
    fn target_all_fields_conjoin() {
        let deployment = resource(indoc! {"
            apiVersion: apps/v1
            kind: Deployment
            metadata:
              name: app
              labels:
                app: web
        "});
        assert!(matches_target(
            &target("kind: Deployment\nlabelSelector: app=web"),
            &deployment
        ));
        assert!(!matches_target(
            &target("kind: Deployment\nlabelSelector: app=db"),
            &deployment
        ));
    }

    #[test]
    fn empty_target_fields_are_unset() {
        let deployment = resource("kind: Deployment\n");
        let target = PatchTarget {
            kind: Some(Str::from("")),
            ..PatchTarget::default()
        };
        assert!(matches_target(&target, &deployment));
    }
}
