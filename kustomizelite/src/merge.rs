//! Strategic merge: a recursive mapping deep-merge with typed list rules.
//!
//! Kubernetes API conventions identify "the same element" in object lists by
//! a merge key (`name` for containers, `containerPort` for ports, ...). The
//! preference list below captures real manifests without an OpenAPI schema.

use indexmap::{IndexMap, IndexSet};
use serde_yaml::mapping::Entry;
use serde_yaml::{Mapping, Sequence, Value};

const MERGE_KEY_PREFERENCE: [&str; 9] = [
    "name",
    "key",
    "type",
    "kind",
    "mountPath",
    "containerPort",
    "devicePath",
    "ip",
    "topologyKey",
];

/// Merges `patch` into `resource` in place. Patch substructures are cloned,
/// never aliased, so the patch can be reused across resources.
pub fn apply(resource: &mut Mapping, patch: &Mapping) {
    merge_mappings(resource, patch);
}

fn merge_mappings(resource: &mut Mapping, patch: &Mapping) {
    for (key, value) in patch {
        if value.is_null() {
            resource.remove(key);
            continue;
        }

        match resource.entry(key.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(value.clone());
            }
            Entry::Occupied(mut entry) => match (entry.get_mut(), value) {
                (Value::Mapping(existing), Value::Mapping(patch_value)) => {
                    merge_mappings(existing, patch_value);
                }
                (Value::Sequence(existing), Value::Sequence(patch_value)) => {
                    let merged = merge_sequences(existing, patch_value);
                    *existing = merged;
                }
                (existing, patch_value) => *existing = patch_value.clone(),
            },
        }
    }
}

fn merge_sequences(existing: &Sequence, patch: &Sequence) -> Sequence {
    if existing.is_empty() {
        return patch.clone();
    }
    if patch.is_empty() {
        return existing.clone();
    }

    let Some(kind) = common_element_type(existing, patch) else {
        // Mixed or disagreeing element types: the patch replaces wholesale.
        return patch.clone();
    };

    if kind == ElementType::Mapping {
        return merge_object_lists(existing, patch);
    }

    // Scalars of one type: concatenate, deduplicating by value with first
    // occurrence order (existing before patch).
    let mut merged: IndexSet<Value> = IndexSet::with_capacity(existing.len() + patch.len());
    for item in existing.iter().chain(patch) {
        merged.insert(item.clone());
    }
    merged.into_iter().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementType {
    Mapping,
    String,
    Int,
    Float,
    Bool,
    Other,
}

fn element_type(value: &Value) -> ElementType {
    match value {
        Value::Mapping(_) => ElementType::Mapping,
        Value::String(_) => ElementType::String,
        Value::Number(number) if number.is_f64() => ElementType::Float,
        Value::Number(_) => ElementType::Int,
        Value::Bool(_) => ElementType::Bool,
        _ => ElementType::Other,
    }
}

fn common_element_type(existing: &Sequence, patch: &Sequence) -> Option<ElementType> {
    let kind = element_type(&existing[0]);
    if element_type(&patch[0]) != kind {
        return None;
    }
    existing
        .iter()
        .chain(patch)
        .all(|item| element_type(item) == kind)
        .then_some(kind)
}

fn merge_object_lists(existing: &Sequence, patch: &Sequence) -> Sequence {
    let Some(merge_key) = find_merge_key(existing, patch) else {
        return patch.clone();
    };

    let mut result: Vec<Value> = existing.to_vec();
    let mut seen: IndexMap<String, usize> = IndexMap::new();
    for (index, item) in result.iter().enumerate() {
        let key_value = item
            .as_mapping()
            .and_then(|m| m.get(merge_key.as_str()))
            .and_then(Value::as_str);
        if let Some(key_value) = key_value {
            seen.insert(key_value.to_string(), index);
        }
    }

    for item in patch {
        // Non-string merge-key values never match; such elements append.
        let matched = item
            .as_mapping()
            .and_then(|m| m.get(merge_key.as_str()))
            .and_then(Value::as_str)
            .and_then(|key_value| seen.get(key_value).copied());
        match matched {
            Some(index) => {
                if let (Some(Value::Mapping(into)), Some(from)) =
                    (result.get_mut(index), item.as_mapping())
                {
                    merge_mappings(into, from);
                }
            }
            None => result.push(item.clone()),
        }
    }

    result
}

/// The merge key is the first preferred key present in every element on both
/// sides; failing that, the lexicographically smallest common key.
fn find_merge_key(existing: &Sequence, patch: &Sequence) -> Option<String> {
    let first = existing.first()?.as_mapping()?;
    let mut common: Vec<&str> = first.iter().filter_map(|(key, _)| key.as_str()).collect();

    for item in existing.iter().chain(patch).skip(1) {
        let mapping = item.as_mapping()?;
        common.retain(|key| mapping.contains_key(*key));
        if common.is_empty() {
            return None;
        }
    }

    for key in MERGE_KEY_PREFERENCE {
        if common.contains(&key) {
            return Some(key.to_string());
        }
    }

    common.sort_unstable();
    common.first().map(|key| key.to_string())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn mapping(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    fn merged(resource: &str, patch: &str) -> Mapping {
        let mut resource = mapping(resource);
        apply(&mut resource, &mapping(patch));
        resource
    }

    #[test]
    fn empty_patch_is_identity() {
        let resource = "kind: ConfigMap\ndata:\n  k: v\n";
        assert_eq!(merged(resource, "{}"), mapping(resource));
    }

    #[test]
    fn scalars_overwrite() {
        let result = merged("spec:\n  replicas: 3\n", "spec:\n  replicas: 5\n");
        assert_eq!(result, mapping("spec:\n  replicas: 5\n"));
    }

    #[test]
    fn explicit_null_deletes() {
        let result = merged(
            "metadata:\n  labels:\n    a: x\n    b: y\n",
            "metadata:\n  labels:\n    a: null\n",
        );
        assert_eq!(result, mapping("metadata:\n  labels:\n    b: y\n"));
    }

    #[test]
    fn nested_mappings_merge() {
        let result = merged(
            "spec:\n  selector:\n    app: web\n",
            "spec:\n  strategy:\n    type: Recreate\n",
        );
        assert_eq!(
            result,
            mapping("spec:\n  selector:\n    app: web\n  strategy:\n    type: Recreate\n")
        );
    }

    #[test]
    fn scalar_sequences_deduplicate() {
        let result = merged("finalizers: [a, b]\n", "finalizers: [b, c]\n");
        assert_eq!(result, mapping("finalizers: [a, b, c]\n"));
    }

    #[test]
    fn disagreeing_element_types_replace() {
        let result = merged("items: [a, b]\n", "items: [1, 2]\n");
        assert_eq!(result, mapping("items: [1, 2]\n"));
    }

    #[test]
    fn heterogeneous_side_replaces() {
        let result = merged("items: [a, b]\n", "items: [c, 3]\n");
        assert_eq!(result, mapping("items: [c, 3]\n"));
    }

    #[test]
    fn sequence_against_scalar_overwrites() {
        let result = merged("value: [a]\n", "value: plain\n");
        assert_eq!(result, mapping("value: plain\n"));
    }

    #[test]
    fn object_list_merges_by_name() {
        let result = merged(
            indoc! {"
                spec:
                  containers:
                    - name: app
                      image: app:v1
                      ports:
                        - 8080
                    - name: sidecar
                      image: sidecar:v1
            "},
            indoc! {"
                spec:
                  containers:
                    - name: app
                      image: app:v2
                      env:
                        - X=1
                    - name: cache
                      image: cache:v1
            "},
        );

        assert_eq!(
            result,
            mapping(indoc! {"
                spec:
                  containers:
                    - name: app
                      image: app:v2
                      ports:
                        - 8080
                      env:
                        - X=1
                    - name: sidecar
                      image: sidecar:v1
                    - name: cache
                      image: cache:v1
            "})
        );
    }

    #[test]
    fn object_list_unique_matches_preserve_length() {
        let result = merged(
            "items:\n  - {name: a, v: 1}\n  - {name: b, v: 2}\n",
            "items:\n  - {name: b, v: 20}\n  - {name: a, v: 10}\n",
        );
        assert_eq!(
            result,
            mapping("items:\n  - {name: a, v: 10}\n  - {name: b, v: 20}\n")
        );
    }

    #[test]
    fn object_list_without_common_keys_replaces() {
        let result = merged(
            "items:\n  - {name: a}\n",
            "items:\n  - {id: b}\n",
        );
        assert_eq!(result, mapping("items:\n  - {id: b}\n"));
    }

    #[test]
    fn non_string_merge_key_appends() {
        let result = merged(
            "items:\n  - {name: 1, v: old}\n",
            "items:\n  - {name: 1, v: new}\n",
        );
        assert_eq!(
            result,
            mapping("items:\n  - {name: 1, v: old}\n  - {name: 1, v: new}\n")
        );
    }

    #[test]
    fn merge_key_prefers_name_over_other_common_keys() {
        let result = merged(
            "items:\n  - {key: shared, name: a, v: 1}\n",
            "items:\n  - {key: other, name: a, v: 2}\n",
        );
        // Merged by `name`, not appended under a differing `key`.
        assert_eq!(result, mapping("items:\n  - {key: other, name: a, v: 2}\n"));
    }

    #[test]
    fn merge_key_fallback_is_lexicographic() {
        let result = merged(
            "items:\n  - {zz: a, aa: a, v: 1}\n",
            "items:\n  - {zz: b, aa: a, v: 2}\n",
        );
        // No preferred key: `aa` < `zz`, so elements merge on `aa`.
        assert_eq!(result, mapping("items:\n  - {zz: b, aa: a, v: 2}\n"));
    }

    #[test]
    fn apply_is_idempotent() {
        let patch = mapping(indoc! {"
            spec:
              containers:
                - name: app
                  image: app:v2
              args: [--verbose]
        "});
        let mut once = mapping(indoc! {"
            spec:
              containers:
                - name: app
                  image: app:v1
                - name: sidecar
                  image: s:v1
              args: [--quiet]
        "});
        apply(&mut once, &patch);
        let mut twice = once.clone();
        apply(&mut twice, &patch);
        assert_eq!(twice, once);
    }
}
