use indexmap::IndexMap;

use crate::error::Errors;
use crate::manifest::Str;
use crate::resource::Resource;
use crate::tree;

use super::Transformer;

/// Merges common labels into `metadata.labels`; common labels win over
/// pre-existing keys.
pub struct LabelTransformer<'a>(pub &'a IndexMap<Str, Str>);

impl Transformer for LabelTransformer<'_> {
    #[tracing::instrument(skip_all, name = "label_transform", fields(labels = self.0.len()))]
    fn transform(&mut self, resources: &mut [Resource], errors: &mut Errors) {
        for resource in resources.iter_mut() {
            if let Err(err) = tree::merge_string_map(resource.root_mut(), "metadata.labels", self.0)
            {
                errors.push(err.context("merging common labels on resource"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_and_preserves_existing() {
        let mut resources = vec![serde_yaml::from_str::<Resource>(
            "kind: Service\nmetadata:\n  labels:\n    component: backend\n",
        )
        .unwrap()];
        let mut labels = IndexMap::new();
        labels.insert(Str::from("app"), Str::from("myapp"));
        labels.insert(Str::from("environment"), Str::from("production"));

        let mut errors = Errors::new();
        LabelTransformer(&labels).transform(&mut resources, &mut errors);

        assert!(errors.is_empty());
        let map = tree::get_string_map(resources[0].root(), "metadata.labels").unwrap();
        assert_eq!(map.get("component").map(Str::as_str), Some("backend"));
        assert_eq!(map.get("app").map(Str::as_str), Some("myapp"));
        assert_eq!(map.get("environment").map(Str::as_str), Some("production"));
    }

    #[test]
    fn common_labels_win() {
        let mut resources = vec![serde_yaml::from_str::<Resource>(
            "kind: Service\nmetadata:\n  labels:\n    app: old\n",
        )
        .unwrap()];
        let mut labels = IndexMap::new();
        labels.insert(Str::from("app"), Str::from("new"));

        LabelTransformer(&labels).transform(&mut resources, &mut Errors::new());
        let map = tree::get_string_map(resources[0].root(), "metadata.labels").unwrap();
        assert_eq!(map.get("app").map(Str::as_str), Some("new"));
    }
}
