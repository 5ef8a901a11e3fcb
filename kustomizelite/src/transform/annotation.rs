use indexmap::IndexMap;

use crate::error::Errors;
use crate::manifest::Str;
use crate::resource::Resource;
use crate::tree;

use super::Transformer;

/// Merges common annotations into `metadata.annotations`.
pub struct AnnotationTransformer<'a>(pub &'a IndexMap<Str, Str>);

impl Transformer for AnnotationTransformer<'_> {
    #[tracing::instrument(skip_all, name = "annotation_transform", fields(annotations = self.0.len()))]
    fn transform(&mut self, resources: &mut [Resource], errors: &mut Errors) {
        for resource in resources.iter_mut() {
            if let Err(err) =
                tree::merge_string_map(resource.root_mut(), "metadata.annotations", self.0)
            {
                errors.push(err.context("merging common annotations on resource"));
            }
        }
    }
}
