use crate::error::Errors;
use crate::resource::Resource;
use crate::tree;

use super::Transformer;

/// Sets `metadata.namespace` on every resource, overwriting any existing
/// value.
pub struct NamespaceTransformer<'a>(pub &'a str);

impl Transformer for NamespaceTransformer<'_> {
    #[tracing::instrument(skip_all, name = "namespace_transform", fields(namespace = self.0))]
    fn transform(&mut self, resources: &mut [Resource], errors: &mut Errors) {
        for resource in resources.iter_mut() {
            if let Err(err) = tree::set(resource.root_mut(), "metadata.namespace", self.0) {
                errors.push(err.context("setting namespace on resource"));
            }
        }
    }
}
