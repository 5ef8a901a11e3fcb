use crate::error::{Context as _, Errors, Result};
use crate::resource::Resource;
use crate::tree;

use super::Transformer;

const NAME_FIELDS: [&str; 2] = ["metadata.name", "metadata.generateName"];

/// Rewrites `metadata.name` and `metadata.generateName` through a mapping
/// function; used for both namePrefix and nameSuffix.
pub struct NameTransformer<F> {
    f: F,
}

impl<F: FnMut(&str) -> String> NameTransformer<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: FnMut(&str) -> String> Transformer for NameTransformer<F> {
    #[tracing::instrument(skip_all, name = "name_transform")]
    fn transform(&mut self, resources: &mut [Resource], errors: &mut Errors) {
        for resource in resources.iter_mut() {
            if let Err(err) = rename(resource, &mut self.f) {
                errors.push(err);
            }
        }
    }
}

fn rename(resource: &mut Resource, f: &mut impl FnMut(&str) -> String) -> Result<()> {
    if !tree::has(resource.root(), "metadata") {
        return Ok(());
    }

    for field in NAME_FIELDS {
        if !tree::has(resource.root(), field) {
            continue;
        }

        let name = tree::get::<String>(resource.root(), field)
            .with_context(|| format!("getting {field}"))?;
        if !name.is_empty() {
            tree::set(resource.root_mut(), field, f(&name))
                .with_context(|| format!("setting {field}"))?;
        }
    }

    Ok(())
}
