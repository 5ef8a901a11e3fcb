use std::path::Path;

use crate::error::{Context as _, Error, Errors, Result};
use crate::manifest::PatchDecl;
use crate::patch::{matches_target, PatchObject};
use crate::resource::Resource;

use super::Transformer;

/// Applies declared patches in order. Each patch is parsed once; every
/// matching resource is replaced by its patched result. Failures accumulate
/// per (patch, resource) pair and never stop later patches.
pub struct PatchTransformer<'a> {
    base_dir: &'a Path,
    patches: &'a [PatchDecl],
}

impl<'a> PatchTransformer<'a> {
    pub fn new(base_dir: &'a Path, patches: &'a [PatchDecl]) -> Self {
        Self { base_dir, patches }
    }
}

impl Transformer for PatchTransformer<'_> {
    #[tracing::instrument(skip_all, name = "patch_transform", fields(patches = self.patches.len()))]
    fn transform(&mut self, resources: &mut [Resource], errors: &mut Errors) {
        for decl in self.patches {
            let object = match load_patch(self.base_dir, decl) {
                Ok(object) => object,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };

            for (index, resource) in resources.iter_mut().enumerate() {
                let matches = decl
                    .target
                    .as_ref()
                    .map_or(true, |target| matches_target(target, resource));
                if !matches {
                    continue;
                }

                match object.apply(resource) {
                    Ok(patched) => *resource = patched,
                    Err(err) => errors
                        .push(err.context(format!("applying patch to resource {index}"))),
                }
            }
        }
    }
}

fn load_patch(base_dir: &Path, decl: &PatchDecl) -> Result<PatchObject> {
    match &decl.path {
        Some(path) => PatchObject::from_file(&base_dir.join(path))
            .with_context(|| format!("loading patch from file {}", path.display())),
        None => match &decl.patch {
            Some(text) => PatchObject::parse(text).context("parsing patch"),
            None => Err(Error::Patch(
                "patch declares neither `path` nor `patch`".to_string(),
            )),
        },
    }
}
