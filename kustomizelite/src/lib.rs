//! A lightweight kustomize-compatible build engine: loads a
//! `kustomization.yaml`, recursively resolves resources, components, and
//! helm charts, and emits transformed resource documents.

pub mod batch;
mod build;
pub mod error;
pub mod helm;
pub mod jsonpatch;
pub mod manifest;
pub mod merge;
mod patch;
mod resource;
mod selector;
pub mod transform;
pub mod tree;
mod yaml;

use std::io::Write;
use std::path::{Path, PathBuf};

pub use self::build::{Kustomizer, KUSTOMIZATION_FILE};
pub use self::error::{Error, Errors, Result};
pub use self::patch::PatchObject;
pub use self::resource::Resource;
pub use self::selector::Selector;

/// Builds the kustomization at `path` and writes the document stream to
/// `out`. Nothing is written unless the whole load succeeded.
pub fn build(
    path: impl AsRef<Path>,
    helm_values_files: &[PathBuf],
    out: &mut dyn Write,
) -> Result<()> {
    let kustomizer = Kustomizer::new(helm_values_files)?;
    build_with(&kustomizer, path.as_ref(), out)
}

/// As [`build`], with an explicitly constructed [`Kustomizer`] (tests
/// inject a fake helm templater this way).
pub fn build_with(kustomizer: &Kustomizer, path: &Path, out: &mut dyn Write) -> Result<()> {
    let (resources, errors) = kustomizer.kustomize(path)?;
    errors.into_result()?;
    yaml::write_documents(out, &resources)
}
