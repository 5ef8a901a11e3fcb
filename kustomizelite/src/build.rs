//! The loader and recursion engine: resolves a kustomization's resources,
//! helm charts, and components into a flat resource list, then runs the
//! transform pipeline over it.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::{Context as _, Error, Errors, Result};
use crate::helm::{HelmTemplater, Templater};
use crate::manifest::Kustomization;
use crate::resource::Resource;
use crate::transform::{
    AnnotationTransformer, LabelTransformer, NameTransformer, NamespaceTransformer,
    PatchTransformer, Transformer,
};
use crate::yaml;

pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

pub struct Kustomizer {
    templater: Box<dyn Templater>,
}

impl Kustomizer {
    pub fn new(global_helm_values_files: &[PathBuf]) -> Result<Self> {
        Ok(Self::with_templater(Box::new(HelmTemplater::from_env(
            global_helm_values_files,
        )?)))
    }

    pub fn with_templater(templater: Box<dyn Templater>) -> Self {
        Self { templater }
    }

    /// Loads and transforms one kustomization.
    ///
    /// Fatal failures (the top-level stat, a wrong filename, the
    /// kustomization's own YAML) are the `Err` case. Everything else — a
    /// broken resource, chart, component, or patch — accumulates into the
    /// returned [`Errors`] alongside the possibly-partial output; callers
    /// decide whether partial output is usable.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn kustomize(&self, path: &Path) -> Result<(Vec<Resource>, Errors)> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("stat'ing path {}", path.display()))?;
        if metadata.is_dir() {
            return self.kustomize(&path.join(KUSTOMIZATION_FILE));
        }

        if path.file_name() != Some(OsStr::new(KUSTOMIZATION_FILE)) {
            return Err(Error::NotAKustomization(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading file {}", path.display()))?;
        let kustomization: Kustomization = yaml::from_str(&content, "Kustomization YAML")?;

        let base_dir = path.parent().unwrap_or(Path::new("."));
        let mut resources = Vec::new();
        let mut errors = Errors::new();

        for entry in &kustomization.resources {
            match self.load_resource(&base_dir.join(entry)) {
                Ok(loaded) => resources.extend(loaded),
                Err(err) => errors.push(
                    err.context(format_args!("processing resource {}", entry.display())),
                ),
            }
        }

        for chart in &kustomization.helm_charts {
            match self
                .templater
                .template(base_dir, chart, kustomization.helm_globals.as_ref())
            {
                Ok(rendered) => resources.extend(rendered),
                Err(err) => errors
                    .push(err.context(format_args!("processing helm chart {}", chart.name))),
            }
        }

        for component in &kustomization.components {
            match self.load_component(&base_dir.join(component)) {
                Ok(loaded) => resources.extend(loaded),
                Err(err) => errors.push(
                    err.context(format_args!("processing component {}", component.display())),
                ),
            }
        }

        self.apply_transforms(&kustomization, base_dir, &mut resources, &mut errors);
        tracing::debug!(resources = resources.len(), errors = errors.len(), "kustomized");

        Ok((resources, errors))
    }

    /// A `resources` entry: a directory recurses as a nested kustomization,
    /// a file is one YAML mapping document.
    fn load_resource(&self, path: &Path) -> Result<Vec<Resource>> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("stat'ing resource {}", path.display()))?;

        if metadata.is_dir() {
            return self
                .load_nested(path)
                .with_context(|| format!("kustomizing directory {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading file {}", path.display()))?;
        let resource: Resource = yaml::from_str(&content, "YAML")?;
        Ok(vec![resource])
    }

    fn load_component(&self, path: &Path) -> Result<Vec<Resource>> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("stat'ing resource {}", path.display()))?;
        if !metadata.is_dir() {
            return Err(Error::Invalid(format!(
                "component {} is not a directory",
                path.display()
            )));
        }

        self.load_nested(path)
            .with_context(|| format!("kustomizing component directory {}", path.display()))
    }

    /// A nested kustomization contributes its output only when it loaded
    /// cleanly; its accumulated errors surface as one error here.
    fn load_nested(&self, path: &Path) -> Result<Vec<Resource>> {
        let (resources, errors) = self.kustomize(path)?;
        errors.into_result()?;
        Ok(resources)
    }

    fn apply_transforms(
        &self,
        kustomization: &Kustomization,
        base_dir: &Path,
        resources: &mut Vec<Resource>,
        errors: &mut Errors,
    ) {
        if let Some(namespace) = populated(&kustomization.namespace) {
            NamespaceTransformer(namespace).transform(resources, errors);
        }

        if !kustomization.common_labels.is_empty() {
            LabelTransformer(&kustomization.common_labels).transform(resources, errors);
        }

        if !kustomization.common_annotations.is_empty() {
            AnnotationTransformer(&kustomization.common_annotations).transform(resources, errors);
        }

        if let Some(prefix) = populated(&kustomization.name_prefix) {
            NameTransformer::new(|name| format!("{prefix}{name}")).transform(resources, errors);
        }

        if let Some(suffix) = populated(&kustomization.name_suffix) {
            NameTransformer::new(|name| format!("{name}{suffix}")).transform(resources, errors);
        }

        if !kustomization.patches.is_empty() {
            PatchTransformer::new(base_dir, &kustomization.patches).transform(resources, errors);
        }
    }
}

fn populated(field: &Option<crate::manifest::Str>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}
