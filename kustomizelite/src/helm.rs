//! Helm chart inflation through the external `helm` binary.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use indexmap::IndexMap;
use serde_yaml::Value;
use tempfile::NamedTempFile;

use crate::error::{Context as _, Error, Result};
use crate::manifest::{HelmChart, HelmGlobals, Str};
use crate::resource::Resource;
use crate::yaml;

pub const HELM_BINARY_ENV: &str = "HELM_BINARY_PATH";

/// Inflates a chart into resource documents. Injected into the loader so
/// tests can substitute a fake.
pub trait Templater {
    fn template(
        &self,
        base_dir: &Path,
        chart: &HelmChart,
        globals: Option<&HelmGlobals>,
    ) -> Result<Vec<Resource>>;
}

pub struct HelmTemplater {
    binary: PathBuf,
    global_values_files: Vec<PathBuf>,
    env: IndexMap<Str, Str>,
}

impl HelmTemplater {
    /// Binary from `HELM_BINARY_PATH`, falling back to `helm` on `PATH`.
    /// Resolution happens lazily at template time, so kustomizations without
    /// charts never require helm to be installed.
    pub fn from_env(global_values_files: &[PathBuf]) -> Result<Self> {
        let binary = std::env::var_os(HELM_BINARY_ENV)
            .filter(|value| !value.is_empty())
            .map_or_else(|| PathBuf::from("helm"), PathBuf::from);
        Self::new(binary, global_values_files)
    }

    pub fn new(binary: impl Into<PathBuf>, global_values_files: &[PathBuf]) -> Result<Self> {
        let mut files = Vec::with_capacity(global_values_files.len());
        for file in global_values_files {
            let absolute = std::path::absolute(file)
                .with_context(|| format!("resolving absolute path for {}", file.display()))?;
            std::fs::metadata(&absolute)
                .with_context(|| format!("global values file {}", absolute.display()))?;
            files.push(absolute);
        }

        Ok(Self {
            binary: binary.into(),
            global_values_files: files,
            env: IndexMap::new(),
        })
    }

    /// Extra environment entries for the helm subprocess; the engine's own
    /// environment is never mutated.
    pub fn with_env(mut self, env: IndexMap<Str, Str>) -> Self {
        self.env = env;
        self
    }

    fn template_args(
        &self,
        chart: &HelmChart,
        globals: Option<&HelmGlobals>,
        inline_values: Option<&Path>,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["template".into()];

        let release = chart
            .release_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(chart.name.as_str());
        args.push(release.into());

        let chart_home = globals
            .and_then(|globals| globals.chart_home.as_deref())
            .filter(|home| !home.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("charts"));
        args.push(chart_home.join(chart.name.as_str()).into());

        if let Some(values_file) = chart
            .values_file
            .as_deref()
            .filter(|file| !file.as_os_str().is_empty())
        {
            args.push("--values".into());
            args.push(values_file.into());
        }
        if let Some(inline) = inline_values {
            args.push("--values".into());
            args.push(inline.into());
        }
        for file in &chart.additional_values_files {
            args.push("--values".into());
            args.push(file.into());
        }
        for file in &self.global_values_files {
            args.push("--values".into());
            args.push(file.into());
        }

        if let Some(namespace) = chart.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            args.push("--namespace".into());
            args.push(namespace.into());
        }
        if chart.include_crds {
            args.push("--include-crds".into());
        }

        args
    }
}

impl Templater for HelmTemplater {
    #[tracing::instrument(skip_all, fields(chart = %chart.name))]
    fn template(
        &self,
        base_dir: &Path,
        chart: &HelmChart,
        globals: Option<&HelmGlobals>,
    ) -> Result<Vec<Resource>> {
        let binary = resolve_binary(&self.binary)?;

        let inline_values = chart
            .values_inline
            .as_ref()
            .filter(|values| !values.is_empty())
            .map(write_inline_values)
            .transpose()?;

        let args = self.template_args(chart, globals, inline_values.as_ref().map(|f| f.path()));
        tracing::debug!(binary = %binary.display(), ?args, "running helm template");

        let output = Command::new(&binary)
            .args(&args)
            .current_dir(base_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .with_context(|| format!("executing {} template", binary.display()))?;

        if !output.status.success() {
            return Err(Error::Helm {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        parse_output(&output.stdout)
    }
}

fn resolve_binary(binary: &Path) -> Result<PathBuf> {
    if binary.components().count() > 1 {
        if binary.is_file() {
            return Ok(binary.to_path_buf());
        }
        return Err(Error::HelmNotFound(binary.to_path_buf()));
    }

    let path = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(Error::HelmNotFound(binary.to_path_buf()))
}

fn write_inline_values(values: &serde_yaml::Mapping) -> Result<NamedTempFile> {
    let file = NamedTempFile::new().context("creating inline values file")?;
    serde_yaml::to_writer(file.as_file(), values)
        .map_err(|err| Error::parse("serializing inline helm values", err))?;
    Ok(file)
}

fn parse_output(stdout: &[u8]) -> Result<Vec<Resource>> {
    let text = String::from_utf8_lossy(stdout);
    let mut resources = Vec::new();

    for document in yaml::split_documents(&text) {
        let value: Value = yaml::from_str(document, "helm output document")?;
        match value {
            Value::Null => {}
            Value::Mapping(mapping) if mapping.is_empty() => {}
            Value::Mapping(mapping) => resources.push(Resource::new(mapping)),
            _ => {
                return Err(Error::parse(
                    "parsing helm output document",
                    "document is not a mapping",
                ))
            }
        }
    }

    Ok(resources)
}

/// Function-backed fake for tests; always compiled so integration tests can
/// inject it.
pub struct FakeTemplater {
    #[allow(clippy::type_complexity)]
    func: Box<
        dyn Fn(&Path, &HelmChart, Option<&HelmGlobals>) -> Result<Vec<Resource>> + Send + Sync,
    >,
}

impl FakeTemplater {
    pub fn new(
        func: impl Fn(&Path, &HelmChart, Option<&HelmGlobals>) -> Result<Vec<Resource>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            func: Box::new(func),
        }
    }

    /// A fake that renders the same documents for every chart.
    pub fn returning(resources: Vec<Resource>) -> Self {
        Self::new(move |_, _, _| Ok(resources.clone()))
    }
}

impl Templater for FakeTemplater {
    fn template(
        &self,
        base_dir: &Path,
        chart: &HelmChart,
        globals: Option<&HelmGlobals>,
    ) -> Result<Vec<Resource>> {
        (self.func)(base_dir, chart, globals)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn chart(text: &str) -> HelmChart {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn parse_output_splits_documents() {
        let resources = parse_output(
            indoc! {"
                ---
                kind: ConfigMap
                metadata:
                  name: a
                ---
                ---

                ---
                kind: Service
                metadata:
                  name: b
            "}
            .as_bytes(),
        )
        .unwrap();

        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind(), Some("ConfigMap"));
        assert_eq!(resources[1].kind(), Some("Service"));
    }

    #[test]
    fn parse_output_rejects_scalars() {
        assert!(parse_output(b"just a string\n").is_err());
    }

    #[test]
    fn parse_output_empty() {
        assert!(parse_output(b"").unwrap().is_empty());
        assert!(parse_output(b"---\n").unwrap().is_empty());
    }

    #[test]
    fn args_use_release_name_and_chart_home() {
        let templater = HelmTemplater::new("helm", &[]).unwrap();
        let chart = chart("name: redis\nreleaseName: cache\nvaluesFile: values.yaml\n");
        let globals: HelmGlobals = serde_yaml::from_str("chartHome: ../vendor").unwrap();

        let args = templater.template_args(&chart, Some(&globals), None);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let chart_path = format!("../vendor{}redis", std::path::MAIN_SEPARATOR);
        assert_eq!(
            args,
            [
                "template",
                "cache",
                chart_path.as_str(),
                "--values",
                "values.yaml",
            ]
        );
    }

    #[test]
    fn args_default_chart_path_and_flags() {
        let templater = HelmTemplater::new("helm", &[]).unwrap();
        let chart = chart(indoc! {"
            name: redis
            namespace: cache
            includeCRDs: true
            additionalValuesFiles:
              - extra.yaml
        "});

        let args = templater.template_args(&chart, None, Some(Path::new("/tmp/inline.yaml")));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let chart_path = format!("charts{}redis", std::path::MAIN_SEPARATOR);
        assert_eq!(
            args,
            [
                "template",
                "redis",
                chart_path.as_str(),
                "--values",
                "/tmp/inline.yaml",
                "--values",
                "extra.yaml",
                "--namespace",
                "cache",
                "--include-crds",
            ]
        );
    }

    #[test]
    fn missing_global_values_file_fails_construction() {
        let missing = PathBuf::from("/definitely/not/here/values.yaml");
        assert!(HelmTemplater::new("helm", &[missing]).is_err());
    }

    #[test]
    fn fake_templater_returns_canned_documents() {
        let canned: Resource = serde_yaml::from_str("kind: ConfigMap\n").unwrap();
        let fake = FakeTemplater::returning(vec![canned.clone()]);
        let rendered = fake
            .template(Path::new("."), &chart("name: redis\n"), None)
            .unwrap();
        assert_eq!(rendered, vec![canned]);
    }
}
