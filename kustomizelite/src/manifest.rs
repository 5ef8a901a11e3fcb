//! Serde schema for `kustomization.yaml` and batch build files.
//!
//! Unknown fields are tolerated everywhere: real kustomizations carry fields
//! this engine does not implement, and a build should not die on them.

use std::path::PathBuf;

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Mapping;

pub type Str = CompactString;

pub const BATCH_API_VERSION: &str = "kustomizelite.io/v1";
pub const BATCH_KIND: &str = "BatchBuild";

/// A parsed `kustomization.yaml`: the resources and transforms for one
/// directory. `kind: Component` is accepted but does not change processing.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    #[serde(default)]
    pub api_version: Option<Str>,
    #[serde(default)]
    pub kind: Option<Str>,
    #[serde(default)]
    pub resources: Vec<PathBuf>,
    #[serde(default)]
    pub components: Vec<PathBuf>,
    #[serde(default)]
    pub namespace: Option<Str>,
    #[serde(default)]
    pub name_prefix: Option<Str>,
    #[serde(default)]
    pub name_suffix: Option<Str>,
    #[serde(default)]
    pub common_labels: IndexMap<Str, Str>,
    #[serde(default)]
    pub common_annotations: IndexMap<Str, Str>,
    #[serde(default)]
    pub patches: Vec<PatchDecl>,
    #[serde(default)]
    pub helm_globals: Option<HelmGlobals>,
    #[serde(default)]
    pub helm_charts: Vec<HelmChart>,
}

/// A declared patch: either a file reference or an inline document, with an
/// optional target selector.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchDecl {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub patch: Option<Str>,
    #[serde(default)]
    pub target: Option<PatchTarget>,
}

/// Selects which resources a patch applies to. An absent target matches all
/// resources; every populated field must match.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchTarget {
    #[serde(default)]
    pub group: Option<Str>,
    #[serde(default)]
    pub version: Option<Str>,
    #[serde(default)]
    pub kind: Option<Str>,
    #[serde(default)]
    pub name: Option<Str>,
    #[serde(default)]
    pub namespace: Option<Str>,
    #[serde(default)]
    pub label_selector: Option<Str>,
    #[serde(default)]
    pub annotation_selector: Option<Str>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmGlobals {
    #[serde(default)]
    pub chart_home: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmChart {
    pub name: Str,
    #[serde(default)]
    pub version: Option<Str>,
    #[serde(default)]
    pub release_name: Option<Str>,
    #[serde(default)]
    pub namespace: Option<Str>,
    #[serde(default)]
    pub values_file: Option<PathBuf>,
    #[serde(default)]
    pub values_inline: Option<Mapping>,
    #[serde(default)]
    pub additional_values_files: Vec<PathBuf>,
    #[serde(default, rename = "includeCRDs")]
    pub include_crds: bool,
}

/// Declarative specification of multiple independent builds executed in
/// parallel to distinct output files.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchBuild {
    pub api_version: Str,
    pub kind: Str,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub builds: Vec<BuildConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnvVar {
    pub name: Str,
    pub value: Str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    pub kustomization: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}
