//! Parallel batch builds: one declarative file fans out N independent
//! builds to distinct output files.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use indexmap::IndexMap;
use tempfile::NamedTempFile;

use crate::build::Kustomizer;
use crate::error::{Context as _, Error, Errors, Result};
use crate::helm::HelmTemplater;
use crate::manifest::{BatchBuild, BuildConfig, Str, BATCH_API_VERSION, BATCH_KIND};
use crate::yaml;

/// Runs every build in a batch file in parallel and aggregates failures.
/// A failing build reports one reason and leaves no partial output file;
/// the other builds are unaffected.
pub fn run(batch_file: &Path, global_helm_values_files: &[PathBuf]) -> Result<()> {
    let content = std::fs::read_to_string(batch_file)
        .with_context(|| format!("reading batch file {}", batch_file.display()))?;
    let batch: BatchBuild = yaml::from_str(&content, "batch file")?;

    if batch.api_version != BATCH_API_VERSION {
        return Err(Error::Invalid(format!(
            "unsupported apiVersion: {}",
            batch.api_version
        )));
    }
    if batch.kind != BATCH_KIND {
        return Err(Error::Invalid(format!("unsupported kind: {}", batch.kind)));
    }

    let global_env: IndexMap<Str, Str> = batch
        .env
        .iter()
        .map(|env| (env.name.clone(), env.value.clone()))
        .collect();

    let (sender, receiver) = mpsc::channel();
    std::thread::scope(|scope| {
        for build in &batch.builds {
            let sender = sender.clone();
            let global_env = &global_env;
            scope.spawn(move || {
                if let Err(err) = process_build(build, global_env, global_helm_values_files) {
                    let _ = sender
                        .send(err.context(format_args!(
                            "building {}",
                            build.kustomization.display()
                        )));
                }
            });
        }
        drop(sender);
    });

    let errors: Errors = receiver.into_iter().collect();
    if errors.is_empty() {
        return Ok(());
    }
    let count = errors.len();
    Err(Error::Multiple(errors)
        .context(format_args!("batch build failed with {count} errors")))
}

fn process_build(
    build: &BuildConfig,
    global_env: &IndexMap<Str, Str>,
    global_helm_values_files: &[PathBuf],
) -> Result<()> {
    // Per-build entries override the batch-wide ones; the merged map rides
    // the templater into the helm subprocess and the engine's own
    // environment is never touched.
    let mut env = global_env.clone();
    for entry in &build.env {
        env.insert(entry.name.clone(), entry.value.clone());
    }

    let templater = HelmTemplater::from_env(global_helm_values_files)?.with_env(env);
    let kustomizer = Kustomizer::with_templater(Box::new(templater));

    let (resources, errors) = kustomizer
        .kustomize(&build.kustomization)
        .context("building kustomization")?;
    errors.into_result().context("building kustomization")?;

    let mut rendered = Vec::new();
    yaml::write_documents(&mut rendered, &resources)?;

    // Render lands in a temp file that only becomes the output on success,
    // so a failed build never leaves a partial file behind.
    let output_dir = build
        .output
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;
    let mut file = NamedTempFile::new_in(output_dir)
        .with_context(|| format!("creating output file in {}", output_dir.display()))?;
    file.write_all(&rendered)
        .with_context(|| format!("writing output file {}", build.output.display()))?;
    file.persist(&build.output).map_err(|err| {
        Error::io(
            format_args!("persisting output file {}", build.output.display()),
            err.error,
        )
    })?;

    tracing::info!(
        kustomization = %build.kustomization.display(),
        output = %build.output.display(),
        "built kustomization"
    );
    Ok(())
}
