use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kustomizelite", version, about = "Lightweight kustomize-compatible build engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a kustomization and print the resulting resources
    Build {
        /// Path to a kustomization.yaml or a directory containing one
        path: Option<PathBuf>,

        /// Additional values file applied to every helm chart (repeatable)
        #[arg(long = "helm-values-file", value_name = "PATH")]
        helm_values_files: Vec<PathBuf>,

        /// Batch build configuration file
        #[arg(short = 'f', long = "file", value_name = "PATH")]
        file: Option<PathBuf>,
    },
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Build {
            path,
            helm_values_files,
            file,
        } => match file {
            Some(batch_file) => kustomizelite::batch::run(&batch_file, &helm_values_files),
            None => {
                let path = path.unwrap_or_else(|| PathBuf::from("."));
                kustomizelite::build(path, &helm_values_files, &mut std::io::stdout().lock())
            }
        },
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
