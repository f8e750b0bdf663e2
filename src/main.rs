//! metaconv CLI - resolve and convert metadata projects

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use metaconv::convert::{Converter, Format, OutputTarget};
use metaconv::registry::Registry;
use metaconv::resolve::{ManifestResolver, ResolveReport, SourceResolver};
use metaconv::tree::{DiskTree, TreeContainer, ZipTree};
use metaconv::{Config, Error, IoResultExt, CONFIG_FILE_NAME};

#[derive(Parser)]
#[command(name = "metaconv")]
#[command(about = "convert metadata components between source and metadata format")]
#[command(version)]
struct Cli {
    /// config file
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// list the components below a directory or inside a zip archive
    Resolve {
        /// project directory or .zip archive
        path: PathBuf,
    },

    /// list the components a package manifest declares
    Manifest {
        /// package.xml to read
        path: PathBuf,
    },

    /// convert every component below a path into the other format
    Convert {
        /// project directory or .zip archive
        input: PathBuf,

        /// target format
        #[arg(short, long, value_enum)]
        to: Format,

        /// output directory, or archive path with --zip
        #[arg(short, long)]
        output: PathBuf,

        /// write a single zip archive instead of a directory
        #[arg(long)]
        zip: bool,

        /// existing source-format project whose paths are reused
        #[arg(long)]
        merge: Option<PathBuf>,
    },

    /// list registered metadata types
    Types,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("METACONV_LOG")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> metaconv::Result<()> {
    let config = Config::load_or_default(&cli.config)?;
    let registry = match &config.registry {
        Some(path) => Registry::load(path)?,
        None => Registry::builtin()?,
    };

    match cli.command {
        Commands::Resolve { path } => {
            let report = resolve(&registry, &config, &path)?;
            for component in &report.components {
                println!("{} {}", component, component.xml().display());
            }
            check_complete(&report)?;
        }

        Commands::Manifest { path } => {
            let result =
                ManifestResolver::new(&registry, Arc::new(DiskTree::new())).resolve(&path)?;
            if let Some(full_name) = &result.full_name {
                println!("package {}", full_name);
            }
            println!("api version {}", result.api_version);
            for component in &result.components {
                println!("{}", component);
            }
        }

        Commands::Convert {
            input,
            to,
            output,
            zip,
            merge,
        } => {
            let report = resolve(&registry, &config, &input)?;
            let merge_with = match &merge {
                Some(dir) => {
                    let dir = std::fs::canonicalize(dir).with_path(dir)?;
                    resolve(&registry, &config, &dir)?.components
                }
                None => vec![],
            };
            let target = if zip {
                OutputTarget::Zip(output)
            } else {
                OutputTarget::Directory(output)
            };

            let runtime = runtime()?;
            let converter = Converter::new(&registry, config.clone());
            let result = runtime.block_on(converter.convert(
                &report.components,
                to,
                &target,
                &merge_with,
            ))?;

            println!(
                "converted {} components, {} files written to {}",
                result.components,
                result.files_written,
                target.path().display()
            );
            check_complete(&report)?;
        }

        Commands::Types => {
            for ty in registry.types() {
                println!(
                    "{:<28} {:<20} {:<16} {:?}/{:?}",
                    ty.name,
                    ty.directory_name,
                    ty.suffix.as_deref().unwrap_or("-"),
                    ty.strategies.adapter,
                    ty.strategies.transformer
                );
            }
        }
    }

    Ok(())
}

fn runtime() -> metaconv::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| Error::Task(format!("starting runtime: {}", e)))
}

/// resolve a project directory, or the whole of a zip archive
fn resolve(registry: &Registry, config: &Config, path: &Path) -> metaconv::Result<ResolveReport> {
    let is_archive = path.is_file() && path.extension().is_some_and(|e| e == "zip");
    let (tree, root): (Arc<dyn TreeContainer>, PathBuf) = if is_archive {
        (Arc::new(ZipTree::open(path)?), PathBuf::new())
    } else {
        (Arc::new(DiskTree::new()), path.to_path_buf())
    };

    SourceResolver::new(registry, tree)
        .with_ignore(config.ignore_patterns())
        .resolve(&root)
}

fn check_complete(report: &ResolveReport) -> metaconv::Result<()> {
    for failure in &report.failures {
        eprintln!("warning: {}", failure);
    }
    if report.is_complete() {
        Ok(())
    } else {
        Err(Error::Incomplete(report.failures.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_runs_conversion_futures() {
        let runtime = runtime().unwrap();
        assert_eq!(runtime.block_on(async { 2 + 2 }), 4);
    }

    #[test]
    fn test_task_error_has_no_path() {
        let e = Error::Task("starting runtime: no threads".into());
        assert_eq!(e.to_string(), "background task failed: starting runtime: no threads");
    }
}
