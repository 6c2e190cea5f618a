//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::build::BuildContext;
use crate::config::{CliOverrides, ConfigError, LoadedConfig};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;

/// sitepipe - static-site asset pipeline with a live-reload dev server
#[derive(Parser)]
#[command(name = "sitepipe")]
#[command(about = "sitepipe - compile, minify and serve static site assets")]
#[command(version)]
pub struct Cli {
    /// Path to sitepipe.toml (default: search upward from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile development CSS, then serve the source tree with live reload
    Develop {
        /// Source directory (overrides config)
        #[arg(long)]
        src: Option<PathBuf>,

        /// Dev server port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Produce the optimized site in the output directory
    Build {
        /// Source directory (overrides config)
        #[arg(long)]
        src: Option<PathBuf>,

        /// Output directory (overrides config)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Show the task plan without running it
        #[arg(long)]
        dry_run: bool,

        /// Number of tasks run concurrently (default: CPU count)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Develop { src, port } => {
            let overrides = CliOverrides { src, port, ..Default::default() };
            match load_context(cli.config.as_deref(), &overrides, cli.verbose) {
                Ok(context) => build::run_develop(context),
                Err(e) => config_failure(&e),
            }
        }
        Commands::Build { src, out, dry_run, jobs } => {
            let overrides = CliOverrides { src, out, ..Default::default() };
            match load_context(cli.config.as_deref(), &overrides, cli.verbose) {
                Ok(context) => build::run_build(context, dry_run, jobs),
                Err(e) => config_failure(&e),
            }
        }
    }
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects `debug` over `info`.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Load configuration and resolve the project root.
fn load_context(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    verbose: bool,
) -> Result<BuildContext, ConfigError> {
    let cwd = std::env::current_dir()?;
    let loaded = LoadedConfig::discover(config_path, &cwd)?.with_overrides(overrides)?;

    Ok(BuildContext::new(loaded.config, loaded.root).with_verbose(verbose))
}

fn config_failure(error: &ConfigError) -> ExitCode {
    eprintln!("Error: {}", error);
    ExitCode::from(EXIT_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_flags() {
        let cli = Cli::try_parse_from([
            "sitepipe", "-v", "build", "--out", "public", "--dry-run", "-j", "2",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Build { src, out, dry_run, jobs } => {
                assert_eq!(src, None);
                assert_eq!(out, Some(PathBuf::from("public")));
                assert!(dry_run);
                assert_eq!(jobs, Some(2));
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_parse_develop_flags() {
        let cli =
            Cli::try_parse_from(["sitepipe", "develop", "--port", "8080", "--config", "site.toml"])
                .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
        match cli.command {
            Commands::Develop { src, port } => {
                assert_eq!(src, None);
                assert_eq!(port, Some(8080));
            }
            _ => panic!("expected develop"),
        }
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Cli::try_parse_from(["sitepipe", "develop", "--port", "99999"]).is_err());
    }

    #[test]
    fn test_load_context_with_explicit_config() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_path = temp.path().join("sitepipe.toml");
        std::fs::write(&config_path, "[project]\nname = \"demo\"\nout = \"public\"\n").unwrap();

        let overrides = CliOverrides { port: Some(4000), ..Default::default() };
        let context = load_context(Some(&config_path), &overrides, true).unwrap();

        assert_eq!(context.project_root(), temp.path());
        assert_eq!(context.out_dir(), temp.path().join("public"));
        assert_eq!(context.config().server.port, 4000);
        assert!(context.is_verbose());
    }

    #[test]
    fn test_load_context_rejects_zero_port_flag() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_path = temp.path().join("sitepipe.toml");
        std::fs::write(&config_path, "[project]\nname = \"demo\"\n").unwrap();

        let overrides = CliOverrides { port: Some(0), ..Default::default() };
        let err = load_context(Some(&config_path), &overrides, false).unwrap_err();
        assert!(err.to_string().contains("'server.port' must be a non-zero port"));
    }

    #[test]
    fn test_load_context_reports_bad_config() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_path = temp.path().join("sitepipe.toml");
        std::fs::write(&config_path, "[images]\njpeg_quality = 0\n").unwrap();

        let err = load_context(Some(&config_path), &CliOverrides::default(), false).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
