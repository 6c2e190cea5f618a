//! Build context containing configuration and resolved paths for a pipeline run.

use crate::config::{LineEnding, SitepipeConfig};
use std::path::{Path, PathBuf};

/// Build context containing configuration and paths for a pipeline run.
///
/// Every task receives the same context; it resolves the configured layout
/// against the project root so tasks only deal in absolute paths.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: SitepipeConfig,
    /// Project root directory (where sitepipe.toml is located)
    project_root: PathBuf,
    /// Whether to run in verbose mode
    verbose: bool,
}

impl BuildContext {
    /// Create a new build context.
    pub fn new(config: SitepipeConfig, project_root: PathBuf) -> Self {
        Self { config, project_root, verbose: false }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SitepipeConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Resolve a path relative to the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        crate::config::loader::resolve_path(&self.project_root, path)
    }

    /// Source root.
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// Production output root.
    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.out)
    }

    /// Stylesheet sources.
    pub fn styles_dir(&self) -> PathBuf {
        self.src_dir().join(&self.config.layout.styles)
    }

    /// Script sources.
    pub fn scripts_dir(&self) -> PathBuf {
        self.src_dir().join(&self.config.layout.scripts)
    }

    /// Image sources.
    pub fn images_dir(&self) -> PathBuf {
        self.src_dir().join(&self.config.layout.images)
    }

    /// Generated-CSS cache written by the development compiler.
    pub fn css_cache_dir(&self) -> PathBuf {
        self.src_dir().join(&self.config.layout.generated_css)
    }

    /// Compiled CSS in the output tree.
    pub fn out_css_dir(&self) -> PathBuf {
        self.out_dir().join(&self.config.layout.generated_css)
    }

    /// Compiled scripts in the output tree.
    pub fn out_scripts_dir(&self) -> PathBuf {
        self.out_dir().join(&self.config.layout.scripts)
    }

    /// Compressed images in the output tree.
    pub fn out_images_dir(&self) -> PathBuf {
        self.out_dir().join(&self.config.layout.images)
    }

    /// Line ending for text outputs.
    pub fn line_ending(&self) -> LineEnding {
        self.config.output.line_ending
    }
}
