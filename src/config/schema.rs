//! Configuration schema types for `sitepipe.toml`
//!
//! Defines the structure and validation rules for a site's pipeline configuration.
//! Every field has a default, so an empty file (or no file at all) describes the
//! standard layout: `src/` in, `dist/` out.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Stylesheet output style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    /// Human-readable, one declaration per line
    Expanded,
    /// Everything on as few bytes as possible
    Compressed,
}

impl OutputStyle {
    /// Whether this style asks for minified output
    pub fn is_compressed(self) -> bool {
        matches!(self, OutputStyle::Compressed)
    }
}

/// Line ending written to text outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// `\n`
    #[default]
    Lf,
    /// `\r\n`
    Crlf,
}

impl LineEnding {
    /// The terminator as a string
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }
}

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    #[serde(default = "default_name")]
    pub name: String,
    /// Source root
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Production output root
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { name: default_name(), src: default_src(), out: default_out() }
    }
}

fn default_name() -> String {
    "site".to_string()
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

fn default_out() -> PathBuf {
    PathBuf::from("dist")
}

/// Subdirectory names inside the source and output roots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Stylesheet sources
    #[serde(default = "default_styles_dir")]
    pub styles: PathBuf,
    /// Script sources, mirrored to the same name in the output
    #[serde(default = "default_scripts_dir")]
    pub scripts: PathBuf,
    /// Image sources, mirrored to the same name in the output
    #[serde(default = "default_images_dir")]
    pub images: PathBuf,
    /// Compiled CSS: the dev cache under the source root and the CSS dir of the output
    #[serde(default = "default_generated_css_dir")]
    pub generated_css: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            styles: default_styles_dir(),
            scripts: default_scripts_dir(),
            images: default_images_dir(),
            generated_css: default_generated_css_dir(),
        }
    }
}

fn default_styles_dir() -> PathBuf {
    PathBuf::from("scss")
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("js")
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("img")
}

fn default_generated_css_dir() -> PathBuf {
    PathBuf::from("css")
}

/// Stylesheet compilation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Browserslist queries used for vendor prefixing
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
    /// Output style of the development compiler
    #[serde(default = "default_dev_style")]
    pub dev_style: OutputStyle,
    /// Output style of the production build
    #[serde(default = "default_build_style")]
    pub build_style: OutputStyle,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            browsers: default_browsers(),
            dev_style: default_dev_style(),
            build_style: default_build_style(),
        }
    }
}

fn default_browsers() -> Vec<String> {
    vec!["last 2 versions".to_string()]
}

fn default_dev_style() -> OutputStyle {
    OutputStyle::Expanded
}

fn default_build_style() -> OutputStyle {
    OutputStyle::Compressed
}

/// Script transpilation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Language target, e.g. `es2015`
    #[serde(default = "default_script_target")]
    pub target: String,
    /// Rename local bindings
    #[serde(default = "default_true")]
    pub mangle: bool,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self { target: default_script_target(), mangle: true }
    }
}

fn default_script_target() -> String {
    "es2015".to_string()
}

fn default_true() -> bool {
    true
}

/// Image compression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Re-encode GIF frames interlaced
    #[serde(default = "default_true")]
    pub gif_interlaced: bool,
    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Ask for progressive JPEG output
    #[serde(default = "default_true")]
    pub jpeg_progressive: bool,
    /// PNG optimization level (0-6)
    #[serde(default = "default_png_level")]
    pub png_level: u8,
    /// Drop `viewBox` when it only restates width/height
    #[serde(default = "default_true")]
    pub svg_remove_viewbox: bool,
    /// Drop unreferenced `id` attributes
    #[serde(default)]
    pub svg_cleanup_ids: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            gif_interlaced: true,
            jpeg_quality: default_jpeg_quality(),
            jpeg_progressive: true,
            png_level: default_png_level(),
            svg_remove_viewbox: true,
            svg_cleanup_ids: false,
        }
    }
}

fn default_jpeg_quality() -> u8 {
    75
}

fn default_png_level() -> u8 {
    5
}

/// Development server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Text output settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Line ending applied to compiled CSS and JS
    #[serde(default)]
    pub line_ending: LineEnding,
}

/// Complete sitepipe.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SitepipeConfig {
    /// Project metadata
    #[serde(default)]
    pub project: ProjectConfig,
    /// Directory names
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Stylesheet settings
    #[serde(default)]
    pub styles: StylesConfig,
    /// Script settings
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Image settings
    #[serde(default)]
    pub images: ImagesConfig,
    /// Dev server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
    /// Text output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "images.png_level")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sitepipe.toml: '{}' {}", self.field, self.message)
    }
}

impl SitepipeConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: &str| {
            errors.push(ConfigValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.project.name.is_empty() {
            push("project.name", "must be a non-empty string");
        }

        if self.styles.browsers.iter().all(|q| q.trim().is_empty()) {
            push("styles.browsers", "must contain at least one browserslist query");
        }

        if self.scripts.target.trim().is_empty() {
            push("scripts.target", "must name a language target such as \"es2015\"");
        }

        if !(1..=100).contains(&self.images.jpeg_quality) {
            push("images.jpeg_quality", "must be between 1 and 100");
        }

        if self.images.png_level > 6 {
            push("images.png_level", "must be between 0 and 6");
        }

        if self.server.port == 0 {
            push("server.port", "must be a non-zero port");
        }

        for (field, dir) in [
            ("layout.styles", &self.layout.styles),
            ("layout.scripts", &self.layout.scripts),
            ("layout.images", &self.layout.images),
            ("layout.generated_css", &self.layout.generated_css),
        ] {
            if dir.is_absolute() || dir.as_os_str().is_empty() {
                push(field, "must be a non-empty relative path");
            }
        }

        // the generated cache is wiped by clean-css
        if !self.layout.generated_css.as_os_str().is_empty() {
            let generated = normalize_path(&self.layout.generated_css);
            for (name, dir) in [
                ("layout.styles", &self.layout.styles),
                ("layout.scripts", &self.layout.scripts),
                ("layout.images", &self.layout.images),
            ] {
                if generated.as_os_str().is_empty() || normalize_path(dir).starts_with(&generated) {
                    push("layout.generated_css", &format!("must not be or contain {}", name));
                }
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_parse() {
        let config: SitepipeConfig = toml::from_str("").unwrap();
        assert_eq!(config.project.src, PathBuf::from("src"));
        assert_eq!(config.project.out, PathBuf::from("dist"));
        assert_eq!(config.styles.browsers, vec!["last 2 versions".to_string()]);
        assert_eq!(config.styles.dev_style, OutputStyle::Expanded);
        assert_eq!(config.styles.build_style, OutputStyle::Compressed);
        assert_eq!(config.server.port, 3000);
        assert!(config.is_valid());
    }

    #[test]
    fn test_image_defaults() {
        let config = SitepipeConfig::default();
        assert!(config.images.gif_interlaced);
        assert_eq!(config.images.jpeg_quality, 75);
        assert!(config.images.jpeg_progressive);
        assert_eq!(config.images.png_level, 5);
        assert!(config.images.svg_remove_viewbox);
        assert!(!config.images.svg_cleanup_ids);
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[project]
name = "landing"
src = "site"
out = "public"

[layout]
styles = "sass"
scripts = "scripts"

[styles]
browsers = ["> 1%", "not dead"]
dev_style = "compressed"

[scripts]
target = "es2017"
mangle = false

[images]
jpeg_quality = 60
png_level = 2
svg_cleanup_ids = true

[server]
host = "0.0.0.0"
port = 8080

[watch]
debounce_ms = 250

[output]
line_ending = "crlf"
"#;
        let config: SitepipeConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.project.name, "landing");
        assert_eq!(config.project.src, PathBuf::from("site"));
        assert_eq!(config.project.out, PathBuf::from("public"));
        assert_eq!(config.layout.styles, PathBuf::from("sass"));
        assert_eq!(config.layout.scripts, PathBuf::from("scripts"));
        assert_eq!(config.layout.images, PathBuf::from("img"));
        assert_eq!(config.styles.browsers.len(), 2);
        assert_eq!(config.styles.dev_style, OutputStyle::Compressed);
        assert_eq!(config.styles.build_style, OutputStyle::Compressed);
        assert_eq!(config.scripts.target, "es2017");
        assert!(!config.scripts.mangle);
        assert_eq!(config.images.jpeg_quality, 60);
        assert_eq!(config.images.png_level, 2);
        assert!(config.images.svg_cleanup_ids);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.watch.debounce_ms, 250);
        assert_eq!(config.output.line_ending, LineEnding::Crlf);
    }

    #[test]
    fn test_validation_empty_name() {
        let config: SitepipeConfig = toml::from_str("[project]\nname = \"\"").unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "project.name"));
    }

    #[test]
    fn test_validation_image_ranges() {
        let toml = r#"
[images]
jpeg_quality = 0
png_level = 9
"#;
        let config: SitepipeConfig = toml::from_str(toml).unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "images.jpeg_quality"));
        assert!(errors.iter().any(|e| e.field == "images.png_level"));
    }

    #[test]
    fn test_validation_empty_browsers() {
        let config: SitepipeConfig = toml::from_str("[styles]\nbrowsers = []").unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "styles.browsers"));
    }

    #[test]
    fn test_validation_absolute_layout_dir() {
        let config: SitepipeConfig = toml::from_str("[layout]\nimages = \"/img\"").unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.field == "layout.images"));
    }

    #[test]
    fn test_validation_zero_port() {
        let config: SitepipeConfig = toml::from_str("[server]\nport = 0").unwrap();
        assert!(!config.is_valid());
    }

    #[test]
    fn test_validation_generated_css_overlapping_sources() {
        let config: SitepipeConfig = toml::from_str("[layout]\ngenerated_css = \"scss\"").unwrap();
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "layout.generated_css");
        assert_eq!(errors[0].message, "must not be or contain layout.styles");

        let config: SitepipeConfig =
            toml::from_str("[layout]\ngenerated_css = \"assets\"\nimages = \"assets/img\"").unwrap();
        assert!(config.validate().iter().any(|e| e.message == "must not be or contain layout.images"));

        let config: SitepipeConfig = toml::from_str("[layout]\ngenerated_css = \".\"").unwrap();
        assert_eq!(config.validate().len(), 3);
    }

    #[test]
    fn test_validation_generated_css_beside_sources() {
        let config: SitepipeConfig =
            toml::from_str("[layout]\ngenerated_css = \"scss-out\"\nscripts = \"./js\"").unwrap();
        assert!(config.is_valid());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("./css/../scss/")), PathBuf::from("scss"));
        assert_eq!(normalize_path(Path::new(".")), PathBuf::new());
        assert_eq!(normalize_path(Path::new("/site/src/..")), PathBuf::from("/site"));
        assert_eq!(normalize_path(Path::new("../up")), PathBuf::from("../up"));
    }

    #[test]
    fn test_line_ending_as_str() {
        assert_eq!(LineEnding::Lf.as_str(), "\n");
        assert_eq!(LineEnding::Crlf.as_str(), "\r\n");
    }

    #[test]
    fn test_error_display() {
        let error = ConfigValidationError {
            field: "server.port".to_string(),
            message: "must be a non-zero port".to_string(),
        };
        assert_eq!(error.to_string(), "sitepipe.toml: 'server.port' must be a non-zero port");
    }
}
