//! Stylesheet compilation.
//!
//! SCSS is compiled with `grass`; the resulting CSS is then parsed by
//! `lightningcss`, which adds vendor prefixes for the configured browsers,
//! prints expanded or minified output, and produces the source map.

use super::{file_stem, list_files, normalize_line_endings, write_file, TaskError, TaskOutput};
use crate::build::{BuildContext, CancelToken};
use crate::config::{LineEnding, OutputStyle};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Where the source map of a compiled stylesheet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMapMode {
    /// Embedded as a base64 data URL
    Inline,
    /// Written next to the stylesheet as `<name>.css.map`
    External,
}

/// Settings for one stylesheet compilation.
#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub style: OutputStyle,
    pub browsers: Vec<String>,
    pub source_map: SourceMapMode,
    pub line_ending: LineEnding,
}

impl StyleOptions {
    /// Options of the development compiler.
    pub fn develop(ctx: &BuildContext) -> Self {
        let config = ctx.config();
        Self {
            style: config.styles.dev_style,
            browsers: config.styles.browsers.clone(),
            source_map: SourceMapMode::Inline,
            line_ending: ctx.line_ending(),
        }
    }

    /// Options of the production build.
    pub fn build(ctx: &BuildContext) -> Self {
        let config = ctx.config();
        Self {
            style: config.styles.build_style,
            browsers: config.styles.browsers.clone(),
            source_map: SourceMapMode::External,
            line_ending: ctx.line_ending(),
        }
    }
}

/// A compiled stylesheet.
#[derive(Debug, Clone)]
pub struct CompiledCss {
    /// Stylesheet text, ending with its `sourceMappingURL` comment
    pub css: String,
    /// Source map JSON, for [`SourceMapMode::External`]
    pub map: Option<String>,
}

/// Outcome of compiling every stylesheet in a directory.
#[derive(Debug, Default)]
pub struct StylesReport {
    /// Files written
    pub written: Vec<PathBuf>,
    /// Sources that failed, with their error
    pub failed: Vec<(PathBuf, TaskError)>,
}

/// Whether `path` is a partial (`_name.scss`), which is only ever imported.
pub fn is_partial(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with('_'))
}

/// Non-partial stylesheet sources directly inside `dir`.
pub fn stylesheet_sources(dir: &Path) -> Result<Vec<PathBuf>, TaskError> {
    Ok(list_files(dir, "scss")?.into_iter().filter(|p| !is_partial(p)).collect())
}

/// Compile one SCSS file.
///
/// `output_name` is the file name the CSS will be written as; external maps
/// are referenced relative to it.
pub fn compile_stylesheet(
    source: &Path,
    output_name: &str,
    options: &StyleOptions,
) -> Result<CompiledCss, TaskError> {
    let stylesheet_error =
        |message: String| TaskError::Stylesheet { path: source.to_path_buf(), message };

    let grass_style = match options.style {
        OutputStyle::Expanded => grass::OutputStyle::Expanded,
        OutputStyle::Compressed => grass::OutputStyle::Compressed,
    };
    let mut grass_options = grass::Options::default().style(grass_style);
    if let Some(dir) = source.parent() {
        grass_options = grass_options.load_path(dir);
    }
    let css = grass::from_path(source, &grass_options).map_err(|e| stylesheet_error(e.to_string()))?;

    let targets = browser_targets(&options.browsers).map_err(stylesheet_error)?;
    // the map points into grass output, not the SCSS
    let mut sheet = StyleSheet::parse(
        &css,
        ParserOptions { filename: output_name.to_string(), ..ParserOptions::default() },
    )
    .map_err(|e| stylesheet_error(e.to_string()))?;

    sheet
        .minify(MinifyOptions { targets, ..MinifyOptions::default() })
        .map_err(|e| stylesheet_error(e.to_string()))?;

    let mut source_map = SourceMap::new("/");
    let printed = sheet
        .to_css(PrinterOptions {
            minify: options.style.is_compressed(),
            source_map: Some(&mut source_map),
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| stylesheet_error(e.to_string()))?;

    if let Err(e) = source_map.set_source_content(0, &css) {
        debug!(path = %source.display(), "Source map has no source content: {:?}", e);
    }
    let map_json = source_map.to_json(None).map_err(|e| stylesheet_error(format!("{:?}", e)))?;

    let mut code = printed.code;
    if !code.ends_with('\n') {
        code.push('\n');
    }

    let compiled = match options.source_map {
        SourceMapMode::Inline => {
            code.push_str(&format!(
                "/*# sourceMappingURL=data:application/json;charset=utf-8;base64,{} */\n",
                BASE64.encode(map_json.as_bytes())
            ));
            CompiledCss { css: code, map: None }
        }
        SourceMapMode::External => {
            code.push_str(&format!("/*# sourceMappingURL={}.map */\n", output_name));
            CompiledCss { css: code, map: Some(map_json) }
        }
    };

    Ok(CompiledCss {
        css: normalize_line_endings(&compiled.css, options.line_ending),
        map: compiled.map,
    })
}

/// Compile every stylesheet in `src_dir` into `out_dir`.
///
/// Failures are collected rather than returned; callers decide whether a
/// broken stylesheet is fatal.
pub fn compile_dir(
    src_dir: &Path,
    out_dir: &Path,
    options: &StyleOptions,
    cancel: &CancelToken,
) -> Result<StylesReport, TaskError> {
    let mut report = StylesReport::default();

    for source in stylesheet_sources(src_dir)? {
        cancel.check()?;

        let name = format!("{}.css", file_stem(&source));
        let out_path = out_dir.join(&name);

        let compiled = match compile_stylesheet(&source, &name, options) {
            Ok(compiled) => compiled,
            Err(e) => {
                report.failed.push((source, e));
                continue;
            }
        };

        write_file(&out_path, &compiled.css)?;
        debug!(from = %source.display(), to = %out_path.display(), "Compiled stylesheet");
        report.written.push(out_path.clone());

        if let Some(map) = compiled.map {
            let map_path = out_dir.join(format!("{}.map", name));
            write_file(&map_path, map)?;
            report.written.push(map_path);
        }
    }

    Ok(report)
}

/// `dev-css`: compile into the generated-CSS cache.
///
/// Compilation errors are logged and never fail the task.
pub fn compile_dev(ctx: &BuildContext, cancel: &CancelToken) -> Result<TaskOutput, TaskError> {
    let report =
        compile_dir(&ctx.styles_dir(), &ctx.css_cache_dir(), &StyleOptions::develop(ctx), cancel)?;

    let mut output = TaskOutput::with_outputs(report.written);
    for (path, e) in report.failed {
        error!(path = %path.display(), "Stylesheet error: {}", e);
        output.warn(e.to_string());
    }
    Ok(output)
}

/// `css`: compile compressed stylesheets with external maps into the output.
///
/// The first compilation error fails the task.
pub fn build_styles(ctx: &BuildContext, cancel: &CancelToken) -> Result<TaskOutput, TaskError> {
    let report =
        compile_dir(&ctx.styles_dir(), &ctx.out_css_dir(), &StyleOptions::build(ctx), cancel)?;

    if let Some((_, e)) = report.failed.into_iter().next() {
        return Err(e);
    }
    if report.written.is_empty() {
        warn!(dir = %ctx.styles_dir().display(), "No stylesheets found");
    }
    Ok(TaskOutput::with_outputs(report.written))
}

fn browser_targets(queries: &[String]) -> Result<Targets, String> {
    let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
        .map_err(|e| format!("invalid browser query: {}", e))?;
    Ok(Targets { browsers, ..Targets::default() })
}
