//! Script transpilation and minification with `oxc`.
//!
//! Each top-level script is parsed, lowered to the configured language
//! target, compressed, optionally mangled, and printed with a source map.

use super::{file_stem, list_files, normalize_line_endings, read_source, write_file, TaskError, TaskOutput};
use crate::build::{BuildContext, CancelToken};
use crate::config::LineEnding;
use oxc_allocator::Allocator;
use oxc_codegen::{CodeGenerator, CodegenOptions};
use oxc_minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings for one script compilation.
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    /// Language target, e.g. `es2015`
    pub target: String,
    pub mangle: bool,
    pub line_ending: LineEnding,
}

impl ScriptOptions {
    pub fn from_context(ctx: &BuildContext) -> Self {
        let config = ctx.config();
        Self {
            target: config.scripts.target.clone(),
            mangle: config.scripts.mangle,
            line_ending: ctx.line_ending(),
        }
    }
}

/// A compiled script and its source map.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    /// Minified code, ending with its `sourceMappingURL` comment
    pub code: String,
    /// Source map JSON
    pub map: String,
}

/// Transpile and minify `source_text`.
///
/// `path` names the source in diagnostics and in the source map;
/// `output_name` is the file name the code will be written as.
pub fn compile_script(
    path: &Path,
    source_text: &str,
    output_name: &str,
    options: &ScriptOptions,
) -> Result<CompiledScript, TaskError> {
    let script_error = |message: String| TaskError::Script { path: path.to_path_buf(), message };

    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source_text, SourceType::cjs()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return Err(script_error(join_diagnostics(&parsed.errors)));
    }
    let mut program = parsed.program;

    let (symbols, scopes) =
        SemanticBuilder::new().build(&program).semantic.into_symbol_table_and_scope_tree();

    let transform_options = TransformOptions::from_target(&options.target)
        .map_err(|e| script_error(format!("unsupported target '{}': {}", options.target, e)))?;
    let transformed = Transformer::new(&allocator, path, &transform_options)
        .build_with_symbols_and_scopes(symbols, scopes, &mut program);
    if !transformed.errors.is_empty() {
        return Err(script_error(join_diagnostics(&transformed.errors)));
    }

    let minified = Minifier::new(MinifierOptions {
        mangle: options.mangle,
        compress: CompressOptions::default(),
    })
    .build(&allocator, &mut program);

    let generated = CodeGenerator::new()
        .with_options(CodegenOptions {
            minify: true,
            source_map_path: Some(path.to_path_buf()),
            ..CodegenOptions::default()
        })
        .with_mangler(minified.mangler)
        .build(&program);

    let map = generated
        .map
        .map(|m| m.to_json_string())
        .ok_or_else(|| script_error("code generator produced no source map".to_string()))?;

    let mut code = generated.code;
    if !code.ends_with('\n') {
        code.push('\n');
    }
    code.push_str(&format!("//# sourceMappingURL={}.map\n", output_name));

    Ok(CompiledScript { code: normalize_line_endings(&code, options.line_ending), map })
}

/// `js`: compile every top-level script into the output's script directory.
pub fn build_scripts(ctx: &BuildContext, cancel: &CancelToken) -> Result<TaskOutput, TaskError> {
    let options = ScriptOptions::from_context(ctx);
    let out_dir = ctx.out_scripts_dir();
    let mut output = TaskOutput::new();

    for source in list_files(&ctx.scripts_dir(), "js")? {
        cancel.check()?;

        let text = read_source(&source)?;
        let name = format!("{}.js", file_stem(&source));
        let compiled = compile_script(&source, &text, &name, &options)?;

        let out_path = out_dir.join(&name);
        let map_path: PathBuf = out_dir.join(format!("{}.map", name));
        write_file(&out_path, &compiled.code)?;
        write_file(&map_path, &compiled.map)?;

        debug!(
            from = %source.display(),
            to = %out_path.display(),
            before = text.len(),
            after = compiled.code.len(),
            "Compiled script"
        );
        output.push(out_path);
        output.push(map_path);
    }

    Ok(output)
}

fn join_diagnostics<E: std::fmt::Display>(errors: &[E]) -> String {
    if errors.is_empty() {
        return "parser gave up".to_string();
    }
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}
