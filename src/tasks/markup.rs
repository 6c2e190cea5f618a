//! Markup minification with `minify-html`.

use super::{list_files, write_file, TaskError, TaskOutput};
use crate::build::{BuildContext, CancelToken};
use minify_html::Cfg;
use std::fs;
use tracing::debug;

/// Minifier settings: collapse whitespace, keep comments and optional tags.
fn markup_cfg() -> Cfg {
    let mut cfg = Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = true;
    cfg.do_not_minify_doctype = true;
    cfg.ensure_spec_compliant_unquoted_attribute_values = true;
    cfg.keep_spaces_between_attributes = true;
    cfg
}

/// Minify one HTML document.
pub fn minify_markup(source: &[u8]) -> Vec<u8> {
    minify_html::minify(source, &markup_cfg())
}

/// `html`: minify every top-level `*.html` into the output root.
pub fn build_markup(ctx: &BuildContext, cancel: &CancelToken) -> Result<TaskOutput, TaskError> {
    let out_dir = ctx.out_dir();
    let mut output = TaskOutput::new();

    for source in list_files(&ctx.src_dir(), "html")? {
        cancel.check()?;

        let bytes = fs::read(&source).map_err(|e| TaskError::io(&source, e))?;
        let minified = minify_markup(&bytes);

        let Some(name) = source.file_name() else {
            continue;
        };
        let out_path = out_dir.join(name);
        write_file(&out_path, &minified)?;

        debug!(
            from = %source.display(),
            to = %out_path.display(),
            before = bytes.len(),
            after = minified.len(),
            "Minified markup"
        );
        output.push(out_path);
    }

    Ok(output)
}
