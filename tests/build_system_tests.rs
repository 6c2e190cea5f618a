//! Build System Test Suite
//!
//! Integration tests for the sitepipe pipelines, run against a throwaway
//! project on disk:
//!
//! - The `build` pipeline end to end
//! - Fail-fast behavior when one asset kind breaks
//! - The `develop` pipeline up to (not including) the server
//! - Config discovery from the working directory

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use serial_test::serial;
use sitepipe::build::{execute_task, BuildContext, BuildStatus, Pipeline, TaskKind, TaskRunner};
use sitepipe::config::{default_config, find_config, LineEnding, OutputStyle};
use sitepipe::tasks::styles::{compile_stylesheet, SourceMapMode, StyleOptions};
use sitepipe::tasks::TaskOutput;
use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// Test Utilities
// ============================================================================

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>  Demo  </title>
    <link rel="stylesheet" href="css/main.css">
  </head>
  <body>
    <!-- hero -->
    <h1 class="title">   Hello   </h1>
    <script src="js/app.js"></script>
  </body>
</html>
"#;

const MAIN_SCSS: &str = r#"@use "colors";

.title {
  color: colors.$brand;
  user-select: none;

  &:hover {
    color: darken(colors.$brand, 10%);
  }
}
"#;

const COLORS_SCSS: &str = "$brand: #336699;\n";

const APP_JS: &str = r#"const square = (value) => value ** 2;
function report(message) {
  console.log(message);
}
report(square(4));
"#;

const LOGO_SVG: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<!-- Generator: hand -->
<svg xmlns="http://www.w3.org/2000/svg" width="32" height="32" viewBox="0 0 32 32">
  <metadata>created by hand</metadata>
  <rect x="4" y="4" width="24" height="24" fill="#336699"/>
</svg>
"##;

/// Create a test file with content.
fn create_test_file(dir: &Path, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Write a small PNG with a gradient so the encoder has something to chew on.
fn create_test_png(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let img = image::RgbaImage::from_fn(16, 16, |x, y| {
        image::Rgba([(x * 16) as u8, (y * 16) as u8, 128, 255])
    });
    img.save(path).unwrap();
}

/// Create a complete source tree in a temporary project.
fn create_test_project() -> (TempDir, BuildContext) {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");

    create_test_file(&src, "index.html", INDEX_HTML);
    create_test_file(&src, "scss/main.scss", MAIN_SCSS);
    create_test_file(&src, "scss/_colors.scss", COLORS_SCSS);
    create_test_file(&src, "js/app.js", APP_JS);
    create_test_file(&src, "img/a/logo.svg", LOGO_SVG);
    create_test_png(&src.join("img/b.png"));

    let mut config = default_config();
    config.styles.browsers = vec!["safari 12".to_string()];
    let ctx = BuildContext::new(config, temp.path().to_path_buf());

    (temp, ctx)
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).unwrap().len()
}

// ============================================================================
// Build Pipeline
// ============================================================================

#[test]
fn test_build_pipeline_produces_optimized_site() {
    let (temp, ctx) = create_test_project();
    let src = temp.path().join("src");
    let dist = temp.path().join("dist");
    let stale = create_test_file(&dist, "stale.txt", "left over");

    let result = TaskRunner::new(ctx).run(&Pipeline::Build.plan()).unwrap();

    assert!(result.is_success(), "{}", result.summary());
    assert_eq!(result.success_count(), 5);
    assert!(!stale.exists());

    // markup
    let html = fs::read_to_string(dist.join("index.html")).unwrap();
    assert!(html.len() < INDEX_HTML.len());
    assert!(html.contains("<!-- hero -->"));
    assert!(html.contains("</body>"));

    // styles
    let css = fs::read_to_string(dist.join("css/main.css")).unwrap();
    assert!(css.contains("-webkit-user-select"));
    assert!(css.contains("#336699") || css.contains("#369"));
    assert!(css.ends_with("/*# sourceMappingURL=main.css.map */\n"));
    assert!(dist.join("css/main.css.map").is_file());
    assert!(!dist.join("css/_colors.css").exists());

    // scripts
    let js = fs::read_to_string(dist.join("js/app.js")).unwrap();
    assert!(js.contains("Math.pow"));
    assert!(js.contains("//# sourceMappingURL=app.js.map"));
    let map: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dist.join("js/app.js.map")).unwrap()).unwrap();
    assert_eq!(map["version"], 3);

    // images keep their relative layout and never grow
    let svg = dist.join("img/a/logo.svg");
    let png = dist.join("img/b.png");
    assert!(file_len(&svg) <= file_len(&src.join("img/a/logo.svg")));
    assert!(file_len(&png) <= file_len(&src.join("img/b.png")));
    let svg_text = fs::read_to_string(&svg).unwrap();
    assert!(!svg_text.contains("metadata"));
    assert!(!svg_text.contains("viewBox"));
}

#[test]
fn test_build_pipeline_on_empty_source() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src")).unwrap();
    let ctx = BuildContext::new(default_config(), temp.path().to_path_buf());

    let result = TaskRunner::new(ctx).run(&Pipeline::Build.plan()).unwrap();

    assert!(result.is_success());
    assert!(result.all_outputs().is_empty());
}

#[test]
fn test_build_pipeline_crlf_output() {
    let (temp, mut ctx) = create_test_project();
    let mut config = ctx.config().clone();
    config.output.line_ending = LineEnding::Crlf;
    config.styles.build_style = OutputStyle::Expanded;
    ctx = BuildContext::new(config, temp.path().to_path_buf());

    let result = TaskRunner::new(ctx).run(&Pipeline::Build.plan()).unwrap();
    assert!(result.is_success(), "{}", result.summary());

    let css = fs::read_to_string(temp.path().join("dist/css/main.css")).unwrap();
    assert!(css.contains("\r\n"));
    assert!(!css.replace("\r\n", "").contains('\n'));
}

#[test]
fn test_build_pipeline_fails_on_broken_stylesheet() {
    let (temp, ctx) = create_test_project();
    create_test_file(&temp.path().join("src"), "scss/broken.scss", ".a { color: ; ");

    let result = TaskRunner::new(ctx).run(&Pipeline::Build.plan()).unwrap();

    assert!(!result.is_success());
    assert_eq!(result.failed_count(), 1);
    assert!(result.get("clean-dist").unwrap().is_success());
    assert!(matches!(result.get("css").unwrap().status, BuildStatus::Failed(_)));

    let summary = result.summary();
    assert!(summary.starts_with("Build failed"));
    assert!(summary.contains("css"));
    assert!(summary.contains("broken.scss"));
}

#[test]
fn test_build_pipeline_failed_clean_cancels_everything() {
    let (temp, ctx) = create_test_project();
    // a file where the output directory should be
    create_test_file(temp.path(), "dist", "not a directory");

    let result = TaskRunner::new(ctx).run(&Pipeline::Build.plan()).unwrap();

    assert_eq!(result.failed_count(), 1);
    assert!(result.get("clean-dist").unwrap().status.is_failure());
    assert_eq!(result.cancelled_count(), 4);
    assert!(result.all_outputs().is_empty());
}

#[test]
fn test_build_plan_levels() {
    let plan = Pipeline::Build.plan();
    let levels = plan.levels().unwrap();

    let names: Vec<Vec<&str>> =
        levels.iter().map(|l| l.iter().map(|t| t.id.as_str()).collect()).collect();
    assert_eq!(names, vec![vec!["clean-dist"], vec!["html", "css", "js", "img"]]);
}

#[test]
fn test_production_css_is_not_larger_than_development_css() {
    let (temp, ctx) = create_test_project();
    let source = temp.path().join("src/scss/main.scss");

    let external = |mut options: StyleOptions| {
        options.source_map = SourceMapMode::External;
        compile_stylesheet(&source, "main.css", &options).unwrap().css
    };

    let dev = external(StyleOptions::develop(&ctx));
    let prod = external(StyleOptions::build(&ctx));

    assert!(prod.len() <= dev.len());
    assert!(dev.lines().count() > prod.lines().count());
}

// ============================================================================
// Develop Pipeline
// ============================================================================

#[test]
fn test_develop_pipeline_up_to_serve() {
    let (temp, ctx) = create_test_project();
    let css_dir = temp.path().join("src/css");
    let stale = create_test_file(&css_dir, "old.css", "a{}");

    let served = AtomicBool::new(false);
    let result = TaskRunner::new(ctx)
        .with_jobs(1)
        .run_with(&Pipeline::Develop.plan(), |task, context, cancel| {
            if task.kind == TaskKind::Serve {
                served.store(true, Ordering::SeqCst);
                Ok(TaskOutput::new())
            } else {
                execute_task(task.kind, context, cancel)
            }
        })
        .unwrap();

    assert!(result.is_success(), "{}", result.summary());
    assert!(served.load(Ordering::SeqCst));
    assert!(!stale.exists());

    let css = fs::read_to_string(css_dir.join("main.css")).unwrap();
    assert!(css.contains("-webkit-user-select"));
    assert!(css.contains("/*# sourceMappingURL=data:application/json;charset=utf-8;base64,"));
    assert!(!css_dir.join("main.css.map").exists());
}

#[test]
fn test_develop_pipeline_survives_broken_stylesheet() {
    let (temp, ctx) = create_test_project();
    create_test_file(&temp.path().join("src"), "scss/broken.scss", ".a { color: ; ");

    let result = TaskRunner::new(ctx)
        .with_jobs(1)
        .run_with(&Pipeline::Develop.plan(), |task, context, cancel| {
            if task.kind == TaskKind::Serve {
                Ok(TaskOutput::new())
            } else {
                execute_task(task.kind, context, cancel)
            }
        })
        .unwrap();

    assert!(result.is_success(), "{}", result.summary());
    assert!(!result.all_warnings().is_empty());
    assert!(temp.path().join("src/css/main.css").is_file());
}

// ============================================================================
// Config Discovery
// ============================================================================

#[test]
#[serial]
fn test_find_config_from_working_directory() {
    let temp = TempDir::new().unwrap();
    let config_path = create_test_file(temp.path(), "sitepipe.toml", "[project]\nname = \"x\"\n");
    let nested = temp.path().join("src/scss");
    fs::create_dir_all(&nested).unwrap();

    let original = std::env::current_dir().unwrap();
    std::env::set_current_dir(&nested).unwrap();
    let found = find_config();
    std::env::set_current_dir(original).unwrap();

    let found = found.unwrap().canonicalize().unwrap();
    assert_eq!(found, config_path.canonicalize().unwrap());
}
