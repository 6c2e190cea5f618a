//! Watch mode for the development server
//!
//! Watches the source tree with debouncing, recompiles stylesheets when
//! their sources change, and turns every batch of changes into live-reload
//! events for connected browsers.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::build::{BuildContext, CancelToken};
use crate::server::ReloadEvent;
use crate::tasks::styles::{compile_dir, StyleOptions};

/// How often the watch loop checks for shutdown while idle
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch path: {0}")]
    WatchPath(#[source] notify::Error),
    /// Channel receive error
    #[error("Watch channel error: {0}")]
    Channel(String),
    /// Source directory not found
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
}

/// What a change to a path should trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchRule {
    /// Full page reload (top-level markup, scripts, images)
    Reload,
    /// Recompile stylesheets and inject the new CSS
    Styles,
    /// Not watched
    Ignore,
}

/// Classifies changed paths against the source layout.
#[derive(Debug, Clone)]
pub struct WatchLayout {
    src_dir: PathBuf,
    canonical_src: Option<PathBuf>,
    styles: PathBuf,
    scripts: PathBuf,
    images: PathBuf,
    generated_css: PathBuf,
}

impl WatchLayout {
    pub fn new(ctx: &BuildContext) -> Self {
        let src_dir = ctx.src_dir();
        let layout = &ctx.config().layout;
        Self {
            canonical_src: src_dir.canonicalize().ok(),
            src_dir,
            styles: layout.styles.clone(),
            scripts: layout.scripts.clone(),
            images: layout.images.clone(),
            generated_css: layout.generated_css.clone(),
        }
    }

    /// Path relative to the source root, if it is inside it.
    fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        self.canonical_src
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .or_else(|| path.strip_prefix(&self.src_dir).ok())
    }

    /// Decide which rule a changed path falls under.
    pub fn classify(&self, path: &Path) -> WatchRule {
        let Some(relative) = self.relative(path) else {
            return WatchRule::Ignore;
        };

        // the compiler writes here; watching it would retrigger itself
        if relative.starts_with(&self.generated_css) {
            return WatchRule::Ignore;
        }
        if relative.starts_with(&self.styles) {
            return WatchRule::Styles;
        }
        if relative.starts_with(&self.scripts) || relative.starts_with(&self.images) {
            return WatchRule::Reload;
        }

        let top_level = relative.components().count() == 1;
        let is_html = relative
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("html"));
        if top_level && is_html {
            WatchRule::Reload
        } else {
            WatchRule::Ignore
        }
    }
}

/// Tracks stylesheets with errors across compilations for recovery detection
#[derive(Debug, Default)]
pub struct ErrorTracker {
    /// Files that failed in the previous compilation
    files_with_errors: HashSet<PathBuf>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the files that failed this time, returns the ones that were fixed
    pub fn update<'a>(&mut self, failed: impl IntoIterator<Item = &'a PathBuf>) -> Vec<PathBuf> {
        let current: HashSet<PathBuf> = failed.into_iter().cloned().collect();

        let mut fixed: Vec<PathBuf> = self.files_with_errors.difference(&current).cloned().collect();
        fixed.sort();

        self.files_with_errors = current;
        fixed
    }

    /// Check if there are any tracked errors
    pub fn has_errors(&self) -> bool {
        !self.files_with_errors.is_empty()
    }

    /// Get the number of files with errors
    pub fn error_count(&self) -> usize {
        self.files_with_errors.len()
    }
}

/// State carried across batches of file changes.
pub struct WatchSession {
    context: BuildContext,
    layout: WatchLayout,
    errors: ErrorTracker,
}

impl WatchSession {
    pub fn new(context: BuildContext) -> Self {
        let layout = WatchLayout::new(&context);
        Self { context, layout, errors: ErrorTracker::new() }
    }

    pub fn errors(&self) -> &ErrorTracker {
        &self.errors
    }

    /// Handle one debounced batch of changed paths.
    ///
    /// Stylesheet changes recompile every stylesheet once and produce a `css`
    /// event for the files that compiled; other watched changes produce a
    /// single `reload`. A broken stylesheet is logged and produces nothing.
    pub fn on_changes(&mut self, paths: &[PathBuf]) -> Vec<ReloadEvent> {
        let mut styles_changed = false;
        let mut reload = false;

        for path in paths {
            match self.layout.classify(path) {
                WatchRule::Styles => styles_changed = true,
                WatchRule::Reload => reload = true,
                WatchRule::Ignore => continue,
            }
            info!("Changed: {}", display_relative(&self.layout, path));
        }

        let mut events = Vec::new();
        if styles_changed {
            if let Some(event) = self.recompile_styles() {
                events.push(event);
            }
        }
        if reload {
            events.push(ReloadEvent::Reload);
        }
        events
    }

    fn recompile_styles(&mut self) -> Option<ReloadEvent> {
        let start = Instant::now();
        let report = match compile_dir(
            &self.context.styles_dir(),
            &self.context.css_cache_dir(),
            &StyleOptions::develop(&self.context),
            &CancelToken::new(),
        ) {
            Ok(report) => report,
            Err(e) => {
                error!("Stylesheet compilation failed: {}", e);
                return None;
            }
        };

        for fixed in self.errors.update(report.failed.iter().map(|(path, _)| path)) {
            info!("Fixed: {}", display_relative(&self.layout, &fixed));
        }
        for (path, e) in &report.failed {
            error!(path = %path.display(), "Stylesheet error: {}", e);
        }

        if report.written.is_empty() {
            return None;
        }

        let paths: Vec<String> = report
            .written
            .iter()
            .filter_map(|p| self.layout.relative(p).map(url_path))
            .collect();
        debug!(files = paths.len(), "Compiled stylesheets in {}", format_duration(start.elapsed()));

        Some(ReloadEvent::Css { paths })
    }
}

/// Format duration for display
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Relative path with `/` separators, as a browser would request it.
fn url_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn display_relative(layout: &WatchLayout, path: &Path) -> String {
    layout.relative(path).map(url_path).unwrap_or_else(|| path.display().to_string())
}

/// Watch the source tree until `shutdown` is set.
///
/// Every event produced by the session is handed to `on_event`. Blocks the
/// calling thread.
pub fn watch_source<F>(
    context: BuildContext,
    shutdown: &AtomicBool,
    mut on_event: F,
) -> Result<(), WatchError>
where
    F: FnMut(ReloadEvent),
{
    let src_dir = context.src_dir();
    if !src_dir.exists() {
        return Err(WatchError::SourceNotFound(src_dir));
    }

    let (tx, rx) = channel();

    let debounce_duration = Duration::from_millis(u64::from(context.config().watch.debounce_ms));
    let mut debouncer = new_debouncer(debounce_duration, tx).map_err(WatchError::WatcherInit)?;

    debouncer
        .watcher()
        .watch(&src_dir, RecursiveMode::Recursive)
        .map_err(WatchError::WatchPath)?;

    let mut session = WatchSession::new(context);
    info!("Watching {} for changes...", src_dir.display());

    while !shutdown.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(events)) => {
                let paths: Vec<PathBuf> = events
                    .into_iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                    .map(|e| e.path)
                    .collect();

                for event in session.on_changes(&paths) {
                    on_event(event);
                }
            }
            Ok(Err(error)) => {
                // non-fatal, keep watching
                warn!("Watch error: {:?}", error);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(WatchError::Channel("watcher stopped".to_string()));
            }
        }
    }

    debug!("Watcher stopped");
    Ok(())
}
