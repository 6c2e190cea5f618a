//! Pipeline definitions and task dispatch.
//!
//! The two commands are fixed compositions of tasks:
//!
//! - `develop`: `clean-css -> dev-css -> serve`
//! - `build`: `clean-dist -> [html, css, js, img]`

use crate::build::{BuildContext, CancelToken, Step, TaskKind, TaskPlan};
use crate::tasks::{self, TaskError, TaskOutput};

/// A top-level command pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// Clean the CSS cache, compile it, then serve and watch
    Develop,
    /// Clean the output, then build every asset kind concurrently
    Build,
}

impl Pipeline {
    /// The pipeline's task composition.
    pub fn step(&self) -> Step {
        match self {
            Pipeline::Develop => Step::series(vec![
                Step::task(TaskKind::CleanGeneratedCss),
                Step::task(TaskKind::CompileDevCss),
                Step::task(TaskKind::Serve),
            ]),
            Pipeline::Build => Step::series(vec![
                Step::task(TaskKind::CleanOutput),
                Step::parallel(vec![
                    Step::task(TaskKind::BuildMarkup),
                    Step::task(TaskKind::BuildStyles),
                    Step::task(TaskKind::BuildScripts),
                    Step::task(TaskKind::BuildImages),
                ]),
            ]),
        }
    }

    /// The compiled plan.
    pub fn plan(&self) -> TaskPlan {
        self.step().into_plan()
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pipeline::Develop => write!(f, "develop"),
            Pipeline::Build => write!(f, "build"),
        }
    }
}

/// Run the adapter behind a task kind.
pub fn execute_task(
    kind: TaskKind,
    context: &BuildContext,
    cancel: &CancelToken,
) -> Result<TaskOutput, TaskError> {
    match kind {
        TaskKind::CleanGeneratedCss => tasks::clean::clean_dir(&context.css_cache_dir()),
        TaskKind::CompileDevCss => tasks::styles::compile_dev(context, cancel),
        TaskKind::Serve => crate::server::serve(context),
        TaskKind::CleanOutput => tasks::clean::clean_dir(&context.out_dir()),
        TaskKind::BuildMarkup => tasks::markup::build_markup(context, cancel),
        TaskKind::BuildStyles => tasks::styles::build_styles(context, cancel),
        TaskKind::BuildScripts => tasks::scripts::build_scripts(context, cancel),
        TaskKind::BuildImages => tasks::images::build_images(context, cancel),
    }
}
