//! Pipeline engine for sitepipe
//!
//! Composes leaf tasks into the `develop` and `build` pipelines and runs
//! them.
//!
//! # Overview
//!
//! - **Composition**: [`Step`] trees of series/parallel tasks
//! - **Planning**: a [`TaskPlan`] with explicit dependencies, grouped into levels
//! - **Execution**: [`TaskRunner`] runs each level concurrently with fail-fast cancellation
//!
//! # Example
//!
//! ```ignore
//! use sitepipe::build::{BuildContext, Pipeline, TaskRunner};
//! use sitepipe::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, project_root);
//!
//! let result = TaskRunner::new(context).run(&Pipeline::Build.plan())?;
//! println!("{}", result.summary());
//! ```

pub mod context;
pub mod parallel;
pub mod pipeline;
pub mod result;
pub mod target;

pub use context::*;
pub use parallel::*;
pub use pipeline::*;
pub use result::*;
pub use target::*;
