//! Pipeline command implementations (develop, build)

use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{BuildContext, BuildResult, Pipeline, TaskRunner};

/// Run the develop command: clean-css, dev-css, then serve until Ctrl+C.
pub fn run_develop(context: BuildContext) -> ExitCode {
    let src_dir = context.src_dir();
    if !src_dir.is_dir() {
        eprintln!("Error: Source directory not found: {}", src_dir.display());
        eprintln!("Create the directory or specify a different path with --src");
        return ExitCode::from(EXIT_ERROR);
    }

    let verbose = context.is_verbose();
    // every develop step is sequential
    let runner = TaskRunner::new(context).with_jobs(1);
    match runner.run(&Pipeline::Develop.plan()) {
        Ok(result) => finish(&result, verbose),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the build command.
pub fn run_build(context: BuildContext, dry_run: bool, jobs: Option<usize>) -> ExitCode {
    let src_dir = context.src_dir();
    if !src_dir.is_dir() {
        eprintln!("Error: Source directory not found: {}", src_dir.display());
        eprintln!("Create the directory or specify a different path with --src");
        return ExitCode::from(EXIT_ERROR);
    }

    let plan = Pipeline::Build.plan();

    if dry_run {
        return match plan.levels() {
            Ok(levels) => {
                println!("Dry run - would build:");
                println!("  Source: {}", src_dir.display());
                println!("  Output: {}", context.out_dir().display());
                println!("  Tasks:");
                for (depth, level) in levels.iter().enumerate() {
                    let names: Vec<&str> = level.iter().map(|t| t.id.as_str()).collect();
                    println!("    {}. {}", depth + 1, names.join(", "));
                }
                ExitCode::from(EXIT_SUCCESS)
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::from(EXIT_ERROR)
            }
        };
    }

    let verbose = context.is_verbose();
    let mut runner = TaskRunner::new(context);
    if let Some(jobs) = jobs {
        runner = runner.with_jobs(jobs);
    }

    match runner.run(&plan) {
        Ok(result) => finish(&result, verbose),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn finish(result: &BuildResult, verbose: bool) -> ExitCode {
    if verbose {
        for line in result.details() {
            println!("{}", line);
        }
    }
    println!("{}", result.summary());
    if result.is_success() {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_ERROR)
    }
}
