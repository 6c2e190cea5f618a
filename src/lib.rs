//! sitepipe - asset pipeline for static sites
//!
//! This library provides functionality to:
//! - Compile SCSS to vendor-prefixed CSS with source maps
//! - Minify HTML and transpile/minify JavaScript
//! - Compress GIF, JPEG, PNG and SVG images
//! - Serve the source tree with live reload while developing

pub mod build;
pub mod cli;
pub mod config;
pub mod server;
pub mod tasks;
pub mod watch;
