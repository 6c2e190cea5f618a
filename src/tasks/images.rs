//! Image compression.
//!
//! Files under the image directory are compressed in parallel and written
//! to the same relative path in the output. Each format goes to its own
//! encoder; unknown formats are copied. A result that is not smaller than
//! the source is discarded in favour of the source bytes.

use super::svg::{optimize_svg, SvgOptions};
use super::{write_file, TaskError, TaskOutput};
use crate::build::{BuildContext, CancelToken};
use image::codecs::jpeg::JpegEncoder;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Image formats with a dedicated compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Gif,
    Jpeg,
    Png,
    Svg,
    /// Copied unchanged
    Other,
}

impl ImageFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "gif" => ImageFormat::Gif,
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            "png" => ImageFormat::Png,
            "svg" => ImageFormat::Svg,
            _ => ImageFormat::Other,
        }
    }
}

/// Per-format compression settings.
#[derive(Debug, Clone, Copy)]
pub struct ImageOptions {
    pub gif_interlaced: bool,
    pub jpeg_quality: u8,
    pub png_level: u8,
    pub svg: SvgOptions,
}

impl ImageOptions {
    pub fn from_context(ctx: &BuildContext) -> Self {
        let images = &ctx.config().images;
        Self {
            gif_interlaced: images.gif_interlaced,
            jpeg_quality: images.jpeg_quality,
            png_level: images.png_level,
            svg: SvgOptions {
                remove_viewbox: images.svg_remove_viewbox,
                cleanup_ids: images.svg_cleanup_ids,
            },
        }
    }
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self { gif_interlaced: true, jpeg_quality: 75, png_level: 5, svg: SvgOptions::default() }
    }
}

/// Compress one image.
///
/// Returns the smaller of the compressed and the original bytes.
pub fn compress_image(
    path: &Path,
    data: &[u8],
    options: &ImageOptions,
) -> Result<Vec<u8>, TaskError> {
    let image_error =
        |message: String| TaskError::Image { path: path.to_path_buf(), message };

    let format = ImageFormat::from_path(path);
    let optimized = match format {
        ImageFormat::Gif => compress_gif(data, options.gif_interlaced).map_err(image_error)?,
        ImageFormat::Jpeg => compress_jpeg(data, options.jpeg_quality).map_err(image_error)?,
        ImageFormat::Png => compress_png(data, options.png_level).map_err(image_error)?,
        ImageFormat::Svg => {
            let text = std::str::from_utf8(data)
                .map_err(|e| image_error(format!("SVG is not valid UTF-8: {}", e)))?;
            optimize_svg(text, options.svg).map_err(image_error)?.into_bytes()
        }
        ImageFormat::Other => return Ok(data.to_vec()),
    };

    if optimized.len() < data.len() {
        Ok(optimized)
    } else {
        debug!(path = %path.display(), ?format, "Compressed image is not smaller, keeping original");
        Ok(data.to_vec())
    }
}

/// `img`: compress every file under the image directory.
pub fn build_images(ctx: &BuildContext, cancel: &CancelToken) -> Result<TaskOutput, TaskError> {
    let src_dir = ctx.images_dir();
    let out_dir = ctx.out_images_dir();
    let options = ImageOptions::from_context(ctx);

    let sources = image_sources(&src_dir)?;

    let written = sources
        .par_iter()
        .map(|source| {
            cancel.check()?;

            let relative = source.strip_prefix(&src_dir).unwrap_or(source);
            let out_path = out_dir.join(relative);

            let data = fs::read(source).map_err(|e| TaskError::io(source, e))?;
            let compressed = compress_image(source, &data, &options)?;
            write_file(&out_path, &compressed)?;

            debug!(
                from = %source.display(),
                to = %out_path.display(),
                before = data.len(),
                after = compressed.len(),
                "Compressed image"
            );
            Ok(out_path)
        })
        .collect::<Result<Vec<PathBuf>, TaskError>>()?;

    let mut output = TaskOutput::with_outputs(written);

    let has_jpeg = sources.iter().any(|p| ImageFormat::from_path(p) == ImageFormat::Jpeg);
    if has_jpeg && ctx.config().images.jpeg_progressive {
        let message = "progressive JPEG encoding is unavailable, wrote baseline JPEGs";
        warn!("{}", message);
        output.warn(message);
    }

    Ok(output)
}

/// Every file below `dir`, sorted.
fn image_sources(dir: &Path) -> Result<Vec<PathBuf>, TaskError> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut files = Vec::new();
    for entry in glob::glob(&pattern).map_err(|e| TaskError::Pattern(e.to_string()))? {
        let path = entry.map_err(|e| TaskError::Pattern(e.to_string()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn compress_png(data: &[u8], level: u8) -> Result<Vec<u8>, String> {
    oxipng::optimize_from_memory(data, &oxipng::Options::from_preset(level)).map_err(|e| e.to_string())
}

fn compress_jpeg(data: &[u8], quality: u8) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| e.to_string())?;

    let mut out = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        let encoded = if img.color().has_color() {
            encoder.encode_image(&img.to_rgb8())
        } else {
            encoder.encode_image(&img.to_luma8())
        };
        encoded.map_err(|e| e.to_string())?;
    }

    Ok(out)
}

/// Re-encode every frame with the same palettes, optionally interlaced.
fn compress_gif(data: &[u8], interlaced: bool) -> Result<Vec<u8>, String> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(data).map_err(|e| e.to_string())?;

    let width = decoder.width();
    let height = decoder.height();
    let global_palette = decoder.global_palette().map(|p| p.to_vec()).unwrap_or_default();

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().map_err(|e| e.to_string())? {
        frames.push(frame.clone());
    }
    let repeat = decoder.repeat();

    let mut out = Vec::new();
    {
        let mut encoder =
            gif::Encoder::new(&mut out, width, height, &global_palette).map_err(|e| e.to_string())?;
        if frames.len() > 1 {
            encoder.set_repeat(repeat).map_err(|e| e.to_string())?;
        }

        for mut frame in frames {
            // decoded buffers are always in display row order
            if interlaced {
                let reordered =
                    interlace_rows(&frame.buffer, usize::from(frame.width), usize::from(frame.height));
                frame.buffer = reordered.into();
            }
            frame.interlaced = interlaced;
            encoder.write_frame(&frame).map_err(|e| e.to_string())?;
        }
    }

    Ok(out)
}

/// Row order of an interlaced GIF frame: every 8th row from 0, every 8th
/// from 4, every 4th from 2, then every 2nd from 1.
fn interlace_order(height: usize) -> impl Iterator<Item = usize> {
    (0..height)
        .step_by(8)
        .chain((4..height).step_by(8))
        .chain((2..height).step_by(4))
        .chain((1..height).step_by(2))
}

fn interlace_rows(buffer: &[u8], width: usize, height: usize) -> Vec<u8> {
    if width == 0 || buffer.len() < width * height {
        return buffer.to_vec();
    }

    let mut out = Vec::with_capacity(buffer.len());
    for row in interlace_order(height) {
        out.extend_from_slice(&buffer[row * width..(row + 1) * width]);
    }
    out
}
