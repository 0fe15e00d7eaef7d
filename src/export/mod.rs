//! Export of a styled tree to SVG, PNG or PDF.
//!
//! Every backend renders the whole document into memory first; the sink only
//! sees a single `write_all`.

use std::fmt;
use std::io::{self, Write};

use clap::ValueEnum;
use log::info;
use thiserror::Error;

use crate::render::{DrawOptions, RenderError};
use crate::style::Color;
use crate::tree::Tree;

pub mod pdf;
pub mod raster;
pub mod svg;

pub use raster::RasterOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Svg,
    Png,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Svg => "svg",
            ExportFormat::Png => "png",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Svg => "SVG",
            ExportFormat::Png => "PNG",
            ExportFormat::Pdf => "PDF",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub draw: DrawOptions,
    pub background: Color,
    pub raster: RasterOptions,
    /// Document title, used by the PDF backend.
    pub title: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            draw: DrawOptions::default(),
            background: Color::WHITE,
            raster: RasterOptions::default(),
            title: "Tree".to_owned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    /// A required argument was absent; nothing has been written.
    #[error("missing required export argument `{0}`")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to write exported document")]
    Io(#[from] io::Error),
}

/// Renders `tree` in `format` and writes it to `sink`.
///
/// Arguments are checked in order `tree`, `sink`, `options`; the first absent
/// one is reported without touching the sink.
pub fn export(
    format: ExportFormat,
    tree: Option<&Tree>,
    sink: Option<&mut dyn Write>,
    options: Option<&ExportOptions>,
) -> Result<(), ExportError> {
    let tree = tree.ok_or(ExportError::MissingArgument("tree"))?;
    let sink = sink.ok_or(ExportError::MissingArgument("sink"))?;
    let options = options.ok_or(ExportError::MissingArgument("options"))?;

    let bytes = render_bytes(format, tree, options)?;
    sink.write_all(&bytes)?;
    sink.flush()?;
    info!("exported {} ({} bytes)", format, bytes.len());
    Ok(())
}

/// Renders `tree` to an in-memory document.
pub fn render_bytes(
    format: ExportFormat,
    tree: &Tree,
    options: &ExportOptions,
) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Svg => svg::render_svg(tree, options),
        ExportFormat::Png => raster::render_png(tree, options),
        ExportFormat::Pdf => pdf::render_pdf(tree, options),
    }
}

pub fn export_svg(
    tree: Option<&Tree>,
    sink: Option<&mut dyn Write>,
    options: Option<&ExportOptions>,
) -> Result<(), ExportError> {
    export(ExportFormat::Svg, tree, sink, options)
}

pub fn export_png(
    tree: Option<&Tree>,
    sink: Option<&mut dyn Write>,
    options: Option<&ExportOptions>,
) -> Result<(), ExportError> {
    export(ExportFormat::Png, tree, sink, options)
}

pub fn export_pdf(
    tree: Option<&Tree>,
    sink: Option<&mut dyn Write>,
    options: Option<&ExportOptions>,
) -> Result<(), ExportError> {
    export(ExportFormat::Pdf, tree, sink, options)
}
