//! Interfaces to the tools that turn layers into files GeoServer can ingest.
//!
//! The publishing core never reads layer data itself, it asks a
//! [LayerExporter] for a GeoPackage, Shapefile or GeoTIFF and a
//! [StyleExporter] for a zipped SLD.

use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::models::layer::Layer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    GeoPackage,
    Shapefile,
    GeoTiff,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::GeoPackage => "gpkg",
            ExportFormat::Shapefile => "shp",
            ExportFormat::GeoTiff => "tif",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Export even if the layer source already is in the requested format.
    pub force: bool,
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            force: false,
        }
    }

    pub fn forced(format: ExportFormat) -> Self {
        Self {
            format,
            force: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("'{program}' failed: {stderr}")]
    Command { program: String, stderr: String },
    #[error("layer '{0}' has no style to export")]
    MissingStyle(String),
    #[error("layer '{layer}' cannot be exported as {format:?}")]
    Unsupported { layer: String, format: ExportFormat },
    #[error("{0}")]
    Other(String),
}

/// Writes layer data to a file in a given format.
pub trait LayerExporter: Send + Sync {
    /// Export `layer` into `target_dir`, returning the path of the written file.
    ///
    /// `fields` restricts the exported attributes, `None` exports all of them.
    /// For [ExportFormat::Shapefile] the returned path is the `.shp` file,
    /// its sidecar files are written next to it.
    fn export_layer(
        &self,
        layer: &Layer,
        fields: Option<&[String]>,
        options: ExportOptions,
        target_dir: &Path,
    ) -> Result<PathBuf, ExportError>;
}

/// Writes the style of a layer as a zipped SLD.
pub trait StyleExporter: Send + Sync {
    /// Write the style of `layer` to the archive `target`.
    ///
    /// Returns warnings about style features that could not be converted.
    fn save_style_as_zipped_sld(&self, layer: &Layer, target: &Path)
    -> Result<Vec<String>, ExportError>;
}

/// The exporters used by a publishing server.
#[derive(Clone)]
pub struct Exporters {
    pub layers: Arc<dyn LayerExporter>,
    pub styles: Arc<dyn StyleExporter>,
}

impl Exporters {
    pub fn new(layers: impl LayerExporter + 'static, styles: impl StyleExporter + 'static) -> Self {
        Self {
            layers: Arc::new(layers),
            styles: Arc::new(styles),
        }
    }
}

impl Debug for Exporters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporters").finish_non_exhaustive()
    }
}
