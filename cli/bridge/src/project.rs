//! Project files describe the layers and groups to publish.
//!
//! ```toml
//! [[layers]]
//! title = "Parcels 2024"
//! source = "data/parcels.gpkg|layername=parcels"
//! style = "styles/parcels.sld"
//!
//! [[layers]]
//! title = "Elevation"
//! source = "data/dem.tif"
//! kind = "raster"
//! crs = "EPSG:28992"
//!
//! [[groups]]
//! name = "base"
//! title = "Base map"
//! layers = ["parcels_2024", "elevation"]
//! ```
//!
//! The GeoServer workspace is named after the project file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bridge_rust_sdk::models::group::GroupDescriptor;
use bridge_rust_sdk::models::layer::{
    DataProvider,
    Extent,
    Layer,
    LayerKind,
    VectorLayer,
    safe_name,
};
use bridge_rust_sdk::models::postgis::PostgisConnection;
use bridge_rust_sdk::models::workspace::WorkspaceName;
use bridge_rust_sdk::utils::gpkg;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::utils::exporter::split_layer_option;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("could not read project file '{}'", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
    #[error("layer '{layer}' uses unknown database '{database}'")]
    UnknownDatabase { layer: String, database: String },
    #[error("cannot determine the {field} of layer '{layer}', set '{field}' in the project file")]
    MissingLayerInfo { layer: String, field: &'static str },
    #[error("could not read GeoPackage '{}'", .path.display())]
    GeoPackage {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("GeoPackage '{}' has no feature table{}", .path.display(), fmt_table(.table))]
    NoFeatureTable {
        path: PathBuf,
        table: Option<String>,
    },
    #[error("layer names must be unique, '{0}' is used twice")]
    DuplicateLayer(String),
}

fn fmt_table(table: &Option<String>) -> String {
    table
        .as_ref()
        .map(|table| format!(" '{table}'"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerEntryKind {
    #[default]
    Vector,
    Raster,
}

/// A layer as written in the project file.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerEntry {
    pub title: String,
    /// Path relative to the project file, or `schema.table` for
    /// layers in a database.
    pub source: String,
    #[serde(default)]
    pub kind: LayerEntryKind,
    /// SLD file relative to the project file.
    #[serde(default)]
    pub style: Option<PathBuf>,
    /// Attributes to publish, all if missing.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// Id of a `[databases.<id>]` entry the layer is read from.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
    #[serde(default)]
    pub feature_count: Option<u64>,
    #[serde(default)]
    pub extent: Option<Extent>,
    /// Metadata page linked to the published layer.
    #[serde(default)]
    pub metadata_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    layers: Vec<LayerEntry>,
    #[serde(default)]
    groups: Vec<GroupDescriptor>,
}

/// A layer ready to be handed to the publishing core.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectLayer {
    pub layer: Layer,
    pub style: Option<PathBuf>,
    pub fields: Option<Vec<String>>,
    pub metadata_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Project {
    pub path: PathBuf,
    pub workspace: WorkspaceName,
    pub layers: Vec<ProjectLayer>,
    pub groups: Vec<GroupDescriptor>,
}

impl Project {
    /// Read the project at `path`, resolving database references against
    /// `databases` and reading layer details from GeoPackages.
    pub fn load(
        path: &Path,
        databases: &BTreeMap<String, PostgisConnection>,
    ) -> Result<Project, ProjectError> {
        let file: ProjectFile = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .build()
            .and_then(|raw| raw.try_deserialize())
            .map_err(|source| ProjectError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut names = Vec::new();
        let mut layers = Vec::with_capacity(file.layers.len());
        for entry in file.layers {
            let layer = resolve_layer(entry, base_dir, databases)?;
            let name = layer.layer.name();
            if names.contains(&name) {
                return Err(ProjectError::DuplicateLayer(name));
            }
            names.push(name);
            layers.push(layer);
        }

        Ok(Project {
            path: path.to_path_buf(),
            workspace: WorkspaceName::from_project_path(Some(path)),
            layers,
            groups: file.groups,
        })
    }

    /// The layers whose safe name is in `names`, all layers if `names` is empty.
    pub fn select_layers(&self, names: &[String]) -> Vec<&ProjectLayer> {
        self.layers
            .iter()
            .filter(|layer| names.is_empty() || names.contains(&safe_name(&layer.layer.title)))
            .collect()
    }

    /// Styles of the project's layers by layer name.
    pub fn styles(&self) -> BTreeMap<String, PathBuf> {
        self.layers
            .iter()
            .filter_map(|layer| Some((layer.layer.name(), layer.style.clone()?)))
            .collect()
    }
}

fn resolve_layer(
    entry: LayerEntry,
    base_dir: &Path,
    databases: &BTreeMap<String, PostgisConnection>,
) -> Result<ProjectLayer, ProjectError> {
    let missing = |field| ProjectError::MissingLayerInfo {
        layer: entry.title.clone(),
        field,
    };

    let (source, kind, crs) = match (entry.kind, &entry.database) {
        (LayerEntryKind::Raster, _) => {
            let crs = entry.crs.clone().ok_or_else(|| missing("crs"))?;
            (resolve_path(&entry.source, base_dir), LayerKind::Raster, crs)
        },
        (LayerEntryKind::Vector, Some(database)) => {
            let connection = databases.get(database).cloned().ok_or_else(|| {
                ProjectError::UnknownDatabase {
                    layer: entry.title.clone(),
                    database: database.clone(),
                }
            })?;
            let vector = VectorLayer {
                feature_count: entry.feature_count.ok_or_else(|| missing("feature_count"))?,
                extent: entry.extent.ok_or_else(|| missing("extent"))?,
                provider: DataProvider::Postgres(connection),
            };
            let crs = entry.crs.clone().ok_or_else(|| missing("crs"))?;
            (entry.source.clone(), LayerKind::Vector(vector), crs)
        },
        (LayerEntryKind::Vector, None) => {
            let source = resolve_path(&entry.source, base_dir);
            let (path, table) = split_layer_option(&source);
            let info = if path.ends_with(".gpkg") {
                let path = PathBuf::from(path);
                debug!(path = %path.display(), "reading layer details from GeoPackage");
                let info = gpkg::inspect(&path, table).map_err(|source| {
                    ProjectError::GeoPackage {
                        path: path.clone(),
                        source,
                    }
                })?;
                Some(info.ok_or_else(|| ProjectError::NoFeatureTable {
                    path,
                    table: table.map(str::to_string),
                })?)
            } else {
                None
            };

            let vector = VectorLayer {
                feature_count: entry
                    .feature_count
                    .or(info.as_ref().map(|info| info.feature_count))
                    .ok_or_else(|| missing("feature_count"))?,
                extent: entry
                    .extent
                    .or(info.as_ref().and_then(|info| info.extent))
                    .ok_or_else(|| missing("extent"))?,
                provider: DataProvider::Ogr,
            };
            let crs = entry
                .crs
                .clone()
                .or(info.and_then(|info| info.crs))
                .ok_or_else(|| missing("crs"))?;
            (source, LayerKind::Vector(vector), crs)
        },
    };

    Ok(ProjectLayer {
        layer: Layer {
            title: entry.title,
            source,
            crs,
            kind,
        },
        style: entry.style.map(|style| base_dir.join(style)),
        fields: entry.fields,
        metadata_url: entry.metadata_url,
    })
}

/// Make the path part of `source` absolute, keeping provider options.
fn resolve_path(source: &str, base_dir: &Path) -> String {
    let (path, options) = match source.split_once('|') {
        Some((path, options)) => (path, Some(options)),
        None => (source, None),
    };
    let path = base_dir.join(path);
    match options {
        Some(options) => format!("{}|{options}", path.display()),
        None => path.display().to_string(),
    }
}
