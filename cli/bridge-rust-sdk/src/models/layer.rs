use serde::{Deserialize, Serialize};

use super::postgis::PostgisConnection;

/// Number of decimals kept for extents sent to GeoServer.
pub const EXTENT_DECIMALS: i32 = 5;

/// A map layer as handed to the publishing core.
///
/// Layers are read-only inputs, the core never modifies them.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Display name, may contain spaces.
    pub title: String,
    /// Data source string, optionally followed by `|`-separated options
    /// (e.g. `/data/parcels.gpkg|layername=parcels`).
    pub source: String,
    /// Authority identifier of the layer CRS, e.g. `EPSG:4326`.
    pub crs: String,
    pub kind: LayerKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Vector(VectorLayer),
    Raster,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    pub feature_count: u64,
    pub extent: Extent,
    pub provider: DataProvider,
}

/// The native data provider of a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum DataProvider {
    /// File based vector data (GeoPackage, Shapefile, ...).
    Ogr,
    /// A table in an existing PostGIS database.
    Postgres(PostgisConnection),
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn rounded(&self, decimals: i32) -> Extent {
        let factor = 10f64.powi(decimals);
        let round = |value: f64| (value * factor).round() / factor;
        Extent {
            xmin: round(self.xmin),
            ymin: round(self.ymin),
            xmax: round(self.xmax),
            ymax: round(self.ymax),
        }
    }
}

impl Layer {
    /// The name used for GeoServer resource identifiers.
    pub fn name(&self) -> String {
        safe_name(&self.title)
    }

    /// The data source without provider options.
    pub fn source_path(&self) -> &str {
        self.source
            .split_once('|')
            .map(|(path, _)| path)
            .unwrap_or(&self.source)
    }

    /// The table named by the `layername` option of the source, if any.
    pub fn source_table(&self) -> Option<&str> {
        self.source
            .split('|')
            .skip(1)
            .find_map(|option| option.strip_prefix("layername="))
    }

    pub fn as_vector(&self) -> Option<&VectorLayer> {
        match &self.kind {
            LayerKind::Vector(vector) => Some(vector),
            LayerKind::Raster => None,
        }
    }
}

/// Derive an identifier that is safe to use in GeoServer REST paths.
///
/// `"Parcels 2024"` becomes `"parcels_2024"`.
pub fn safe_name(title: &str) -> String {
    title
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
