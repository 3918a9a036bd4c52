use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use httpmock::prelude::*;
use serde_json::json;

use super::export::{
    ExportError,
    ExportFormat,
    ExportOptions,
    Exporters,
    LayerExporter,
    StyleExporter,
};
use super::geoserver::GeoserverServer;
use super::postgis::PostgisDatabase;
use super::storage::Storage;
use crate::models::layer::{DataProvider, Extent, Layer, LayerKind, VectorLayer};
use crate::models::postgis::PostgisConnection;
use crate::models::server::ServerSettings;
use crate::models::workspace::WorkspaceName;
use crate::utils::archive::{SHAPEFILE_COMPONENTS, zip_files};
use crate::utils::gpkg::write_test_geopackage;

/// Writes small but valid files instead of converting layer data,
/// and records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct MockExporter {
    exports: Arc<Mutex<Vec<ExportFormat>>>,
    styles: Arc<Mutex<Vec<String>>>,
    /// Return GeoPackage sources as they are instead of writing a file.
    passthrough: bool,
}

impl MockExporter {
    pub fn passthrough() -> Self {
        Self {
            passthrough: true,
            ..Default::default()
        }
    }

    pub fn export_count(&self) -> usize {
        self.exports.lock().unwrap().len()
    }

    pub fn exported_formats(&self) -> Vec<ExportFormat> {
        self.exports.lock().unwrap().clone()
    }

    pub fn style_count(&self) -> usize {
        self.styles.lock().unwrap().len()
    }
}

fn source_stem(layer: &Layer) -> String {
    Path::new(layer.source_path())
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| layer.name())
}

impl LayerExporter for MockExporter {
    fn export_layer(
        &self,
        layer: &Layer,
        _fields: Option<&[String]>,
        options: ExportOptions,
        target_dir: &Path,
    ) -> Result<PathBuf, ExportError> {
        self.exports.lock().unwrap().push(options.format);
        if self.passthrough && options.format == ExportFormat::GeoPackage {
            return Ok(PathBuf::from(layer.source_path()));
        }

        let table = layer
            .source_table()
            .map(str::to_string)
            .unwrap_or_else(|| source_stem(layer));
        let path = target_dir.join(format!("{table}.{}", options.format.extension()));
        match options.format {
            ExportFormat::GeoPackage => write_test_geopackage(&path, &table, 1),
            ExportFormat::Shapefile => {
                for ext in SHAPEFILE_COMPONENTS {
                    fs::write(path.with_extension(ext), ext)?;
                }
            },
            ExportFormat::GeoTiff => fs::write(&path, b"II*\0")?,
        }
        Ok(path)
    }
}

impl StyleExporter for MockExporter {
    fn save_style_as_zipped_sld(
        &self,
        layer: &Layer,
        target: &Path,
    ) -> Result<Vec<String>, ExportError> {
        self.styles.lock().unwrap().push(layer.name());

        let sld = target.with_extension("sld");
        fs::write(&sld, "<StyledLayerDescriptor/>")?;
        zip_files(target, [(sld.as_path(), "style.sld")])
            .map_err(|err| ExportError::Other(err.to_string()))?;
        Ok(vec![])
    }
}

/// A database that remembers the layers imported into it.
#[derive(Debug)]
pub struct MockDatabase {
    connection: PostgisConnection,
    imported: Mutex<Vec<String>>,
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self {
            connection: PostgisConnection {
                host: "localhost".to_string(),
                port: 5432,
                database: "gis".to_string(),
                schema: "public".to_string(),
                username: "bridge".to_string(),
                password: "bridge".to_string(),
            },
            imported: Mutex::new(Vec::new()),
        }
    }
}

impl MockDatabase {
    pub fn imported(&self) -> Vec<String> {
        self.imported.lock().unwrap().clone()
    }
}

impl PostgisDatabase for MockDatabase {
    fn connection(&self) -> &PostgisConnection {
        &self.connection
    }

    fn import_layer(&self, layer: &Layer, _fields: Option<&[String]>) -> Result<(), ExportError> {
        self.imported.lock().unwrap().push(layer.title.clone());
        Ok(())
    }
}

pub fn vector_layer(title: &str, source: &str) -> Layer {
    Layer {
        title: title.to_string(),
        source: source.to_string(),
        crs: "EPSG:4326".to_string(),
        kind: LayerKind::Vector(VectorLayer {
            feature_count: 10,
            extent: Extent {
                xmin: 4.123456,
                ymin: 51.999999,
                xmax: 5.5,
                ymax: 53.25,
            },
            provider: DataProvider::Ogr,
        }),
    }
}

pub fn raster_layer(title: &str, source: &str) -> Layer {
    Layer {
        title: title.to_string(),
        source: source.to_string(),
        crs: "EPSG:28992".to_string(),
        kind: LayerKind::Raster,
    }
}

pub fn server_in_workspace(
    mock_server: &MockServer,
    workspace: &str,
    storage: Storage,
    exporter: MockExporter,
) -> GeoserverServer {
    let settings = ServerSettings {
        name: "test".to_string(),
        url: mock_server.url("/geoserver"),
        username: Some("admin".to_string()),
        password: Some("geoserver".to_string()),
        ..Default::default()
    };
    GeoserverServer::new(
        &settings,
        WorkspaceName::new(workspace),
        storage,
        Exporters::new(exporter.clone(), exporter),
    )
    .unwrap()
}

pub fn server_with_exporter(
    mock_server: &MockServer,
    storage: Storage,
    exporter: MockExporter,
) -> GeoserverServer {
    server_in_workspace(mock_server, "project", storage, exporter)
}

/// A server in workspace `project` with file based storage.
pub fn test_server(mock_server: &MockServer) -> GeoserverServer {
    server_with_exporter(mock_server, Storage::FileBased, MockExporter::default())
}

/// A server that is never contacted.
pub fn server_with_storage(url: &str, storage: Storage) -> GeoserverServer {
    let settings = ServerSettings {
        url: url.to_string(),
        ..Default::default()
    };
    let exporter = MockExporter::default();
    GeoserverServer::new(
        &settings,
        WorkspaceName::new("project"),
        storage,
        Exporters::new(exporter.clone(), exporter),
    )
    .unwrap()
}

/// Mocks binding style `name` to layer `name`, returning the update mock.
pub fn mock_layer_style_binding<'a>(mock_server: &'a MockServer, name: &str) -> httpmock::Mock<'a> {
    let path = format!("/geoserver/rest/workspaces/project/layers/{name}.json");
    mock_server.mock(|when, then| {
        when.method(GET).path(path.clone());
        then.status(200).json_body(json!({"layer": {"name": name}}));
    });
    let href = mock_server.url(format!("/geoserver/rest/workspaces/project/styles/{name}.json"));
    mock_server.mock(|when, then| {
        when.method(PUT).path(path).json_body(json!({"layer": {
            "name": name,
            "defaultStyle": {"name": name, "href": href}
        }}));
        then.status(200);
    })
}
