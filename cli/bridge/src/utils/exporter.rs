//! Layer export through `ogr2ogr` and `gdal_translate`.

use std::path::{Path, PathBuf};
use std::process::Command;

use bridge_rust_sdk::models::layer::{DataProvider, Layer, LayerKind};
use bridge_rust_sdk::models::postgis::PostgisConnection;
use bridge_rust_sdk::providers::export::{ExportError, ExportFormat, ExportOptions, LayerExporter};
use bridge_rust_sdk::utils::gpkg;
use tracing::{debug, info};

use super::command;

pub const OGR2OGR: &str = "ogr2ogr";
pub const GDAL_TRANSLATE: &str = "gdal_translate";

/// Exports layers with the GDAL command line tools.
#[derive(Debug, Clone)]
pub struct GdalExporter {
    ogr2ogr: PathBuf,
    gdal_translate: PathBuf,
}

impl Default for GdalExporter {
    fn default() -> Self {
        Self {
            ogr2ogr: OGR2OGR.into(),
            gdal_translate: GDAL_TRANSLATE.into(),
        }
    }
}

impl GdalExporter {
    pub fn new(ogr2ogr: impl Into<PathBuf>, gdal_translate: impl Into<PathBuf>) -> Self {
        Self {
            ogr2ogr: ogr2ogr.into(),
            gdal_translate: gdal_translate.into(),
        }
    }

    /// The command writing `layer` to `target` with `ogr2ogr`.
    pub(crate) fn vector_command(
        &self,
        layer: &Layer,
        fields: Option<&[String]>,
        format: ExportFormat,
        target: &Path,
    ) -> Command {
        let driver = match format {
            ExportFormat::Shapefile => "ESRI Shapefile",
            _ => "GPKG",
        };

        let mut command = Command::new(&self.ogr2ogr);
        command
            .args(["-f", driver, "-overwrite", "-nln"])
            .arg(layer.name())
            .args(["-t_srs", layer.crs.as_str()]);
        if let Some(fields) = fields {
            command.arg("-select").arg(fields.join(","));
        }
        command.arg(target);

        match layer.as_vector().map(|vector| &vector.provider) {
            Some(DataProvider::Postgres(connection)) => {
                command
                    .arg(pg_datasource(connection))
                    .arg(layer.source_path())
                    .env("PGPASSWORD", &connection.password);
            },
            _ => {
                let (path, table) = split_layer_option(&layer.source);
                command.arg(path);
                if let Some(table) = table {
                    command.arg(table);
                }
            },
        }
        command
    }

    pub(crate) fn raster_command(&self, layer: &Layer, target: &Path) -> Command {
        let mut command = Command::new(&self.gdal_translate);
        command
            .args(["-of", "GTiff"])
            .arg(layer.source_path())
            .arg(target);
        command
    }
}

/// The `PG:` datasource string of `connection`, without the password.
pub(crate) fn pg_datasource(connection: &PostgisConnection) -> String {
    format!(
        "PG:host={} port={} dbname={} user={} active_schema={}",
        connection.host, connection.port, connection.database, connection.username, connection.schema
    )
}

/// Split a layer source into the dataset path and the `layername` option.
pub(crate) fn split_layer_option(source: &str) -> (&str, Option<&str>) {
    let mut parts = source.split('|');
    let path = parts.next().unwrap_or_default();
    let table = parts.find_map(|option| option.strip_prefix("layername="));
    (path, table)
}

/// Whether `path` is a GeoPackage holding `table` as its only feature table.
///
/// GeoServer publishes the first feature table of an uploaded GeoPackage,
/// any other file is exported so that it does.
fn is_single_table_geopackage(path: &str, table: Option<&str>) -> bool {
    if !has_extension(path, &["gpkg"]) {
        return false;
    }
    match gpkg::feature_tables(Path::new(path)) {
        Ok(tables) => match tables.as_slice() {
            [only] => table.is_none_or(|table| table == only),
            _ => false,
        },
        Err(err) => {
            debug!(path, %err, "could not list GeoPackage tables");
            false
        },
    }
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    Path::new(path)
        .extension()
        .map(|ext| {
            extensions
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
        .unwrap_or(false)
}

impl LayerExporter for GdalExporter {
    fn export_layer(
        &self,
        layer: &Layer,
        fields: Option<&[String]>,
        options: ExportOptions,
        target_dir: &Path,
    ) -> Result<PathBuf, ExportError> {
        let (source, table) = split_layer_option(&layer.source);
        let is_file = matches!(
            layer.as_vector().map(|vector| &vector.provider),
            None | Some(DataProvider::Ogr)
        );

        match (&layer.kind, options.format) {
            (LayerKind::Vector(_), ExportFormat::GeoPackage)
                if !options.force
                    && fields.is_none()
                    && is_file
                    && is_single_table_geopackage(source, table) =>
            {
                info!("Layer '{}' is a GeoPackage already, not exporting", layer.title);
                return Ok(PathBuf::from(source));
            },
            (LayerKind::Raster, ExportFormat::GeoTiff)
                if !options.force && has_extension(source, &["tif", "tiff"]) =>
            {
                info!("Layer '{}' is a GeoTIFF already, not exporting", layer.title);
                return Ok(PathBuf::from(source));
            },
            _ => {},
        }

        let target = target_dir.join(format!("{}.{}", layer.name(), options.format.extension()));
        let mut command = match (&layer.kind, options.format) {
            (LayerKind::Vector(_), ExportFormat::GeoPackage | ExportFormat::Shapefile) => {
                self.vector_command(layer, fields, options.format, &target)
            },
            (LayerKind::Raster, ExportFormat::GeoTiff) => self.raster_command(layer, &target),
            (_, format) => {
                return Err(ExportError::Unsupported {
                    layer: layer.title.clone(),
                    format,
                });
            },
        };

        command::run(&mut command)?;
        info!(
            "Layer '{}' exported to '{}'",
            layer.title,
            target.display()
        );
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use bridge_rust_sdk::models::layer::{Extent, VectorLayer};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::command::display_command;

    fn vector(title: &str, source: &str, provider: DataProvider) -> Layer {
        Layer {
            title: title.to_string(),
            source: source.to_string(),
            crs: "EPSG:28992".to_string(),
            kind: LayerKind::Vector(VectorLayer {
                feature_count: 1,
                extent: Extent {
                    xmin: 0.0,
                    ymin: 0.0,
                    xmax: 1.0,
                    ymax: 1.0,
                },
                provider,
            }),
        }
    }

    fn raster(source: &str) -> Layer {
        Layer {
            title: "Elevation".to_string(),
            source: source.to_string(),
            crs: "EPSG:28992".to_string(),
            kind: LayerKind::Raster,
        }
    }

    /// Write a GeoPackage that only registers `tables` as feature tables.
    fn geopackage_with_tables(path: &Path, tables: &[&str]) {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE gpkg_geometry_columns (
                 table_name TEXT, column_name TEXT, geometry_type_name TEXT,
                 srs_id INTEGER, z TINYINT, m TINYINT);",
        )
        .unwrap();
        for table in tables {
            conn.execute(
                "INSERT INTO gpkg_geometry_columns VALUES (?1, 'geom', 'POINT', 28992, 0, 0)",
                [table],
            )
            .unwrap();
        }
    }

    #[test]
    fn geopackage_source_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.gpkg");
        geopackage_with_tables(&path, &["parcels"]);
        let exporter = GdalExporter::new("/bin/false", "/bin/false");

        for source in [
            format!("{}|layername=parcels", path.display()),
            path.display().to_string(),
        ] {
            let file = exporter
                .export_layer(
                    &vector("Parcels", &source, DataProvider::Ogr),
                    None,
                    ExportOptions::new(ExportFormat::GeoPackage),
                    dir.path(),
                )
                .unwrap();
            assert_eq!(file, path);
        }
    }

    #[test]
    fn geopackage_with_other_tables_is_exported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topo.gpkg");
        geopackage_with_tables(&path, &["parcels", "roads"]);
        let exporter = GdalExporter::new("bridge-test-no-such-ogr2ogr", GDAL_TRANSLATE);

        for source in [
            format!("{}|layername=roads", path.display()),
            format!("{}|layername=parcels", path.display()),
            path.display().to_string(),
        ] {
            let err = exporter
                .export_layer(
                    &vector("Roads", &source, DataProvider::Ogr),
                    None,
                    ExportOptions::new(ExportFormat::GeoPackage),
                    dir.path(),
                )
                .unwrap_err();
            assert!(matches!(err, ExportError::Io(_)), "{source} was not exported");
        }
    }

    #[test]
    fn unreadable_geopackage_is_exported() {
        let layer = vector("Parcels", "/data/missing.gpkg|layername=parcels", DataProvider::Ogr);
        let dir = tempfile::tempdir().unwrap();
        let exporter = GdalExporter::new("bridge-test-no-such-ogr2ogr", GDAL_TRANSLATE);

        let err = exporter
            .export_layer(
                &layer,
                None,
                ExportOptions::new(ExportFormat::GeoPackage),
                dir.path(),
            )
            .unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
    }

    #[test]
    fn geotiff_source_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = GdalExporter::new("/bin/false", "/bin/false");

        let file = exporter
            .export_layer(
                &raster("/data/dem.TIF"),
                None,
                ExportOptions::new(ExportFormat::GeoTiff),
                dir.path(),
            )
            .unwrap();
        assert_eq!(file, PathBuf::from("/data/dem.TIF"));
    }

    #[test]
    fn shapefile_export_command() {
        let layer = vector("Land Use", "/data/landuse.gpkg|layername=landuse", DataProvider::Ogr);
        let exporter = GdalExporter::default();
        let fields = ["code".to_string(), "area".to_string()];

        let command = exporter.vector_command(
            &layer,
            Some(&fields),
            ExportFormat::Shapefile,
            Path::new("/tmp/out/land_use.shp"),
        );
        assert_eq!(
            display_command(&command),
            "ogr2ogr -f 'ESRI Shapefile' -overwrite -nln land_use -t_srs 'EPSG:28992' \
             -select code,area /tmp/out/land_use.shp /data/landuse.gpkg landuse"
        );
    }

    #[test]
    fn postgis_layers_are_read_through_pg_datasource() {
        let connection = PostgisConnection {
            host: "db".to_string(),
            port: 5433,
            database: "gis".to_string(),
            schema: "data".to_string(),
            username: "reader".to_string(),
            password: "secret".to_string(),
        };
        let layer = vector("Roads", "data.roads", DataProvider::Postgres(connection));

        let command = GdalExporter::default().vector_command(
            &layer,
            None,
            ExportFormat::GeoPackage,
            Path::new("/tmp/roads.gpkg"),
        );
        let display = display_command(&command);
        assert_eq!(
            display,
            "ogr2ogr -f GPKG -overwrite -nln roads -t_srs 'EPSG:28992' /tmp/roads.gpkg \
             'PG:host=db port=5433 dbname=gis user=reader active_schema=data' data.roads"
        );
        assert!(!display.contains("secret"));
    }

    #[test]
    fn failing_tool_is_reported() {
        let layer = vector("Rivers", "/data/rivers.shp", DataProvider::Ogr);
        let dir = tempfile::tempdir().unwrap();
        let exporter = GdalExporter::new("bridge-test-no-such-ogr2ogr", GDAL_TRANSLATE);

        let err = exporter
            .export_layer(
                &layer,
                None,
                ExportOptions::new(ExportFormat::GeoPackage),
                dir.path(),
            )
            .unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
    }

    #[test]
    fn raster_cannot_become_shapefile() {
        let dir = tempfile::tempdir().unwrap();
        let err = GdalExporter::default()
            .export_layer(
                &raster("/data/dem.tif"),
                None,
                ExportOptions::forced(ExportFormat::Shapefile),
                dir.path(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::Unsupported {
                format: ExportFormat::Shapefile,
                ..
            }
        ));
    }
}
