use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use bridge_rust_sdk::models::layer::{DataProvider, Layer};
use bridge_rust_sdk::models::postgis::PostgisConnection;
use bridge_rust_sdk::providers::export::ExportError;
use bridge_rust_sdk::providers::postgis::{PostgisDatabase, PostgisRegistry};
use tracing::info;

use super::command;
use super::exporter::{OGR2OGR, pg_datasource, split_layer_option};

/// A PostGIS database layers are copied into with `ogr2ogr`.
#[derive(Debug, Clone)]
pub struct OgrPostgisDatabase {
    connection: PostgisConnection,
    ogr2ogr: PathBuf,
}

impl OgrPostgisDatabase {
    pub fn new(connection: PostgisConnection) -> Self {
        Self {
            connection,
            ogr2ogr: OGR2OGR.into(),
        }
    }

    /// The command copying `layer` into a table named after the layer.
    pub(crate) fn import_command(&self, layer: &Layer, fields: Option<&[String]>) -> Command {
        let mut command = Command::new(&self.ogr2ogr);
        command
            .args(["-f", "PostgreSQL", "-overwrite", "-nln"])
            .arg(layer.name())
            .args(["-lco", "GEOMETRY_NAME=geom", "-lco", "FID=fid"])
            .args(["-lco", "SPATIAL_INDEX=GIST", "-nlt", "PROMOTE_TO_MULTI"]);
        if let Some(fields) = fields {
            command.arg("-select").arg(fields.join(","));
        }
        command
            .arg(pg_datasource(&self.connection))
            .env("PGPASSWORD", &self.connection.password);

        match layer.as_vector().map(|vector| &vector.provider) {
            Some(DataProvider::Postgres(source)) => {
                command
                    .arg(pg_datasource(source))
                    .arg(layer.source_path());
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
}

impl PostgisDatabase for OgrPostgisDatabase {
    fn connection(&self) -> &PostgisConnection {
        &self.connection
    }

    fn import_layer(&self, layer: &Layer, fields: Option<&[String]>) -> Result<(), ExportError> {
        command::run(&mut self.import_command(layer, fields))?;
        info!(
            "Layer '{}' copied to PostGIS database '{}' on {}",
            layer.title, self.connection.database, self.connection.host
        );
        Ok(())
    }
}

/// The databases Bridge may copy layers into, by configured id.
pub fn registry(databases: &BTreeMap<String, PostgisConnection>) -> PostgisRegistry {
    databases
        .iter()
        .map(|(id, connection)| {
            let database: Arc<dyn PostgisDatabase> =
                Arc::new(OgrPostgisDatabase::new(connection.clone()));
            (id.clone(), database)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use bridge_rust_sdk::models::layer::{Extent, LayerKind, VectorLayer};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::command::display_command;

    fn connection() -> PostgisConnection {
        PostgisConnection {
            host: "db.example.com".to_string(),
            port: 5432,
            database: "gis".to_string(),
            schema: "public".to_string(),
            username: "bridge".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn imports_into_table_named_after_layer() {
        let layer = Layer {
            title: "Land Use".to_string(),
            source: "/data/landuse.gpkg|layername=landuse".to_string(),
            crs: "EPSG:28992".to_string(),
            kind: LayerKind::Vector(VectorLayer {
                feature_count: 2,
                extent: Extent {
                    xmin: 0.0,
                    ymin: 0.0,
                    xmax: 1.0,
                    ymax: 1.0,
                },
                provider: DataProvider::Ogr,
            }),
        };
        let database = OgrPostgisDatabase::new(connection());

        let command = database.import_command(&layer, None);
        let display = display_command(&command);
        assert_eq!(
            display,
            "ogr2ogr -f PostgreSQL -overwrite -nln land_use -lco GEOMETRY_NAME=geom -lco FID=fid \
             -lco SPATIAL_INDEX=GIST -nlt PROMOTE_TO_MULTI \
             'PG:host=db.example.com port=5432 dbname=gis user=bridge active_schema=public' \
             /data/landuse.gpkg landuse"
        );
        assert!(!display.contains("secret"));
        assert!(
            command
                .get_envs()
                .any(|(key, value)| key == "PGPASSWORD" && value == Some(OsStr::new("secret")))
        );
    }

    #[test]
    fn registry_keeps_ids() {
        let databases = BTreeMap::from([("gis".to_string(), connection())]);
        let registry = registry(&databases);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry["gis"].connection(), &connection());
    }
}
