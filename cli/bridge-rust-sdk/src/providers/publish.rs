//! Publishing single layers.

use std::io;
use std::path::{Path, PathBuf};

use derive_more::Display;
use geoserver_client::{GeoserverClientError, Method, RequestBody};
use thiserror::Error;
use tracing::{error, info, instrument};

use super::export::{ExportError, ExportFormat, ExportOptions};
use super::geoserver::GeoserverServer;
use super::session::PublishSession;
use super::storage::StoragePublisher;
use crate::models::layer::{DataProvider, Layer, LayerKind};
use crate::utils::archive::ArchiveError;

pub const CONTENT_TYPE_GEOTIFF: &str = "image/tiff";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Client(#[from] GeoserverClientError),

    #[error("could not export layer '{layer}'")]
    Export {
        layer: String,
        #[source]
        source: ExportError,
    },

    #[error("could not read GeoPackage '{}'", .path.display())]
    GeoPackage {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("GeoPackage '{}' does not contain a feature table", .0.display())]
    EmptyGeoPackage(PathBuf),

    #[error("GeoPackage '{}' has no feature table '{table}'", .path.display())]
    MissingFeatureTable { path: PathBuf, table: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("could not read '{}'", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not create a directory for exported files")]
    TempDir(#[source] io::Error),

    #[error("invalid PostGIS datastore reference '{0}', expected 'workspace:datastore'")]
    InvalidDatastoreTemplate(String),

    #[error("no PostGIS datastore is selected for the GeoServer Importer")]
    MissingDatastoreTemplate,

    #[error("the GeoServer Importer did not create a task for import {0}")]
    MissingImportTask(i64),

    #[error("layer '{0}' has no feature type or coverage")]
    MissingLayerResource(String),
}

/// Why a layer was not published.
///
/// Skipped layers have been reported in the log, they do not stop
/// the remaining layers from being published.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SkipReason {
    #[display("layer contains zero features")]
    NoFeatures,
    #[display("cannot find the PostGIS database '{_0}'")]
    MissingDatabase(String),
    #[display("{_0}")]
    ImportFailed(String),
    #[display("the import did not finish in time")]
    ImportPending,
    #[display("the feature type was not created, check the GeoServer logs")]
    FeatureTypeMissing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The layer was published under `name`.
    Published { name: String },
    Skipped(SkipReason),
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>, PublishError> {
    std::fs::read(path).map_err(|source| PublishError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

impl GeoserverServer {
    /// Publish the data of `layer`, binding a style of the same name.
    ///
    /// The style should have been published with
    /// [GeoserverServer::publish_style] before.
    /// `fields` restricts the published attributes of vector layers.
    #[instrument(skip_all, fields(progress = format!("Publishing layer '{}'", layer.title)))]
    pub async fn publish_layer(
        &self,
        session: &mut PublishSession,
        layer: &Layer,
        fields: Option<&[String]>,
    ) -> Result<PublishOutcome, PublishError> {
        let outcome = match &layer.kind {
            LayerKind::Vector(vector) => {
                if vector.feature_count == 0 {
                    error!(
                        "Layer '{}' contains zero features and cannot be published",
                        layer.title
                    );
                    return Ok(PublishOutcome::Skipped(SkipReason::NoFeatures));
                }

                match &vector.provider {
                    DataProvider::Postgres(connection) if self.use_original_data_source() => {
                        self.publish_vector_layer_from_postgis(layer, connection)
                            .await?
                    },
                    _ => {
                        self.storage()
                            .publish_vector(self, session, layer, fields)
                            .await?
                    },
                }
            },
            LayerKind::Raster => self.publish_raster_layer(session, layer, fields).await?,
        };

        session.layer_cache_mut().invalidate();
        Ok(outcome)
    }

    /// Export `layer` into the session directory.
    pub(crate) fn export_layer(
        &self,
        session: &PublishSession,
        layer: &Layer,
        fields: Option<&[String]>,
        options: ExportOptions,
    ) -> Result<PathBuf, PublishError> {
        self.exporters()
            .layers
            .export_layer(layer, fields, options, session.temp_dir())
            .map_err(|source| PublishError::Export {
                layer: layer.title.clone(),
                source,
            })
    }

    /// Upload a raster layer as GeoTIFF coverage store.
    async fn publish_raster_layer(
        &self,
        session: &mut PublishSession,
        layer: &Layer,
        fields: Option<&[String]>,
    ) -> Result<PublishOutcome, PublishError> {
        let file = match session.exported(&layer.source) {
            Some(file) => file.to_path_buf(),
            None => {
                let file = self.export_layer(
                    session,
                    layer,
                    fields,
                    ExportOptions::new(ExportFormat::GeoTiff),
                )?;
                session.record_export(layer.source.clone(), file.clone());
                file
            },
        };

        let name = layer.name();
        self.ensure_workspace_exists().await?;
        let url = self.workspace_endpoint(format!("coveragestores/{name}/file.geotiff"));
        self.client()
            .request(Method::PUT, &url, RequestBody::Bytes {
                data: read_file(&file)?,
                content_type: CONTENT_TYPE_GEOTIFF,
            })
            .await?;
        info!(
            "Successfully created coverage from TIFF file '{}'",
            file.display()
        );

        self.set_layer_style(&name).await?;
        Ok(PublishOutcome::Published { name })
    }
}
