//! Storage strategies for vector layer data.
//!
//! A server publishes vector data in one of three ways:
//! - [FileBasedStorage]: the layer is exported to a GeoPackage that is
//!   uploaded into a datastore of its own.
//! - [BridgePostgisStorage]: Bridge copies the layer into a PostGIS database
//!   and registers the table with GeoServer.
//! - [GeoserverPostgisStorage]: the layer is exported to a Shapefile that
//!   the GeoServer Importer extension loads into a PostGIS datastore.

use std::path::Path;

use geoserver_client::types::{
    BoundingBox,
    ConnectionParameters,
    DataStore,
    DataStoreEnvelope,
    FeatureType,
    FeatureTypeEnvelope,
};
use geoserver_client::{CONTENT_TYPE_OCTET_STREAM, Method, RequestBody};
use serde_json::Map;
use tracing::{error, info};

use super::export::{ExportFormat, ExportOptions};
use super::geoserver::GeoserverServer;
use super::importer::RetryPolicy;
use super::postgis::PostgisRegistry;
use super::publish::{PublishError, PublishOutcome, SkipReason, read_file};
use super::session::{PublishSession, UploadedDataset};
use crate::models::layer::{EXTENT_DECIMALS, Layer};
use crate::models::postgis::PostgisConnection;
use crate::models::server::{ServerSettings, StorageKind};
use crate::utils::{archive, gpkg};

/// Publishes the data of vector layers.
#[allow(async_fn_in_trait)]
pub trait StoragePublisher {
    async fn publish_vector(
        &self,
        server: &GeoserverServer,
        session: &mut PublishSession,
        layer: &Layer,
        fields: Option<&[String]>,
    ) -> Result<PublishOutcome, PublishError>;
}

#[derive(Debug, Clone, Default)]
pub enum Storage {
    #[default]
    FileBased,
    PostgisByBridge(BridgePostgisStorage),
    PostgisByGeoserver(GeoserverPostgisStorage),
}

impl Storage {
    /// The storage configured for `settings`.
    ///
    /// `databases` are the PostGIS databases Bridge knows, `retry_policy`
    /// controls how long Importer jobs are waited for.
    pub fn from_settings(
        settings: &ServerSettings,
        databases: PostgisRegistry,
        retry_policy: RetryPolicy,
    ) -> Self {
        match settings.storage {
            StorageKind::FileBased => Storage::FileBased,
            StorageKind::PostgisBridge => Storage::PostgisByBridge(BridgePostgisStorage {
                database_id: settings.postgis_db.clone(),
                databases,
            }),
            StorageKind::PostgisGeoserver => {
                Storage::PostgisByGeoserver(GeoserverPostgisStorage {
                    datastore_template: settings.postgis_db.clone(),
                    retry_policy,
                })
            },
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            Storage::FileBased => StorageKind::FileBased,
            Storage::PostgisByBridge(_) => StorageKind::PostgisBridge,
            Storage::PostgisByGeoserver(_) => StorageKind::PostgisGeoserver,
        }
    }
}

impl StoragePublisher for Storage {
    async fn publish_vector(
        &self,
        server: &GeoserverServer,
        session: &mut PublishSession,
        layer: &Layer,
        fields: Option<&[String]>,
    ) -> Result<PublishOutcome, PublishError> {
        match self {
            Storage::FileBased => {
                FileBasedStorage
                    .publish_vector(server, session, layer, fields)
                    .await
            },
            Storage::PostgisByBridge(storage) => {
                storage.publish_vector(server, session, layer, fields).await
            },
            Storage::PostgisByGeoserver(storage) => {
                storage.publish_vector(server, session, layer, fields).await
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileBasedStorage;

impl StoragePublisher for FileBasedStorage {
    async fn publish_vector(
        &self,
        server: &GeoserverServer,
        session: &mut PublishSession,
        layer: &Layer,
        fields: Option<&[String]>,
    ) -> Result<PublishOutcome, PublishError> {
        let file = match session.exported(&layer.source) {
            Some(file) => file.to_path_buf(),
            None => {
                let file = server.export_layer(
                    session,
                    layer,
                    fields,
                    ExportOptions::new(ExportFormat::GeoPackage),
                )?;
                session.record_export(layer.source.clone(), file.clone());
                file
            },
        };
        server
            .publish_vector_layer_from_file(session, layer, &file)
            .await
    }
}

#[derive(Debug, Clone, Default)]
pub struct BridgePostgisStorage {
    /// Id of the database in `databases` layers are copied into.
    pub database_id: Option<String>,
    pub databases: PostgisRegistry,
}

impl StoragePublisher for BridgePostgisStorage {
    async fn publish_vector(
        &self,
        server: &GeoserverServer,
        _session: &mut PublishSession,
        layer: &Layer,
        fields: Option<&[String]>,
    ) -> Result<PublishOutcome, PublishError> {
        let database_id = self.database_id.clone().unwrap_or_default();
        let Some(database) = self.databases.get(&database_id) else {
            error!(
                "Cannot find the selected PostGIS database '{database_id}' to publish layer '{}'",
                layer.title
            );
            return Ok(PublishOutcome::Skipped(SkipReason::MissingDatabase(
                database_id,
            )));
        };

        database
            .import_layer(layer, fields)
            .map_err(|source| PublishError::Export {
                layer: layer.title.clone(),
                source,
            })?;
        server
            .publish_vector_layer_from_postgis(layer, database.connection())
            .await
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeoserverPostgisStorage {
    /// `workspace:datastore` of the datastore copied into new workspaces.
    pub datastore_template: Option<String>,
    pub retry_policy: RetryPolicy,
}

impl StoragePublisher for GeoserverPostgisStorage {
    async fn publish_vector(
        &self,
        server: &GeoserverServer,
        session: &mut PublishSession,
        layer: &Layer,
        fields: Option<&[String]>,
    ) -> Result<PublishOutcome, PublishError> {
        let archive = match session.exported(&layer.source) {
            Some(archive) => archive.to_path_buf(),
            None => {
                let shapefile = server.export_layer(
                    session,
                    layer,
                    fields,
                    ExportOptions::forced(ExportFormat::Shapefile),
                )?;
                let archive = archive::zip_shapefile(&shapefile)?;
                session.record_export(layer.source.clone(), archive.clone());
                archive
            },
        };
        server
            .publish_vector_layer_from_file_to_postgis(
                session,
                layer,
                &archive,
                self.datastore_template.as_deref(),
                &self.retry_policy,
            )
            .await
    }
}

impl GeoserverServer {
    /// Upload a GeoPackage as datastore named after the layer and publish
    /// the feature table of the layer.
    ///
    /// If `file` is the layer source itself, its `layername` option selects
    /// the table, otherwise the first feature table is used.
    /// A GeoPackage that was uploaded before in this session is not uploaded
    /// again, a new feature type is added to its datastore instead.
    pub(crate) async fn publish_vector_layer_from_file(
        &self,
        session: &mut PublishSession,
        layer: &Layer,
        file: &Path,
    ) -> Result<PublishOutcome, PublishError> {
        info!("Publishing layer from file: {}", file.display());
        let name = layer.name();

        let tables = gpkg::feature_tables(file).map_err(|source| PublishError::GeoPackage {
            path: file.to_path_buf(),
            source,
        })?;
        let requested = if file == Path::new(layer.source_path()) {
            layer.source_table()
        } else {
            None
        };
        let table = match requested {
            Some(requested) => tables
                .iter()
                .find(|table| table.as_str() == requested)
                .ok_or_else(|| PublishError::MissingFeatureTable {
                    path: file.to_path_buf(),
                    table: requested.to_string(),
                })?,
            None => tables
                .first()
                .ok_or_else(|| PublishError::EmptyGeoPackage(file.to_path_buf()))?,
        }
        .clone();

        // GeoServer configures a feature type for the first table of an
        // upload and does not tell its name
        let configure_on_upload = tables.first() == Some(&table);
        let (datastore, rename_configured) = match session.uploaded(file) {
            Some(dataset) => (dataset.datastore.clone(), false),
            None => {
                let data = read_file(file)?;
                self.delete_datastore(&name).await?;
                let configure = if configure_on_upload { "" } else { "&configure=none" };
                let url = self.workspace_endpoint(format!(
                    "datastores/{name}/file.gpkg?update=overwrite{configure}"
                ));
                self.client()
                    .request(Method::PUT, &url, RequestBody::Bytes {
                        data,
                        content_type: CONTENT_TYPE_OCTET_STREAM,
                    })
                    .await?;
                session.record_upload(file.to_path_buf(), UploadedDataset {
                    datastore: name.clone(),
                    table: table.clone(),
                });
                (name.clone(), configure_on_upload)
            },
        };

        let configured_url =
            self.workspace_endpoint(format!("datastores/{datastore}/featuretypes/{table}.json"));
        let mut envelope = if rename_configured {
            self.client()
                .get_json::<FeatureTypeEnvelope>(&configured_url)
                .await?
        } else {
            FeatureTypeEnvelope {
                feature_type: FeatureType {
                    name: name.clone(),
                    native_name: Some(table.clone()),
                    srs: Some(layer.crs.clone()),
                    ..Default::default()
                },
            }
        };
        let feature_type = &mut envelope.feature_type;
        feature_type.name = name.clone();
        feature_type.title = Some(layer.title.clone());
        if let Some(vector) = layer.as_vector() {
            let extent = vector.extent.rounded(EXTENT_DECIMALS);
            feature_type.native_bounding_box = Some(BoundingBox {
                minx: extent.xmin,
                maxx: extent.xmax,
                miny: extent.ymin,
                maxy: extent.ymax,
                srs: Some(layer.crs.clone()),
                extra: Map::new(),
            });
        }

        if rename_configured {
            self.client().put_json(&configured_url, &envelope).await?;
        } else {
            let url = self.workspace_endpoint(format!("datastores/{datastore}/featuretypes"));
            self.client().post_json(&url, &envelope).await?;
        }
        info!(
            "Successfully created feature type from GeoPackage file '{}'",
            file.display()
        );

        self.set_layer_style(&name).await?;
        Ok(PublishOutcome::Published { name })
    }

    /// Register a PostGIS table as datastore and feature type named after
    /// the layer.
    pub(crate) async fn publish_vector_layer_from_postgis(
        &self,
        layer: &Layer,
        connection: &PostgisConnection,
    ) -> Result<PublishOutcome, PublishError> {
        let name = layer.name();
        let (username, password) = connection.credentials();
        let parameters: ConnectionParameters = [
            ("schema", connection.schema.clone()),
            ("port", connection.port.to_string()),
            ("database", connection.database.clone()),
            ("passwd", password.to_string()),
            ("user", username.to_string()),
            ("host", connection.host.clone()),
            ("dbtype", "postgis".to_string()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        let datastore = DataStoreEnvelope {
            data_store: DataStore {
                name: name.clone(),
                store_type: Some("PostGIS".to_string()),
                enabled: Some(true),
                connection_parameters: Some(parameters),
                ..Default::default()
            },
        };
        self.client()
            .post_json(&self.workspace_endpoint("datastores"), &datastore)
            .await?;

        let feature_type = FeatureTypeEnvelope {
            feature_type: FeatureType {
                name: name.clone(),
                srs: Some(layer.crs.clone()),
                ..Default::default()
            },
        };
        self.client()
            .post_json(
                &self.workspace_endpoint(format!("datastores/{name}/featuretypes")),
                &feature_type,
            )
            .await?;
        info!("Successfully created feature type '{name}' from PostGIS table");

        self.set_layer_style(&name).await?;
        Ok(PublishOutcome::Published { name })
    }
}
