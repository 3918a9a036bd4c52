//! Publishing through the GeoServer Importer extension.
//!
//! The Importer loads an uploaded Shapefile archive into a PostGIS datastore.
//! Imports run asynchronously on the server, so the interaction has two
//! phases: [ImporterClient::submit] creates and starts an import, and
//! [ImporterClient::await_completion] polls its task until it has finished.

use std::path::Path;
use std::time::Duration;

use geoserver_client::types::{
    FeatureTypeEnvelope,
    ImportCreate,
    ImportCreateEnvelope,
    ImportEnvelope,
    NamedLink,
    TargetStore,
    TaskEnvelope,
    WorkspaceEnvelopeRef,
};
use geoserver_client::{GeoserverClient, GeoserverClientError, Method, RequestBody};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use super::geoserver::GeoserverServer;
use super::publish::{PublishError, PublishOutcome, SkipReason, read_file};
use super::session::{PublishSession, UploadedDataset};
use crate::models::layer::Layer;
use crate::models::workspace::WorkspaceName;

/// Task states in which the Importer has not finished yet.
const IN_PROGRESS_STATES: [&str; 4] = ["PENDING", "READY", "RUNNING", "INIT"];

/// How often and how long to wait for an import to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of times the task is checked, at least one.
    pub max_attempts: u32,
    /// Delay before the second check, doubled after every further check.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Check exactly once, without waiting.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// The delay before the check following `attempt` (counting from 1).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Identifies a submitted import and its single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportHandle {
    pub import_id: i64,
    pub task_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The import created the layer `layer`, which may have been renamed
    /// to avoid a name collision.
    Complete { layer: String },
    /// The Importer reported an error.
    Failed(String),
    /// The task was still running after the last attempt.
    Pending { state: Option<String> },
}

/// The job and task resources of the Importer extension.
#[derive(Debug, Clone, Copy)]
pub struct ImporterClient<'a> {
    client: &'a GeoserverClient,
}

impl<'a> ImporterClient<'a> {
    pub fn new(client: &'a GeoserverClient) -> Self {
        Self { client }
    }

    /// Create an import of `archive` into `datastore` and start it.
    pub async fn submit(
        &self,
        workspace: &WorkspaceName,
        datastore: &str,
        archive: &Path,
    ) -> Result<ImportHandle, PublishError> {
        let body = ImportCreateEnvelope {
            import: ImportCreate {
                target_store: TargetStore {
                    data_store: NamedLink::name(datastore),
                },
                target_workspace: WorkspaceEnvelopeRef {
                    workspace: NamedLink::name(workspace.as_str()),
                },
            },
        };
        let import_id = self
            .client
            .post_json(&self.client.endpoint("imports.json"), &body)
            .await?
            .json::<ImportEnvelope>()?
            .import
            .id;

        info!("Uploading layer data...");
        let file_name = archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "layer.zip".to_string());
        let url = self
            .client
            .endpoint(format!("imports/{import_id}/tasks/{file_name}"));
        let task_id = self
            .client
            .request(Method::PUT, &url, RequestBody::File {
                file_name,
                data: read_file(archive)?,
            })
            .await?
            .json::<TaskEnvelope>()?
            .task
            .map(|task| task.id)
            .ok_or(PublishError::MissingImportTask(import_id))?;

        // GeoServer sometimes picks a different target store for the task
        let url = self
            .client
            .endpoint(format!("imports/{import_id}/tasks/{task_id}/target.json"));
        self.client
            .put_json(&url, &json!({"dataStore": {"name": datastore}}))
            .await?;

        self.client
            .post_empty(&self.client.endpoint(format!("imports/{import_id}")))
            .await?;
        debug!(import_id, task_id, "started import");

        Ok(ImportHandle { import_id, task_id })
    }

    /// Poll the task of `handle` until it has left the in-progress states
    /// or the attempts of `policy` are used up.
    pub async fn await_completion(
        &self,
        handle: ImportHandle,
        policy: &RetryPolicy,
    ) -> Result<ImportOutcome, GeoserverClientError> {
        let url = self.client.endpoint(format!(
            "imports/{}/tasks/{}",
            handle.import_id, handle.task_id
        ));

        let attempts = policy.max_attempts.max(1);
        let mut state = None;
        for attempt in 1..=attempts {
            let task = self
                .client
                .get_json::<TaskEnvelope>(&url)
                .await?
                .task
                .unwrap_or_default();

            if let Some(message) = task.error_message.filter(|message| !message.is_empty()) {
                return Ok(ImportOutcome::Failed(format!(
                    "GeoServer Importer Extension error:\n{message}"
                )));
            }

            let in_progress = task
                .state
                .as_deref()
                .is_some_and(|state| IN_PROGRESS_STATES.contains(&state));
            if !in_progress {
                return Ok(match task.layer {
                    Some(layer) => ImportOutcome::Complete { layer: layer.name },
                    None => ImportOutcome::Failed(format!(
                        "GeoServer Importer finished in state {} without creating a layer",
                        task.state.as_deref().unwrap_or("UNKNOWN")
                    )),
                });
            }

            debug!(attempt, state = ?task.state, "import still in progress");
            state = task.state;
            if attempt < attempts {
                tokio::time::sleep(policy.delay(attempt)).await;
            }
        }

        Ok(ImportOutcome::Pending { state })
    }
}

impl GeoserverServer {
    /// Import a zipped Shapefile into a PostGIS datastore and publish the
    /// created feature type under the layer's name.
    ///
    /// The Importer may rename the table it creates, that name is kept as
    /// the native name so the feature type keeps pointing at the table.
    /// Import failures are logged and skip the layer.
    #[instrument(skip_all, fields(progress = format!("Importing layer '{}'", layer.title)))]
    pub(crate) async fn publish_vector_layer_from_file_to_postgis(
        &self,
        session: &mut PublishSession,
        layer: &Layer,
        archive: &Path,
        datastore_template: Option<&str>,
        policy: &RetryPolicy,
    ) -> Result<PublishOutcome, PublishError> {
        info!("Publishing layer from file '{}'", archive.display());
        let datastore = self.create_postgis_datastore(datastore_template).await?;
        let title = &layer.title;
        let name = layer.name();
        let source_name = archive
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let importer = ImporterClient::new(self.client());
        let handle = importer
            .submit(self.workspace(), &datastore, archive)
            .await?;
        info!("Started Importer task for layer '{name}'");

        let imported_name = match importer.await_completion(handle, policy).await? {
            ImportOutcome::Complete { layer } => layer,
            ImportOutcome::Failed(message) => {
                error!("Failed to publish layer '{title}' as '{name}'.\n\n{message}");
                return Ok(PublishOutcome::Skipped(SkipReason::ImportFailed(message)));
            },
            ImportOutcome::Pending { state } => {
                error!(
                    state = state.as_deref().unwrap_or("UNKNOWN"),
                    "Import of layer '{title}' as '{name}' did not finish in time"
                );
                return Ok(PublishOutcome::Skipped(SkipReason::ImportPending));
            },
        };

        session.record_upload(archive.to_path_buf(), UploadedDataset {
            datastore: datastore.clone(),
            table: source_name.clone(),
        });

        info!("Checking if feature type creation was successful...");
        let url = self.workspace_endpoint(format!(
            "datastores/{datastore}/featuretypes/{imported_name}.json"
        ));
        let mut envelope: FeatureTypeEnvelope = match self
            .client()
            .get_json(&format!("{url}?quietOnNotFound=true"))
            .await
        {
            Ok(envelope) => envelope,
            Err(err) => {
                // the Importer may have left a global style behind
                if let Err(cleanup) = self.fix_layer_style(&imported_name, &name).await {
                    warn!("Failed to perform global style cleanup: {cleanup}");
                }
                if err.is_not_found() {
                    error!(
                        "Failed to publish layer '{title}' as '{name}' due to an unknown error. \
                         Please check the GeoServer logs."
                    );
                    return Ok(PublishOutcome::Skipped(SkipReason::FeatureTypeMissing));
                }
                return Err(err.into());
            },
        };

        info!("Fixing feature type properties...");
        let feature_type = &mut envelope.feature_type;
        feature_type.native_name = Some(imported_name.clone());
        feature_type.original_name = Some(source_name);
        feature_type.title = Some(title.clone());
        self.client().put_json(&url, &envelope).await?;
        info!(
            "Successfully created feature type from file '{}'",
            archive.display()
        );

        info!("Performing style cleanup...");
        if let Err(err) = self.fix_layer_style(&imported_name, &name).await {
            warn!("Failed to fix layer style: {err}");
        }

        Ok(PublishOutcome::Published { name })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::providers::export::ExportFormat;
    use crate::providers::storage::{GeoserverPostgisStorage, Storage};
    use crate::providers::test_helpers::{MockExporter, server_with_exporter, vector_layer};

    fn importer_storage() -> Storage {
        Storage::PostgisByGeoserver(GeoserverPostgisStorage {
            datastore_template: Some("data:pg".to_string()),
            retry_policy: RetryPolicy::once(),
        })
    }

    /// Mocks an existing PostGIS datastore `pg` in the project workspace and
    /// the creation of import 7 with task 3.
    fn mock_import_submission(server: &MockServer) {
        let datastore_url = server.url("/geoserver/rest/workspaces/project/datastores/pg.json");
        server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/project/datastores.json");
            then.status(200).json_body(json!({"dataStores": {"dataStore": [
                {"name": "pg", "href": datastore_url}
            ]}}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/project/datastores/pg.json");
            then.status(200).json_body(json!({"dataStore": {
                "name": "pg",
                "enabled": true,
                "connectionParameters": {"entry": [{"@key": "dbtype", "$": "postgis"}]}
            }}));
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/geoserver/rest/imports.json")
                .json_body(json!({"import": {
                    "targetStore": {"dataStore": {"name": "pg"}},
                    "targetWorkspace": {"workspace": {"name": "project"}}
                }}));
            then.status(201).json_body(json!({"import": {"id": 7, "state": "PENDING"}}));
        });
        server.mock(|when, then| {
            when.method(PUT)
                .path("/geoserver/rest/imports/7/tasks/roads.zip");
            then.status(201).json_body(json!({"task": {"id": 3, "state": "READY"}}));
        });
        server.mock(|when, then| {
            when.method(PUT)
                .path("/geoserver/rest/imports/7/tasks/3/target.json")
                .json_body(json!({"dataStore": {"name": "pg"}}));
            then.status(200);
        });
        server.mock(|when, then| {
            when.method(POST).path("/geoserver/rest/imports/7");
            then.status(204);
        });
    }

    fn mock_task(server: &MockServer, task: serde_json::Value) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(GET).path("/geoserver/rest/imports/7/tasks/3");
            then.status(200).json_body(json!({ "task": task }));
        })
    }

    #[test]
    fn delays_grow_exponentially_up_to_maximum() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        let delays = (1..=5).map(|attempt| policy.delay(attempt)).collect::<Vec<_>>();
        assert_eq!(delays, vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(500),
            Duration::from_millis(500),
        ]);
    }

    #[tokio::test]
    async fn imported_feature_type_keeps_native_name() {
        let mock_server = MockServer::start_async().await;
        mock_import_submission(&mock_server);
        mock_task(
            &mock_server,
            json!({"id": 3, "state": "COMPLETE", "layer": {"name": "roads1"}}),
        );
        mock_server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/project/datastores/pg/featuretypes/roads1.json")
                .query_param("quietOnNotFound", "true");
            then.status(200)
                .json_body(json!({"featureType": {"name": "roads1", "nativeName": "roads1"}}));
        });
        let feature_type = mock_server.mock(|when, then| {
            when.method(PUT)
                .path("/geoserver/rest/workspaces/project/datastores/pg/featuretypes/roads1.json")
                .json_body(json!({"featureType": {
                    "name": "roads1",
                    "nativeName": "roads1",
                    "originalName": "roads",
                    "title": "Roads"
                }}));
            then.status(200);
        });
        let global_style = mock_server.url("/geoserver/rest/styles/roads1.json");
        mock_server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/project/layers/roads1.json");
            then.status(200).json_body(json!({"layer": {
                "name": "roads1",
                "defaultStyle": {"name": "roads1", "href": global_style}
            }}));
        });
        let layer_style = mock_server.mock(|when, then| {
            when.method(PUT)
                .path("/geoserver/rest/workspaces/project/layers/roads1.json")
                .json_body(json!({"layer": {
                    "name": "roads",
                    "defaultStyle": {"name": "project:roads"}
                }}));
            then.status(200);
        });
        let remove_global_style = mock_server.mock(|when, then| {
            when.method(DELETE)
                .path("/geoserver/rest/styles/roads1.json")
                .query_param("purge", "true");
            then.status(200);
        });

        let exporter = MockExporter::default();
        let server = server_with_exporter(&mock_server, importer_storage(), exporter.clone());
        let mut session = PublishSession::new().unwrap();
        let outcome = server
            .publish_layer(&mut session, &vector_layer("Roads", "/data/roads.gpkg"), None)
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Published {
            name: "roads".to_string()
        });
        assert_eq!(exporter.exported_formats(), vec![ExportFormat::Shapefile]);
        feature_type.assert();
        layer_style.assert();
        remove_global_style.assert();
    }

    #[tokio::test]
    async fn importer_errors_skip_the_layer() {
        let mock_server = MockServer::start_async().await;
        mock_import_submission(&mock_server);
        mock_task(
            &mock_server,
            json!({"id": 3, "state": "ERROR", "errorMessage": "No CRS for layer"}),
        );
        let feature_type = mock_server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/project/datastores/pg/featuretypes/roads.json");
            then.status(200);
        });

        let server = server_with_exporter(&mock_server, importer_storage(), MockExporter::default());
        let mut session = PublishSession::new().unwrap();
        let outcome = server
            .publish_layer(&mut session, &vector_layer("Roads", "/data/roads.gpkg"), None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PublishOutcome::Skipped(SkipReason::ImportFailed(
                "GeoServer Importer Extension error:\nNo CRS for layer".to_string()
            ))
        );
        feature_type.assert_hits(0);
    }

    #[tokio::test]
    async fn silently_failed_import_cleans_up_and_skips() {
        let mock_server = MockServer::start_async().await;
        mock_import_submission(&mock_server);
        mock_task(
            &mock_server,
            json!({"id": 3, "state": "COMPLETE", "layer": {"name": "roads"}}),
        );
        mock_server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/project/datastores/pg/featuretypes/roads.json");
            then.status(404);
        });
        let layer_lookup = mock_server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/project/layers/roads.json");
            then.status(404);
        });

        let server = server_with_exporter(&mock_server, importer_storage(), MockExporter::default());
        let mut session = PublishSession::new().unwrap();
        let outcome = server
            .publish_layer(&mut session, &vector_layer("Roads", "/data/roads.gpkg"), None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PublishOutcome::Skipped(SkipReason::FeatureTypeMissing)
        );
        // looked up by imported name and by intended name
        layer_lookup.assert_hits(2);
    }

    #[tokio::test]
    async fn unexpected_feature_type_errors_are_raised() {
        let mock_server = MockServer::start_async().await;
        mock_import_submission(&mock_server);
        mock_task(
            &mock_server,
            json!({"id": 3, "state": "COMPLETE", "layer": {"name": "roads"}}),
        );
        mock_server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/project/datastores/pg/featuretypes/roads.json");
            then.status(500);
        });
        mock_server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/project/layers/roads.json");
            then.status(404);
        });

        let server = server_with_exporter(&mock_server, importer_storage(), MockExporter::default());
        let mut session = PublishSession::new().unwrap();
        let err = server
            .publish_layer(&mut session, &vector_layer("Roads", "/data/roads.gpkg"), None)
            .await
            .unwrap_err();
        assert_eq!(
            match err {
                PublishError::Client(err) => err.status(),
                _ => None,
            },
            Some(geoserver_client::StatusCode::INTERNAL_SERVER_ERROR)
        );
    }

    #[tokio::test]
    async fn running_import_is_polled_until_attempts_are_used() {
        let mock_server = MockServer::start_async().await;
        let task = mock_task(&mock_server, json!({"id": 3, "state": "RUNNING"}));

        let server = server_with_exporter(&mock_server, Storage::FileBased, MockExporter::default());
        let importer = ImporterClient::new(server.client());
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let outcome = importer
            .await_completion(
                ImportHandle {
                    import_id: 7,
                    task_id: 3,
                },
                &policy,
            )
            .await
            .unwrap();

        assert_eq!(outcome, ImportOutcome::Pending {
            state: Some("RUNNING".to_string())
        });
        task.assert_hits(3);
    }
}
