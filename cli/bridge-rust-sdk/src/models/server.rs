use serde::{Deserialize, Serialize};

/// Where the data of published vector layers ends up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// Layers are uploaded as GeoPackage files.
    #[default]
    FileBased,
    /// Bridge copies layers into a PostGIS database it knows the credentials of.
    PostgisBridge,
    /// GeoServer imports layers into one of its PostGIS datastores
    /// using the Importer extension.
    PostgisGeoserver,
}

/// Saved definition of a GeoServer instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub storage: StorageKind,
    /// Id of a database definition ([StorageKind::PostgisBridge]) or a
    /// `workspace:datastore` template reference ([StorageKind::PostgisGeoserver]).
    #[serde(default)]
    pub postgis_db: Option<String>,
    /// Publish layers backed by PostGIS tables from their original database.
    #[serde(default)]
    pub use_original_data_source: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
}
