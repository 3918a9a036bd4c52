use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use super::export::ExportError;
use crate::models::layer::Layer;
use crate::models::postgis::PostgisConnection;

/// A PostGIS database Bridge can copy layers into.
pub trait PostgisDatabase: Debug + Send + Sync {
    fn connection(&self) -> &PostgisConnection;

    /// Copy the features of `layer` into a table named after the layer.
    fn import_layer(&self, layer: &Layer, fields: Option<&[String]>) -> Result<(), ExportError>;
}

/// Known PostGIS databases by their configured id.
pub type PostgisRegistry = BTreeMap<String, Arc<dyn PostgisDatabase>>;
