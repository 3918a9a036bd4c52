pub mod models;
pub mod providers;
pub mod utils;

pub use geoserver_client;
