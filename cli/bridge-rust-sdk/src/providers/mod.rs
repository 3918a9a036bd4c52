pub mod datastores;
pub mod export;
pub mod geoserver;
pub mod groups;
pub mod importer;
pub mod postgis;
pub mod publish;
pub mod session;
pub mod storage;
pub mod style;
pub mod validation;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_helpers;
