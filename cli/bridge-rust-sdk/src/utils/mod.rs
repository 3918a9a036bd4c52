pub mod archive;
pub mod gpkg;
