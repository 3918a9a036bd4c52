pub mod group;
pub mod layer;
pub mod postgis;
pub mod server;
pub mod validation;
pub mod workspace;
