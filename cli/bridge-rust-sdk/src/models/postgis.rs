use serde::{Deserialize, Serialize};

/// Connection details of a PostGIS database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgisConnection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "public".to_string()
}

impl PostgisConnection {
    pub fn credentials(&self) -> (&str, &str) {
        (&self.username, &self.password)
    }
}
