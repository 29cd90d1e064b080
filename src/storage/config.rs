use serde::{Deserialize, Serialize};

/// Main storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage backend
    pub mode: StoreMode,
    /// MongoDB configuration
    pub mongodb: Option<MongoConfig>,
    /// Reject a second unit with the same message id and direction
    pub enforce_unique_message_ids: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: StoreMode::Memory,
            mongodb: None,
            enforce_unique_message_ids: false,
        }
    }
}

/// Storage backend modes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreMode {
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "mongodb")]
    MongoDb,
}

impl std::str::FromStr for StoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreMode::Memory),
            "mongodb" | "mongo" => Ok(StoreMode::MongoDb),
            other => Err(format!("unknown storage mode: {}", other)),
        }
    }
}

/// MongoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    /// MongoDB connection URI
    pub uri: String,
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "message_units".to_string()
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "as4msh".to_string(),
            collection: default_collection(),
        }
    }
}
