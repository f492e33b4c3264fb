//! Connection settings.

use serde::{Deserialize, Serialize};

use crate::store::MongoDbStoreBuilder;

/// Where to connect: a connection string and the database holding the
/// collections.
///
/// # Example
///
/// ```ignore
/// let config: MongoDbConfig = serde_json::from_str(
///     r#"{ "uri": "mongodb://localhost:27017", "database": "shop" }"#,
/// )?;
/// let store = config.builder().build().await?;
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MongoDbConfig {
    /// A `mongodb://` or `mongodb+srv://` connection string.
    pub uri: String,
    /// The database name.
    pub database: String,
}

impl MongoDbConfig {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
        }
    }

    /// A store builder for these settings.
    pub fn builder(&self) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(&self.uri, &self.database)
    }
}

impl From<MongoDbConfig> for MongoDbStoreBuilder {
    fn from(config: MongoDbConfig) -> Self {
        config.builder()
    }
}
