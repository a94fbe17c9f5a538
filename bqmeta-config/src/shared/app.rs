use serde::Deserialize;

use crate::shared::{BigQueryConfig, MetadataCacheConfig, ValidationError};

/// Top-level configuration of the metadata browser.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub bigquery: BigQueryConfig,
    #[serde(default)]
    pub metadata_cache: MetadataCacheConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.bigquery.validate()?;
        self.metadata_cache.validate()
    }
}
