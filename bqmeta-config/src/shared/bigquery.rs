use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::shared::ValidationError;

/// Connection settings for the BigQuery project whose metadata is browsed.
///
/// Catalogs map to projects and schemas to datasets. The primary project is the
/// account the cache is keyed by; additional projects are listed as extra catalogs.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BigQueryConfig {
    /// Primary project id.
    pub project_id: String,
    /// Other projects exposed as catalogs next to the primary one.
    #[serde(default)]
    pub additional_projects: Vec<String>,
    /// Path to a service account key file.
    #[serde(default)]
    pub service_account_key_path: Option<String>,
    /// Inline service account key JSON.
    #[serde(default)]
    pub service_account_key: Option<SecretString>,
    /// Page size requested from the listing endpoints.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl BigQueryConfig {
    pub const DEFAULT_PAGE_SIZE: u32 = 1000;

    /// Returns the primary project followed by the additional projects, without duplicates.
    pub fn catalogs(&self) -> Vec<String> {
        let mut catalogs = vec![self.project_id.clone()];
        for project in &self.additional_projects {
            if !catalogs.contains(project) {
                catalogs.push(project.clone());
            }
        }

        catalogs
    }

    /// Returns the inline key contents, if configured.
    pub fn inline_key(&self) -> Option<&str> {
        self.service_account_key
            .as_ref()
            .map(|key| key.expose_secret().as_str())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.project_id.trim().is_empty() {
            return Err(ValidationError::EmptyProjectId);
        }

        if self.service_account_key.is_some() && self.service_account_key_path.is_some() {
            return Err(ValidationError::ConflictingServiceAccountKeys);
        }

        if self.page_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "bigquery.page_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_page_size() -> u32 {
    BigQueryConfig::DEFAULT_PAGE_SIZE
}
