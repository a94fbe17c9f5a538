use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A field holds a value outside of its accepted range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// A BigQuery project id is empty.
    #[error("`bigquery.project_id` cannot be empty")]
    EmptyProjectId,
    /// Both an inline key and a key path were provided.
    #[error("`bigquery.service_account_key` and `bigquery.service_account_key_path` are mutually exclusive")]
    ConflictingServiceAccountKeys,
}
