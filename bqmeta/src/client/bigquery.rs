use bqmeta_config::shared::BigQueryConfig;
use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use gcp_bigquery_client::{Client, dataset, table};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::MetadataClient;
use crate::error::{ErrorKind, MetadataResult};
use crate::metadata_error;
use crate::types::{ColumnDescriptor, Nullability, SchemaDescriptor, TableDescriptor, TableType};

/// Lists BigQuery projects, datasets, tables and columns through the REST API.
///
/// Catalogs are the configured projects and are never fetched remotely. Datasets and tables
/// are paged through with the configured page size; columns come from the table resource.
#[derive(Clone)]
pub struct BigQueryMetadataClient {
    client: Arc<Client>,
    catalogs: Vec<String>,
    page_size: u32,
}

impl fmt::Debug for BigQueryMetadataClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryMetadataClient")
            .field("catalogs", &self.catalogs)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl BigQueryMetadataClient {
    /// Authenticates with the credentials named in `config`.
    ///
    /// An inline key takes precedence over a key file; without either, Application Default
    /// Credentials are used.
    pub async fn new(config: &BigQueryConfig) -> MetadataResult<Self> {
        config.validate()?;

        let client = if let Some(key) = config.inline_key() {
            debug!("authenticating with inline service account key");
            let key = parse_service_account_key(key).map_err(BQError::from)?;
            ClientBuilder::new()
                .build_from_service_account_key(key, false)
                .await?
        } else if let Some(path) = &config.service_account_key_path {
            debug!(%path, "authenticating with service account key file");
            ClientBuilder::new()
                .build_from_service_account_key_file(path)
                .await?
        } else {
            debug!("authenticating with application default credentials");
            ClientBuilder::new()
                .build_from_application_default_credentials()
                .await?
        };

        info!(project_id = %config.project_id, "created bigquery metadata client");

        Ok(Self::from_client(client, config))
    }

    /// Wraps an already authenticated client.
    pub fn from_client(client: Client, config: &BigQueryConfig) -> Self {
        Self {
            client: Arc::new(client),
            catalogs: config.catalogs(),
            page_size: config.page_size,
        }
    }
}

impl MetadataClient for BigQueryMetadataClient {
    async fn list_catalogs(&self) -> MetadataResult<Vec<String>> {
        Ok(self.catalogs.clone())
    }

    async fn list_schemas(&self, catalog: &str) -> MetadataResult<Vec<SchemaDescriptor>> {
        let mut schemas = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut options = dataset::ListOptions::default().max_results(self.page_size as u64);
            if let Some(token) = page_token.take() {
                options = options.page_token(token);
            }

            let page = self.client.dataset().list(catalog, options).await?;
            schemas.extend(page.datasets.into_iter().map(|dataset| {
                SchemaDescriptor::new(catalog, dataset.dataset_reference.dataset_id)
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(catalog, count = schemas.len(), "listed bigquery datasets");

        Ok(schemas)
    }

    async fn list_tables(&self, catalog: &str, schema: &str) -> MetadataResult<Vec<TableDescriptor>> {
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut options = table::ListOptions::default().max_results(self.page_size as u64);
            if let Some(token) = page_token.take() {
                options = options.page_token(token);
            }

            let page = self.client.table().list(catalog, schema, options).await?;
            tables.extend(page.tables.into_iter().flatten().map(|table| {
                TableDescriptor {
                    catalog: catalog.to_string(),
                    schema: schema.to_string(),
                    name: table.table_reference.table_id,
                    table_type: table
                        .r#type
                        .as_deref()
                        .map(TableType::from_bigquery)
                        .unwrap_or(TableType::Table),
                    remarks: table.friendly_name,
                }
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(catalog, schema, count = tables.len(), "listed bigquery tables");

        Ok(tables)
    }

    async fn list_columns(
        &self,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> MetadataResult<Vec<ColumnDescriptor>> {
        let resource = self
            .client
            .table()
            .get(catalog, schema, table, None)
            .await?;

        let fields = resource.schema.fields.unwrap_or_default();
        let mut columns = Vec::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            columns.push(ColumnDescriptor {
                catalog: catalog.to_string(),
                schema: schema.to_string(),
                table: table.to_string(),
                name: field.name.clone(),
                ordinal_position: index as u32 + 1,
                type_name: column_type_name(field)?,
                nullability: Nullability::from_mode(field.mode.as_deref()),
                remarks: field.description.clone(),
            });
        }

        Ok(columns)
    }
}

/// Returns the standard SQL type name of a field, wrapping repeated fields in `ARRAY<...>`.
fn column_type_name(field: &TableFieldSchema) -> MetadataResult<String> {
    let legacy = match serde_json::to_value(&field.r#type)? {
        serde_json::Value::String(name) => name,
        other => {
            return Err(metadata_error!(
                ErrorKind::InvalidData,
                "Unexpected BigQuery field type",
                format!("field `{}` has type {other}", field.name)
            ));
        }
    };

    let type_name = standard_type_name(&legacy);
    if field.mode.as_deref() == Some("REPEATED") {
        return Ok(format!("ARRAY<{type_name}>"));
    }

    Ok(type_name.to_string())
}

/// Maps legacy SQL type names reported by the API to their standard SQL spelling.
fn standard_type_name(legacy: &str) -> &str {
    match legacy {
        "INTEGER" => "INT64",
        "FLOAT" => "FLOAT64",
        "BOOLEAN" => "BOOL",
        "RECORD" => "STRUCT",
        other => other,
    }
}
