use bqmeta_config::shared::MetadataCacheConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

use crate::bail;
use crate::cache::MetadataCacheRegistry;
use crate::client::MetadataClient;
use crate::error::{ErrorKind, MetadataResult};
use crate::facade::MetadataFacade;

/// Opens metadata connections against one account.
///
/// Every connection reads through the store the registry holds for the driver's account and
/// TTL, so connections opened one after another share warm entries.
#[derive(Debug)]
pub struct Driver<C> {
    account_id: String,
    client: Arc<C>,
    config: MetadataCacheConfig,
    registry: Arc<MetadataCacheRegistry>,
    next_connection_id: AtomicU64,
}

impl<C> Driver<C>
where
    C: MetadataClient,
{
    pub fn new(
        account_id: impl Into<String>,
        client: C,
        config: MetadataCacheConfig,
        registry: Arc<MetadataCacheRegistry>,
    ) -> MetadataResult<Self> {
        config.validate()?;

        Ok(Self {
            account_id: account_id.into(),
            client: Arc::new(client),
            config,
            registry,
            next_connection_id: AtomicU64::new(1),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn registry(&self) -> &Arc<MetadataCacheRegistry> {
        &self.registry
    }

    pub fn connect(&self) -> Connection<C> {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let facade = MetadataFacade::new(
            self.client.clone(),
            self.account_id.clone(),
            &self.config,
            &self.registry,
        );

        info!(
            connection_id = id,
            account_id = %self.account_id,
            loading_mode = ?facade.loading_mode(),
            "opened metadata connection"
        );

        Connection {
            id,
            facade,
            closed: AtomicBool::new(false),
        }
    }
}

#[cfg(feature = "bigquery")]
impl Driver<crate::client::bigquery::BigQueryMetadataClient> {
    /// Builds a driver for the configured BigQuery project, sharing the process-wide registry.
    pub async fn from_config(config: &bqmeta_config::shared::AppConfig) -> MetadataResult<Self> {
        config.validate()?;

        let client = crate::client::bigquery::BigQueryMetadataClient::new(&config.bigquery).await?;

        Self::new(
            config.bigquery.project_id.clone(),
            client,
            config.metadata_cache.clone(),
            crate::cache::global_registry(),
        )
    }
}

/// A metadata session. Closing it leaves the shared cache untouched.
#[derive(Debug)]
pub struct Connection<C> {
    id: u64,
    facade: MetadataFacade<C>,
    closed: AtomicBool,
}

impl<C> Connection<C>
where
    C: MetadataClient,
{
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the metadata facade, failing once the connection is closed.
    pub fn metadata(&self) -> MetadataResult<&MetadataFacade<C>> {
        if self.is_closed() {
            bail!(
                ErrorKind::ConnectionClosed,
                "Metadata connection is closed",
                format!("connection {}", self.id)
            );
        }

        Ok(&self.facade)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(connection_id = self.id, "closed metadata connection");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
