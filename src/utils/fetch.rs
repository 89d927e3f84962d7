use std::time::Duration;
use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use rustc_hash::FxHashMap;
use crate::errors::FetchError;
use crate::parsers::table::{Table, TableFormat};
use crate::utils::config::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};

/// Anything that can hand out named tables.
pub trait TableSource: Sync {
    fn fetch_table(&self, resource: &str) -> Result<Table, FetchError>;
}

/// Resolves resource names against a fixed base location over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteTableFetcher {
    client: Client,
    base_url: String,
}

impl RemoteTableFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(RemoteTableFetcher::from_client(client, base_url))
    }

    pub fn from_client(client: Client, base_url: &str) -> Self {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        Self { client, base_url }
    }

    pub fn with_defaults() -> Result<Self, reqwest::Error> {
        RemoteTableFetcher::new(DEFAULT_BASE_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Direct URLs pass through; names are appended to the base location.
    pub fn resolve(&self, resource: &str) -> String {
        if resource.starts_with("http://") || resource.starts_with("https://") {
            resource.to_string()
        } else {
            format!("{}{}", self.base_url, resource.trim_start_matches('/').replace(' ', "%20"))
        }
    }
}

impl TableSource for RemoteTableFetcher {
    fn fetch_table(&self, resource: &str) -> Result<Table, FetchError> {
        let url = self.resolve(resource);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| FetchError::TransportError { url: url.clone(), source })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::ResourceNotFound { url, status: status.as_u16() });
        }

        let body = response
            .bytes()
            .map_err(|source| FetchError::TransportError { url: url.clone(), source })?;

        let table = Table::decode(&body, TableFormat::from_resource(&url))
            .map_err(|message| FetchError::DecodeError { url: url.clone(), message })?;

        info!("Fetched {} ({} rows)", resource, table.len());
        Ok(table)
    }
}

/// Tables held in memory, keyed by resource name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTables {
    tables: FxHashMap<String, Table>,
}

impl InMemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: impl Into<String>, table: Table) {
        self.tables.insert(resource.into(), table);
    }
}

impl TableSource for InMemoryTables {
    fn fetch_table(&self, resource: &str) -> Result<Table, FetchError> {
        self.tables
            .get(resource)
            .cloned()
            .ok_or_else(|| FetchError::ResourceNotFound { url: resource.to_string(), status: 404 })
    }
}
