/// Persistence of published URLs
///
/// The batch ends with a single upsert of its [`UpdateQuery`]. Where that
/// lands is behind the [`Persistence`] trait: a remote RPC endpoint
/// ([`RpcClient`]) or the local SQLite catalog
/// ([`crate::state::library::Catalog`]).

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::state::data::UpdateQuery;

/// Upsert of a batch's public URLs
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn update(&self, query: &UpdateQuery) -> Result<(), PersistenceError>;
}

/// Connection settings for an RPC-over-REST database endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    /// Project root, e.g. `https://abc.supabase.co`
    pub base_url: String,
    /// Stored procedure receiving the update query
    pub function: String,
    pub api_key: String,
}

/// Calls `POST {base_url}/rest/v1/rpc/{function}` with the query as body
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    config: RpcConfig,
}

impl RpcClient {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/rest/v1/rpc/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.function
        )
    }
}

#[async_trait]
impl Persistence for RpcClient {
    async fn update(&self, query: &UpdateQuery) -> Result<(), PersistenceError> {
        let endpoint = self.endpoint();
        debug!(%endpoint, booth_id = query.booth_id, "Calling update rpc");

        let response = self
            .http
            .post(&endpoint)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .json(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(booth_id = query.booth_id, status = status.as_u16(), "Update rpc accepted");
        Ok(())
    }
}
