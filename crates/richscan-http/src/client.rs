//! HTTP indexer client backed by `reqwest`.
//!
//! Talks to the Blockbook v2 REST surface:
//!
//! | call                | path                          |
//! |---------------------|-------------------------------|
//! | chain height        | `GET api/v2`                  |
//! | block (paged)       | `GET api/v2/block/{h}?page=N` |
//! | single transaction  | `GET api/v2/tx/{txid}`        |
//!
//! Every request goes through the retry loop; the per-request timeout and
//! the retry budget follow whichever `ScannerProfile` was last applied via
//! [`IndexerSource::configure`].

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use richscan_core::{
    BlockPayload, IndexerBlock, IndexerSource, ScanError, ScannerProfile, Transaction,
};

use crate::error::ClientError;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::wire::{BlockResponse, StatusResponse, TxResponse};

/// Configuration for `HttpIndexerClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::for_profile(&ScannerProfile::CONSERVATIVE)
    }
}

impl HttpClientConfig {
    pub fn for_profile(profile: &ScannerProfile) -> Self {
        Self {
            retry: RetryConfig::for_profile(profile),
            request_timeout: Duration::from_millis(profile.timeout_ms),
        }
    }
}

#[derive(Debug, Clone)]
struct RequestPolicy {
    retry: RetryPolicy,
    timeout: Duration,
}

/// Blockbook REST client with retry and profile-driven timeouts.
pub struct HttpIndexerClient {
    base: Url,
    endpoint: String,
    http: reqwest::Client,
    policy: RwLock<RequestPolicy>,
}

impl HttpIndexerClient {
    /// Create a client for `base_url` using the profile's timeout and retry limit.
    pub fn new(base_url: &str, profile: &ScannerProfile) -> Result<Self, ClientError> {
        Self::with_config(base_url, HttpClientConfig::for_profile(profile))
    }

    pub fn with_config(base_url: &str, config: HttpClientConfig) -> Result<Self, ClientError> {
        let endpoint = base_url.trim().to_string();
        let mut base = Url::parse(&endpoint).map_err(|e| ClientError::Url(format!("{endpoint}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("richscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;

        Ok(Self {
            base,
            endpoint,
            http,
            policy: RwLock::new(RequestPolicy {
                retry: RetryPolicy::new(config.retry),
                timeout: config.request_timeout,
            }),
        })
    }

    fn current_policy(&self) -> RequestPolicy {
        self.policy.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url, timeout: Duration) -> Result<T, ClientError> {
        let ms = timeout.as_millis() as u64;
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                ClientError::Timeout { ms }
            } else {
                ClientError::Http(e.to_string())
            }
        };

        let resp = self
            .http
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(transport)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let bytes = resp.bytes().await.map_err(transport)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ClientError::Url(format!("{path}: {e}")))?;
        let policy = self.current_policy();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.get_once(&url, policy.timeout).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => match policy.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            url = %url,
                            "retrying indexer request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, error = %e, url = %url, "indexer retries exhausted");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_block_page(&self, height: u64, page: u32) -> Result<BlockResponse, ScanError> {
        match self.get_json(&format!("api/v2/block/{height}?page={page}")).await {
            Ok(resp) => Ok(resp),
            Err(ClientError::Status { status: 404, .. }) => Err(ScanError::BlockNotFound { height }),
            Err(e) => Err(e.into()),
        }
    }
}

fn decode_txs(txs: Vec<TxResponse>) -> Result<Vec<Transaction>, ScanError> {
    txs.into_iter()
        .map(|tx| Transaction::try_from(tx).map_err(ScanError::from))
        .collect()
}

#[async_trait]
impl IndexerSource for HttpIndexerClient {
    async fn get_height(&self) -> Result<u64, ScanError> {
        let status: StatusResponse = self.get_json("api/v2").await?;
        Ok(status.backend.blocks)
    }

    async fn get_block(&self, height: u64) -> Result<IndexerBlock, ScanError> {
        let first = self.get_block_page(height, 1).await?;
        let total_pages = first.total_pages();
        let hash = first.hash;
        let inline = first.txs.is_some() || first.txids.is_none();

        let mut txs = first.txs.unwrap_or_default();
        let mut txids = first.txids.unwrap_or_default();
        for page in 2..=total_pages {
            let next = self.get_block_page(height, page).await?;
            txs.extend(next.txs.unwrap_or_default());
            txids.extend(next.txids.unwrap_or_default());
        }
        tracing::debug!(height, pages = total_pages, "fetched block");

        let payload = if inline {
            BlockPayload::InlineTxs(decode_txs(txs)?)
        } else {
            BlockPayload::TxRefs(txids)
        };
        Ok(IndexerBlock {
            height: first.height,
            hash,
            payload,
        })
    }

    async fn get_transaction(&self, txid: &str) -> Result<Transaction, ScanError> {
        let tx: TxResponse = self.get_json(&format!("api/v2/tx/{txid}")).await?;
        Ok(Transaction::try_from(tx)?)
    }

    fn configure(&self, profile: &ScannerProfile) {
        let mut policy = self.policy.write().unwrap_or_else(|e| e.into_inner());
        policy.timeout = Duration::from_millis(profile.timeout_ms);
        policy.retry.config.max_retries = profile.retry_limit;
        tracing::debug!(
            endpoint = %self.endpoint,
            timeout_ms = profile.timeout_ms,
            retry_limit = profile.retry_limit,
            "applied scanner profile to client"
        );
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
