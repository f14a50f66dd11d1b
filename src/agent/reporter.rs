//! Delivery of aggregator snapshots to the collector.
//!
//! A cycle wraps the payload in the wire envelope: keyed digest over the
//! plaintext, optional RSA encryption, then gzip. Cycles are capped by a
//! counting semaphore; acquiring is non-blocking and a saturated tick is
//! skipped, never queued.

use crate::core::retry::{retry_with_config, RetryConfig};
use crate::core::{AgentConfig, Batch, MetricaError, Result};
use crate::server::integrity::{keyed_digest, DIGEST_HEADER};
use flate2::{write::GzEncoder, Compression};
use rsa::{pkcs8::DecodePublicKey, Pkcs1v15Encrypt, RsaPublicKey};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Sends wire batches to the collector with bounded concurrency and retry.
pub struct Reporter {
    client: reqwest::Client,
    base_url: String,
    key: Option<String>,
    crypto_key: Option<RsaPublicKey>,
    slots: Arc<Semaphore>,
    rate_limit: usize,
    retry: RetryConfig,
}

impl Reporter {
    /// Builds a reporter. Fails when the encryption key cannot be read or
    /// parsed: the agent must not start half-configured.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let crypto_key = match &config.crypto_key {
            None => None,
            Some(path) => {
                let pem = std::fs::read_to_string(path).map_err(|e| {
                    MetricaError::crypto(format!(
                        "cannot read public key {}: {e}",
                        path.display()
                    ))
                })?;
                let key = RsaPublicKey::from_public_key_pem(&pem).map_err(|e| {
                    MetricaError::crypto(format!(
                        "cannot parse public key {}: {e}",
                        path.display()
                    ))
                })?;
                Some(key)
            },
        };

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url(),
            key: config.key.clone(),
            crypto_key,
            slots: Arc::new(Semaphore::new(config.rate_limit)),
            rate_limit: config.rate_limit,
            retry: RetryConfig::default(),
        })
    }

    /// Overrides the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Claims a send slot without blocking. On saturation the tick must be
    /// dropped; the aggregator keeps accumulating and the next successful
    /// cycle carries the data.
    pub fn try_begin_cycle(&self) -> Result<OwnedSemaphorePermit> {
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => {
                Err(MetricaError::RateLimited {
                    limit: self.rate_limit,
                })
            },
        }
    }

    /// Delivers one snapshot. Whole batch in a single request normally;
    /// per-sample requests when encryption is on, because PKCS#1 v1.5
    /// bounds the plaintext to the key size.
    pub async fn send_cycle(&self, batch: &Batch) -> Result<()> {
        if batch.is_empty() {
            tracing::debug!("nothing to report");
            return Ok(());
        }

        if self.crypto_key.is_some() {
            for sample in batch {
                let plaintext = serde_json::to_vec(sample)?;
                self.deliver(plaintext, "/update/").await?;
            }
        } else {
            let plaintext = serde_json::to_vec(batch)?;
            self.deliver(plaintext, "/updates/").await?;
        }

        tracing::info!(samples = batch.len(), "reported metrics");
        Ok(())
    }

    async fn deliver(&self, plaintext: Vec<u8>, path: &str) -> Result<()> {
        // Digest over the plaintext, before encryption and compression.
        let digest = self.key.as_deref().map(|key| keyed_digest(key, &plaintext));

        let payload = match &self.crypto_key {
            None => plaintext,
            Some(key) => key
                .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, &plaintext)
                .map_err(|e| MetricaError::crypto(format!("payload encryption failed: {e}")))?,
        };

        let body = gzip(&payload)?;
        let url = format!("{}{path}", self.base_url);

        retry_with_config(&self.retry, || {
            self.post(&url, body.clone(), digest.as_deref())
        })
        .await
    }

    async fn post(&self, url: &str, body: Vec<u8>, digest: Option<&str>) -> Result<()> {
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .header(reqwest::header::ACCEPT_ENCODING, "gzip")
            .body(body);
        if let Some(digest) = digest {
            request = request.header(DIGEST_HEADER, digest);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MetricaError::network(format!("send failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(MetricaError::network(format!("server error: {status}")));
        }
        if !status.is_success() {
            return Err(MetricaError::InvalidMetric(format!(
                "collector rejected payload: {status}"
            )));
        }
        Ok(())
    }
}

fn gzip(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    Ok(encoder.finish()?)
}
