// src/storage/mirror_client.rs
//! Remote mirror of the certificate ledger.
//!
//! After every mutation the registry publishes the serialized ledger to a
//! background worker that POSTs it to a mirror endpoint. The endpoint keeps
//! only the last snapshot it received, so the worker does the same: while a
//! push is being retried a newer snapshot replaces the pending one.
//!
//! # Features
//! - Bounded exponential backoff between attempts
//! - Non-blocking publish that never fails the caller
//! - `GET` fetch used to bootstrap an empty local ledger

use crate::error::{RegistryError, Result};
use crate::models::certificate::CertificateLedger;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// HTTP client for one mirror endpoint.
#[derive(Clone, Debug)]
pub struct MirrorClient {
    client: Client,
    url: String,
}

impl MirrorClient {
    /// Creates a client for `url` with a per-request `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends the full ledger JSON to the mirror.
    ///
    /// # Errors
    /// - `Mirror` on connection or timeout failures
    /// - `MirrorStatus` if the endpoint answers with a non-success status
    pub async fn push(&self, snapshot: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(snapshot.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::MirrorStatus(status.as_u16()));
        }
        Ok(())
    }

    /// Downloads the last ledger the mirror saved (empty if none).
    pub async fn fetch(&self) -> Result<CertificateLedger> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::MirrorStatus(status.as_u16()));
        }
        Ok(response.json::<CertificateLedger>().await?)
    }
}

/// Retry schedule for mirror pushes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per snapshot, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given `attempt` failures so far.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Sending side of the mirror worker.
///
/// Dropping the handle stops the worker once its current push settles.
#[derive(Debug)]
pub struct MirrorHandle {
    tx: watch::Sender<Option<String>>,
}

impl MirrorHandle {
    /// Creates a handle and the receiver a worker drains.
    pub(crate) fn channel() -> (Self, watch::Receiver<Option<String>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    /// Queues `snapshot` for mirroring, replacing any snapshot not yet sent.
    pub fn publish(&self, snapshot: String) {
        self.tx.send_replace(Some(snapshot));
    }
}

/// Background task that delivers published snapshots.
pub struct MirrorWorker;

impl MirrorWorker {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(client: MirrorClient, policy: RetryPolicy) -> (MirrorHandle, JoinHandle<()>) {
        let (handle, rx) = MirrorHandle::channel();
        let task = tokio::spawn(Self::run(client, policy, rx));
        (handle, task)
    }

    async fn run(client: MirrorClient, policy: RetryPolicy, mut rx: watch::Receiver<Option<String>>) {
        log::info!("mirroring certificate ledger to {}", client.url());
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if let Some(snapshot) = snapshot {
                Self::deliver(&client, &policy, &snapshot, &rx).await;
            }
        }
        log::debug!("mirror handles dropped, worker exiting");
    }

    async fn deliver(
        client: &MirrorClient,
        policy: &RetryPolicy,
        snapshot: &str,
        rx: &watch::Receiver<Option<String>>,
    ) {
        let max_attempts = policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match client.push(snapshot).await {
                Ok(()) => {
                    log::debug!("mirrored {} bytes on attempt {}", snapshot.len(), attempt);
                    return;
                }
                Err(e) if attempt == max_attempts => {
                    log::warn!("mirror push abandoned after {} attempts: {}", attempt, e);
                    return;
                }
                Err(e) => {
                    let delay = policy.backoff(attempt);
                    log::warn!(
                        "mirror push attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }

            if rx.has_changed().unwrap_or(false) {
                log::debug!("newer snapshot queued, dropping stale one");
                return;
            }
        }
    }
}
