//! Fan-out/join over many sessions.
//!
//! All sessions of a batch are plain futures polled by one task: nothing is
//! spawned per connection. Results land in the slot of their endpoint's
//! input position, so output order never depends on completion order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::config::{ClientConfig, FailurePolicy};
use crate::core::endpoint::Endpoint;
use crate::core::error::{BatchError, BatchFailure, EndpointFailure, RequestError};
use crate::core::session::{ConnectionGauge, Session, REQUEST_LINE};

#[derive(Debug, Clone)]
pub struct Coordinator {
    config: Arc<ClientConfig>,
    gauge: ConnectionGauge,
    handle: Option<Handle>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Coordinator {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            gauge: ConnectionGauge::new(),
            handle: None,
        }
    }

    /// Drive batches on `handle` instead of the caller's ambient runtime.
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connections currently held open by sessions of this coordinator
    /// (and its clones).
    pub fn open_connections(&self) -> usize {
        self.gauge.open()
    }

    /// Fetches every endpoint concurrently and returns the payloads in input
    /// order, or the failure(s) according to the configured
    /// [`FailurePolicy`].
    pub async fn run<I, E>(&self, endpoints: I) -> Result<Vec<Bytes>, BatchError>
    where
        I: IntoIterator<Item = E>,
        E: Into<Endpoint>,
    {
        let endpoints: Vec<Endpoint> = endpoints.into_iter().map(Into::into).collect();
        let this = self.clone();
        self.drive(async move { this.run_batch(endpoints).await })
            .await?
    }

    /// Like [`Coordinator::run`] but never fails as a whole: every position
    /// holds its own outcome.
    pub async fn run_settled<I, E>(
        &self,
        endpoints: I,
    ) -> Result<Vec<Result<Bytes, RequestError>>, BatchError>
    where
        I: IntoIterator<Item = E>,
        E: Into<Endpoint>,
    {
        let endpoints: Vec<Endpoint> = endpoints.into_iter().map(Into::into).collect();
        let this = self.clone();
        self.drive(async move { this.settle_all(&endpoints).await })
            .await
    }

    /// Polls `batch` in the current task, or spawns it on the configured
    /// runtime and waits for it. The spawned task is aborted if the caller
    /// stops waiting.
    async fn drive<F, T>(&self, batch: F) -> Result<T, BatchError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match &self.handle {
            None => Ok(batch.await),
            Some(handle) => {
                let task = AbortOnDrop(handle.spawn(batch));
                Ok(task.await?)
            }
        }
    }

    async fn run_batch(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Bytes>, BatchError> {
        let started = Instant::now();
        let total = endpoints.len();
        info!(
            requests = total,
            policy = %self.config.failure_policy,
            "starting batch"
        );

        let result = match self.config.failure_policy {
            FailurePolicy::WaitAll => self.wait_all(&endpoints).await,
            FailurePolicy::FailFast => self.fail_fast(&endpoints).await,
        };

        match &result {
            Ok(_) => info!(
                requests = total,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "batch complete"
            ),
            Err(e) => warn!(
                requests = total,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "batch failed: {}",
                e
            ),
        }
        result
    }

    async fn wait_all(&self, endpoints: &[Endpoint]) -> Result<Vec<Bytes>, BatchError> {
        let outcomes = self.settle_all(endpoints).await;

        let mut payloads = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(payload) => payloads.push(payload),
                Err(error) => failures.push(EndpointFailure { index, error }),
            }
        }

        if failures.is_empty() {
            Ok(payloads)
        } else {
            Err(BatchError::Failed(BatchFailure {
                total: endpoints.len(),
                failures,
            }))
        }
    }

    async fn fail_fast(&self, endpoints: &[Endpoint]) -> Result<Vec<Bytes>, BatchError> {
        let mut slots: Vec<Option<Bytes>> = vec![None; endpoints.len()];
        let mut pending: FuturesUnordered<_> = endpoints
            .iter()
            .enumerate()
            .map(|(index, endpoint)| {
                let session = self.session(endpoint.clone());
                async move { (index, session.await) }
            })
            .collect();

        while let Some((index, outcome)) = pending.next().await {
            match outcome {
                Ok(payload) => slots[index] = Some(payload),
                Err(error) => {
                    debug!(
                        index,
                        remaining = pending.len(),
                        "cancelling remaining sessions"
                    );
                    // Dropping the set drops every unfinished session, which
                    // releases its connection.
                    drop(pending);
                    return Err(BatchError::Failed(BatchFailure {
                        total: endpoints.len(),
                        failures: vec![EndpointFailure { index, error }],
                    }));
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    async fn settle_all(&self, endpoints: &[Endpoint]) -> Vec<Result<Bytes, RequestError>> {
        join_all(
            endpoints
                .iter()
                .map(|endpoint| self.session(endpoint.clone())),
        )
        .await
    }

    /// One session, bounded by `request_timeout` when configured.
    fn session(
        &self,
        endpoint: Endpoint,
    ) -> impl Future<Output = Result<Bytes, RequestError>> + Send + 'static {
        let config = Arc::clone(&self.config);
        let gauge = self.gauge.clone();
        let span = tracing::debug_span!("session", endpoint = %endpoint);

        async move {
            let fetch = Session::fetch(endpoint.clone(), REQUEST_LINE, &config, gauge);
            match config.request_timeout {
                Some(after) => match tokio::time::timeout(after, fetch).await {
                    Ok(result) => result,
                    Err(_) => Err(RequestError::Timeout { endpoint, after }),
                },
                None => fetch.await,
            }
        }
        .instrument(span)
    }
}

/// Aborts the wrapped task when dropped before it finished.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, tokio::task::JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
