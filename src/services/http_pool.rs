use crate::services::logger::Logger;
use reqwest::Client;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("HTTP client pool is shut down")]
    Closed,
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

struct PoolState {
    client: Option<Client>,
    closed: bool,
}

struct PoolInner {
    logger: Logger,
    connect_timeout: Duration,
    read_timeout: Duration,
    state: Mutex<PoolState>,
    in_flight: AtomicUsize,
    built: AtomicUsize,
    shut_down: AtomicBool,
    drained: Notify,
}

/// Process-wide pooled HTTP client for upstream calls.
///
/// The client is built on first [`acquire`](Self::acquire) and shared by
/// every caller afterwards. [`shutdown`](Self::shutdown) refuses new
/// leases, waits for outstanding ones, then drops the client.
#[derive(Clone)]
pub struct HttpClientPool {
    inner: Arc<PoolInner>,
}

/// A borrowed handle on the pooled client. Dropping it marks the request
/// as finished.
pub struct ClientLease {
    client: Client,
    inner: Arc<PoolInner>,
}

impl ClientLease {
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Drop for ClientLease {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

impl HttpClientPool {
    pub fn new(logger: Logger, connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                logger: logger.child("http_pool"),
                connect_timeout,
                read_timeout,
                state: Mutex::new(PoolState {
                    client: None,
                    closed: false,
                }),
                in_flight: AtomicUsize::new(0),
                built: AtomicUsize::new(0),
                shut_down: AtomicBool::new(false),
                drained: Notify::new(),
            }),
        }
    }

    pub fn acquire(&self) -> Result<ClientLease, PoolError> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| PoolError::Build("client pool lock poisoned".to_string()))?;
        if state.closed {
            return Err(PoolError::Closed);
        }
        let client = match &state.client {
            Some(existing) => existing.clone(),
            None => {
                let client = Client::builder()
                    .connect_timeout(self.inner.connect_timeout)
                    .timeout(self.inner.read_timeout)
                    .build()
                    .map_err(|err| PoolError::Build(err.to_string()))?;
                self.inner.built.fetch_add(1, Ordering::SeqCst);
                self.inner.logger.debug(
                    "HTTP client created",
                    Some(&json!({
                        "connect_timeout_ms": self.inner.connect_timeout.as_millis() as u64,
                        "read_timeout_ms": self.inner.read_timeout.as_millis() as u64,
                    })),
                );
                state.client = Some(client.clone());
                client
            }
        };
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(ClientLease {
            client,
            inner: self.inner.clone(),
        })
    }

    /// Closes the pool. Returns `true` only for the call that performed the
    /// close; later calls are no-ops.
    pub async fn shutdown(&self) -> bool {
        {
            let Ok(mut state) = self.inner.state.lock() else {
                return false;
            };
            if state.closed {
                return false;
            }
            state.closed = true;
        }

        loop {
            let drained = self.inner.drained.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            drained.await;
        }

        let dropped = match self.inner.state.lock() {
            Ok(mut state) => state.client.take().is_some(),
            Err(_) => false,
        };
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner
            .logger
            .info("HTTP client pool closed", Some(&json!({ "had_client": dropped })));
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.client.is_some())
            .unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// How many client instances this pool has ever built.
    pub fn instances_built(&self) -> usize {
        self.inner.built.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> HttpClientPool {
        HttpClientPool::new(
            Logger::new("test"),
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn client_is_built_lazily_and_once() {
        let pool = pool();
        assert!(!pool.is_initialized());
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        assert_eq!(pool.instances_built(), 1);
        assert_eq!(pool.in_flight(), 2);
        drop(first);
        drop(second);
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.is_initialized());
    }

    #[tokio::test]
    async fn concurrent_first_acquires_share_one_client() {
        let pool = pool();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.acquire().map(|_| ()) })
            })
            .collect();
        for handle in futures::future::join_all(handles).await {
            handle.unwrap().unwrap();
        }
        assert_eq!(pool.instances_built(), 1);
    }

    #[tokio::test]
    async fn shutdown_runs_exactly_once_and_refuses_new_leases() {
        let pool = pool();
        drop(pool.acquire().unwrap());
        assert!(pool.shutdown().await);
        assert!(!pool.shutdown().await);
        assert!(pool.is_closed());
        assert!(!pool.is_initialized());
        assert_eq!(pool.acquire().err(), Some(PoolError::Closed));
    }

    #[tokio::test]
    async fn shutdown_without_client_is_safe() {
        let pool = pool();
        assert!(pool.shutdown().await);
        assert_eq!(pool.instances_built(), 0);
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_leases() {
        let pool = pool();
        let lease = pool.acquire().unwrap();
        let closer = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!closer.is_finished());
        assert!(!pool.is_closed());
        assert!(pool.acquire().is_err());
        drop(lease);
        assert!(closer.await.unwrap());
        assert!(pool.is_closed());
    }
}
