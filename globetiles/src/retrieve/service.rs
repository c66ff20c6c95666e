//! Retrieval service: runs retrievers on a fixed worker pool.

use super::error::RetrievalError;
use super::network::{NetworkCounters, NetworkStatus};
use super::pool::{PoolConfig, PoolStats, Submission, WorkerPool};
use super::retriever::Retriever;
use super::state::RetrieverState;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Retrieval configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Number of retrieval worker threads (default: 8)
    pub worker_threads: usize,
    /// Maximum queued requests (default: 200)
    pub queue_capacity: usize,
    /// Queued requests older than this are dropped (default: 30s)
    pub stale_request_limit: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Connection failures before a host is considered down (default: 7)
    pub attempt_limit: u32,
    /// Time before a down host is tried again (default: 60s)
    pub try_again_interval: Duration,
    pub offline: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            worker_threads: 8,
            queue_capacity: 200,
            stale_request_limit: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(8),
            read_timeout: Duration::from_secs(20),
            attempt_limit: super::network::DEFAULT_ATTEMPT_LIMIT,
            try_again_interval: super::network::DEFAULT_TRY_AGAIN_INTERVAL,
            offline: false,
        }
    }
}

/// Outcome of a retrieval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Submitted,
    /// A retriever with the same name is queued or running
    Duplicate,
    QueueFull,
    NetworkUnavailable,
    ShutDown,
}

impl From<Submission> for RequestOutcome {
    fn from(s: Submission) -> Self {
        match s {
            Submission::Submitted => Self::Submitted,
            Submission::Duplicate => Self::Duplicate,
            Submission::QueueFull => Self::QueueFull,
            Submission::ShutDown => Self::ShutDown,
        }
    }
}

/// Completion callback for a retrieval.
pub type Completion = Box<dyn FnOnce(Result<RetrieverState, RetrievalError>) + Send + 'static>;

/// Delivers a completion exactly once. A retrieval dropped before it ran
/// (stale, discarded at shutdown, or unwound by a panic) completes as
/// `Interrupted`.
struct CompletionGuard {
    on_complete: Arc<Mutex<Option<Completion>>>,
}

impl CompletionGuard {
    fn complete(self, result: Result<RetrieverState, RetrievalError>) {
        let on_complete = self.on_complete.lock().take();
        if let Some(on_complete) = on_complete {
            on_complete(result);
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let on_complete = self.on_complete.lock().take();
        if let Some(on_complete) = on_complete {
            on_complete(Ok(RetrieverState::Interrupted));
        }
    }
}

/// Runs retrievers asynchronously on a fixed pool of threads.
pub struct RetrievalService {
    pool: WorkerPool,
    network: Arc<NetworkStatus>,
    root: CancellationToken,
}

impl RetrievalService {
    pub fn new(config: &RetrievalConfig) -> std::io::Result<Self> {
        let network = Arc::new(NetworkStatus::new(
            config.attempt_limit,
            config.try_again_interval,
        ));
        network.set_offline(config.offline);
        Self::with_network_status(config, network)
    }

    /// Create a service sharing an existing network status.
    pub fn with_network_status(
        config: &RetrievalConfig,
        network: Arc<NetworkStatus>,
    ) -> std::io::Result<Self> {
        let mut pool_config = PoolConfig::new("retrieval", config.worker_threads);
        pool_config.queue_capacity = config.queue_capacity;
        pool_config.stale_limit = config.stale_request_limit;
        let pool = WorkerPool::new(pool_config)?;

        info!(
            threads = config.worker_threads,
            queue_capacity = config.queue_capacity,
            "Retrieval service started"
        );

        Ok(Self {
            pool,
            network,
            root: CancellationToken::new(),
        })
    }

    pub fn network_status(&self) -> &Arc<NetworkStatus> {
        &self.network
    }

    /// Queue a retriever without a completion callback.
    pub fn run_retriever(&self, retriever: Arc<dyn Retriever>, priority: f64) -> RequestOutcome {
        self.run_retriever_with(retriever, priority, Box::new(|_| {}))
    }

    /// Queue a retriever; `on_complete` runs on the worker thread after
    /// `call` returns. It is not invoked for rejected requests. A request
    /// that is accepted but never runs completes with `Interrupted`.
    pub fn run_retriever_with(
        &self,
        retriever: Arc<dyn Retriever>,
        priority: f64,
        on_complete: Completion,
    ) -> RequestOutcome {
        let name = retriever.name().to_string();

        if retriever.requires_network()
            && (self.network.is_network_unavailable() || self.network.is_host_unavailable(&name))
        {
            debug!(url = %name, "Network unavailable, request rejected");
            return RequestOutcome::NetworkUnavailable;
        }

        let token = self.root.child_token();
        let slot = Arc::new(Mutex::new(Some(on_complete)));
        let guard = CompletionGuard {
            on_complete: Arc::clone(&slot),
        };
        let job = move || {
            let result = retriever.call(&token);
            guard.complete(result);
        };
        match self.pool.try_submit(name, priority, job) {
            Ok(()) => RequestOutcome::Submitted,
            Err((rejected, job)) => {
                // Rejections are reported through the outcome alone.
                slot.lock().take();
                drop(job);
                RequestOutcome::from(rejected)
            }
        }
    }

    /// Whether a retriever with this name is queued or running.
    pub fn contains(&self, name: &str) -> bool {
        self.pool.contains(name)
    }

    /// Whether the queue can take more work.
    pub fn is_available(&self) -> bool {
        self.pool.has_capacity()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn network_counters(&self) -> NetworkCounters {
        self.network.counters()
    }

    /// Block until all queued and running retrievals finished.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }

    /// Stop accepting requests. When `immediately`, queued requests are
    /// dropped and running retrievers are interrupted.
    pub fn shutdown(&self, immediately: bool) {
        info!(immediately, "Retrieval service shutting down");
        if immediately {
            self.pool.shutdown_now();
            self.root.cancel();
        } else {
            self.pool.shutdown();
        }
    }
}

impl Drop for RetrievalService {
    fn drop(&mut self) {
        self.shutdown(true);
        self.pool.join();
    }
}
