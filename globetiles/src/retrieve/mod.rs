//! Resource retrieval.
//!
//! A [`Retriever`] performs one fetch through the
//! `NotStarted → Started → Connecting → Reading → Successful | Error | Interrupted`
//! lifecycle. The [`RetrievalService`] runs retrievers on a fixed worker pool
//! with priority ordering, duplicate rejection and stale-request dropping,
//! and stops issuing requests while [`NetworkStatus`] reports the network
//! down. A [`RetrieverFactory`] decides how a tile is fetched.

mod error;
mod expiry;
mod factory;
mod network;
mod pool;
mod retriever;
mod service;
mod state;
mod transport;

pub use error::{BoxError, RetrievalError, TransportError};
pub use expiry::compute_expiration;
pub use factory::{HttpRetrieverFactory, RetrieverFactory};
pub use network::{
    NetworkCounters, NetworkStatus, DEFAULT_ATTEMPT_LIMIT, DEFAULT_TRY_AGAIN_INTERVAL,
};
pub use pool::{PoolConfig, PoolStats, Submission, WorkerPool};
pub use retriever::{HttpRetriever, PostProcessor, RetrievedData, Retriever};
pub use service::{Completion, RequestOutcome, RetrievalConfig, RetrievalService};
pub use state::RetrieverState;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

#[cfg(test)]
pub use transport::tests::{MockResponse, MockTransport};
