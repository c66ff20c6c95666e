//! Shared network availability tracking.
//!
//! Hosts that fail to connect `attempt_limit` times are treated as
//! unavailable until the try-again interval has passed since their last
//! failure. The retrieval service refuses requests for unavailable hosts and
//! stops issuing any request while the whole network is unavailable.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default number of failures before a host is considered down.
pub const DEFAULT_ATTEMPT_LIMIT: u32 = 7;

/// Default time before an unavailable host is tried again.
pub const DEFAULT_TRY_AGAIN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct HostFailures {
    count: u32,
    last_failure: Instant,
}

/// Snapshot of network counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCounters {
    pub successes: u64,
    pub failures: u64,
    pub bytes_received: u64,
}

/// Per-host failure tracking plus an offline switch.
#[derive(Debug)]
pub struct NetworkStatus {
    hosts: Mutex<HashMap<String, HostFailures>>,
    offline: AtomicBool,
    attempt_limit: u32,
    try_again_interval: Duration,
    successes: AtomicU64,
    failures: AtomicU64,
    bytes_received: AtomicU64,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPT_LIMIT, DEFAULT_TRY_AGAIN_INTERVAL)
    }
}

impl NetworkStatus {
    pub fn new(attempt_limit: u32, try_again_interval: Duration) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            attempt_limit: attempt_limit.max(1),
            try_again_interval,
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    /// Record a connection failure for the host of `url`.
    pub fn log_unavailable_host(&self, url: &str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let Some(host) = host_of(url) else {
            return;
        };
        let mut hosts = self.hosts.lock();
        let entry = hosts.entry(host.clone()).or_insert(HostFailures {
            count: 0,
            last_failure: Instant::now(),
        });
        // A host past its try-again interval starts counting afresh.
        if entry.last_failure.elapsed() > self.try_again_interval {
            entry.count = 0;
        }
        entry.count += 1;
        entry.last_failure = Instant::now();
        if entry.count == self.attempt_limit {
            warn!(host = %host, attempts = entry.count, "Host marked unavailable");
        }
    }

    /// Record a successful exchange with the host of `url`.
    pub fn log_available_host(&self, url: &str, bytes: u64) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        if let Some(host) = host_of(url) {
            if self.hosts.lock().remove(&host).is_some() {
                info!(host = %host, "Host available again");
            }
        }
    }

    /// Whether requests to the host of `url` should be withheld.
    pub fn is_host_unavailable(&self, url: &str) -> bool {
        if self.is_offline() {
            return true;
        }
        let Some(host) = host_of(url) else {
            return false;
        };
        self.hosts
            .lock()
            .get(&host)
            .is_some_and(|f| self.is_down(f))
    }

    /// Whether no request should be issued at all: offline mode, or every
    /// host seen failing is currently down.
    pub fn is_network_unavailable(&self) -> bool {
        if self.is_offline() {
            return true;
        }
        let hosts = self.hosts.lock();
        !hosts.is_empty() && hosts.values().all(|f| self.is_down(f))
    }

    fn is_down(&self, failures: &HostFailures) -> bool {
        failures.count >= self.attempt_limit
            && failures.last_failure.elapsed() < self.try_again_interval
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
        info!(offline, "Network offline mode changed");
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Relaxed)
    }

    pub fn attempt_limit(&self) -> u32 {
        self.attempt_limit
    }

    pub fn try_again_interval(&self) -> Duration {
        self.try_again_interval
    }

    pub fn counters(&self) -> NetworkCounters {
        NetworkCounters {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Lowercase host name of a URL.
pub(crate) fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://tiles.example.com/wms?x=1";

    #[test]
    fn test_host_unavailable_after_attempt_limit() {
        let status = NetworkStatus::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            status.log_unavailable_host(URL);
        }
        assert!(!status.is_host_unavailable(URL));

        status.log_unavailable_host(URL);
        assert!(status.is_host_unavailable(URL));
        assert!(status.is_network_unavailable());
        assert!(!status.is_host_unavailable("http://other.example.com/"));
    }

    #[test]
    fn test_success_clears_host() {
        let status = NetworkStatus::new(1, Duration::from_secs(60));
        status.log_unavailable_host(URL);
        assert!(status.is_host_unavailable(URL));

        status.log_available_host(URL, 512);
        assert!(!status.is_host_unavailable(URL));
        assert!(!status.is_network_unavailable());

        let counters = status.counters();
        assert_eq!(counters.successes, 1);
        assert_eq!(counters.failures, 1);
        assert_eq!(counters.bytes_received, 512);
    }

    #[test]
    fn test_try_again_after_interval() {
        let status = NetworkStatus::new(1, Duration::from_millis(20));
        status.log_unavailable_host(URL);
        assert!(status.is_host_unavailable(URL));

        std::thread::sleep(Duration::from_millis(40));
        assert!(!status.is_host_unavailable(URL));
    }

    #[test]
    fn test_network_available_while_some_host_works() {
        let status = NetworkStatus::new(1, Duration::from_secs(60));
        status.log_unavailable_host(URL);
        status.log_unavailable_host("http://b.example.com/");
        assert!(status.is_network_unavailable());

        // A host with failures below the limit keeps the network up.
        let lenient = NetworkStatus::new(5, Duration::from_secs(60));
        lenient.log_unavailable_host(URL);
        assert!(!lenient.is_network_unavailable());
    }

    #[test]
    fn test_offline_mode() {
        let status = NetworkStatus::default();
        status.set_offline(true);
        assert!(status.is_network_unavailable());
        assert!(status.is_host_unavailable(URL));
        assert_eq!(status.attempt_limit(), DEFAULT_ATTEMPT_LIMIT);
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of(URL).as_deref(), Some("tiles.example.com"));
        assert_eq!(host_of("not a url"), None);
    }
}
