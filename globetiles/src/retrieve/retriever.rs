//! Retrievers: one resource fetch driven through the lifecycle states.

use super::error::{BoxError, RetrievalError, TransportError};
use super::expiry::compute_expiration;
use super::network::NetworkStatus;
use super::state::RetrieverState;
use super::transport::HttpTransport;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Body read granularity; cancellation is checked between chunks.
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Upper bound on buffer space reserved from a declared length. Larger
/// bodies still grow as they arrive.
const MAX_PRESIZE: usize = 4 * 1024 * 1024;

/// MIME type of zipped payloads.
const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Result of a successful fetch.
#[derive(Debug, Clone, Default)]
pub struct RetrievedData {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub expiration: Option<SystemTime>,
}

/// Consumes the data of a completed fetch (decode, store, cache).
pub trait PostProcessor: Send + Sync {
    fn process(&self, source: &str, data: &RetrievedData) -> Result<(), BoxError>;
}

impl<F> PostProcessor for F
where
    F: Fn(&str, &RetrievedData) -> Result<(), BoxError> + Send + Sync,
{
    fn process(&self, source: &str, data: &RetrievedData) -> Result<(), BoxError> {
        self(source, data)
    }
}

/// A single resource fetch.
///
/// `call` runs the fetch to completion on the calling thread, honouring the
/// cancellation token. A cancelled fetch ends in
/// [`RetrieverState::Interrupted`] and returns `Ok`.
pub trait Retriever: Send + Sync {
    /// Identity of the fetched resource, normally its URL.
    fn name(&self) -> &str;

    fn call(&self, cancel: &CancellationToken) -> Result<RetrieverState, RetrievalError>;

    fn state(&self) -> RetrieverState;

    /// Retrieved bytes, available once the fetch succeeded.
    fn data(&self) -> Option<RetrievedData>;

    /// Whether the fetch goes over the network and is subject to network
    /// availability.
    fn requires_network(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
struct Progress {
    state: RetrieverState,
    data: Option<RetrievedData>,
}

/// HTTP retriever.
///
/// Two retrievers are equal when their URLs are textually equal.
pub struct HttpRetriever {
    url: String,
    transport: Arc<dyn HttpTransport>,
    post_processor: Option<Arc<dyn PostProcessor>>,
    network: Option<Arc<NetworkStatus>>,
    unzip: bool,
    progress: Mutex<Progress>,
}

impl HttpRetriever {
    pub fn new(url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            url: url.into(),
            transport,
            post_processor: None,
            network: None,
            unzip: false,
            progress: Mutex::new(Progress::default()),
        }
    }

    pub fn with_post_processor(mut self, post_processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    pub fn with_network_status(mut self, network: Arc<NetworkStatus>) -> Self {
        self.network = Some(network);
        self
    }

    /// Expand single-entry ZIP payloads served as `application/zip`.
    pub fn with_unzip(mut self, unzip: bool) -> Self {
        self.unzip = unzip;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn set_state(&self, state: RetrieverState) {
        self.progress.lock().state = state;
    }

    /// Move to `next` unless cancelled; returns false when interrupted.
    fn advance(&self, cancel: &CancellationToken, next: RetrieverState) -> bool {
        if cancel.is_cancelled() {
            debug!(url = %self.url, "Retrieval interrupted");
            self.set_state(RetrieverState::Interrupted);
            return false;
        }
        self.set_state(next);
        true
    }

    fn fail(&self, error: RetrievalError) -> Result<RetrieverState, RetrievalError> {
        self.set_state(RetrieverState::Error);
        match &error {
            RetrievalError::HostUnreachable { .. } => {
                if let Some(network) = &self.network {
                    network.log_unavailable_host(&self.url);
                }
                warn!(url = %self.url, error = %error, "Host unreachable");
            }
            RetrievalError::Timeout { .. } => {
                debug!(url = %self.url, "Retrieval timed out");
            }
            _ => warn!(url = %self.url, error = %error, "Retrieval failed"),
        }
        Err(error)
    }

    fn transport_error(&self, e: TransportError) -> RetrievalError {
        let url = self.url.clone();
        match e {
            TransportError::Connect(message) => RetrievalError::HostUnreachable { url, message },
            TransportError::Timeout => RetrievalError::Timeout { url },
            TransportError::Io(source) if source.kind() == std::io::ErrorKind::TimedOut => {
                RetrievalError::Timeout { url }
            }
            TransportError::Io(source) => RetrievalError::Io { url, source },
            TransportError::Other(message) => RetrievalError::Transport { url, message },
        }
    }

    /// Read the body in chunks, returning `None` when interrupted.
    fn read_body(
        &self,
        body: &mut dyn Read,
        content_length: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, RetrievalError> {
        let mut buffer = match content_length {
            Some(len) => BytesMut::with_capacity(presize(len)),
            None => BytesMut::new(),
        };
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let n = match body.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.transport_error(TransportError::Io(e))),
            };
            buffer.extend_from_slice(&chunk[..n]);
        }
        Ok(Some(buffer.freeze()))
    }

    fn fetch(&self, cancel: &CancellationToken) -> Result<Option<RetrievedData>, RetrievalError> {
        if !self.advance(cancel, RetrieverState::Connecting) {
            return Ok(None);
        }
        let mut response = self
            .transport
            .get(&self.url)
            .map_err(|e| self.transport_error(e))?;

        if !response.is_success() {
            return Err(RetrievalError::HttpStatus {
                url: self.url.clone(),
                status: response.status,
            });
        }

        if !self.advance(cancel, RetrieverState::Reading) {
            return Ok(None);
        }
        let content_length = response.content_length();
        let content_type = response.content_type();
        let expiration = compute_expiration(&response.headers, SystemTime::now());

        let Some(mut bytes) = self.read_body(&mut response.body, content_length, cancel)? else {
            self.set_state(RetrieverState::Interrupted);
            return Ok(None);
        };

        if self.unzip && content_type.as_deref() == Some(ZIP_CONTENT_TYPE) {
            bytes = unzip_single_entry(&bytes).map_err(|message| RetrievalError::Unzip {
                url: self.url.clone(),
                message,
            })?;
        }

        if let Some(network) = &self.network {
            network.log_available_host(&self.url, bytes.len() as u64);
        }

        Ok(Some(RetrievedData {
            bytes,
            content_type,
            content_length,
            expiration,
        }))
    }
}

impl Retriever for HttpRetriever {
    fn name(&self) -> &str {
        &self.url
    }

    fn call(&self, cancel: &CancellationToken) -> Result<RetrieverState, RetrievalError> {
        if !self.advance(cancel, RetrieverState::Started) {
            return Ok(RetrieverState::Interrupted);
        }

        let data = match self.fetch(cancel) {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(RetrieverState::Interrupted),
            Err(e) => return self.fail(e),
        };

        if let Some(post) = &self.post_processor {
            if let Err(source) = post.process(&self.url, &data) {
                return self.fail(RetrievalError::PostProcess {
                    url: self.url.clone(),
                    source,
                });
            }
        }

        let mut progress = self.progress.lock();
        progress.data = Some(data);
        progress.state = RetrieverState::Successful;
        Ok(RetrieverState::Successful)
    }

    fn state(&self) -> RetrieverState {
        self.progress.lock().state
    }

    fn data(&self) -> Option<RetrievedData> {
        self.progress.lock().data.clone()
    }
}

impl PartialEq for HttpRetriever {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for HttpRetriever {}

impl Hash for HttpRetriever {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl fmt::Debug for HttpRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRetriever")
            .field("url", &self.url)
            .field("state", &self.state())
            .field("unzip", &self.unzip)
            .finish()
    }
}

/// Initial capacity for a body whose length comes from the remote side.
fn presize(declared: u64) -> usize {
    usize::try_from(declared).map_or(MAX_PRESIZE, |n| n.min(MAX_PRESIZE))
}

/// Expand the first entry of a ZIP archive.
pub(crate) fn unzip_single_entry(bytes: &[u8]) -> Result<Bytes, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    if archive.is_empty() {
        return Err("archive has no entries".to_string());
    }
    let mut entry = archive.by_index(0).map_err(|e| e.to_string())?;
    let mut out = Vec::with_capacity(presize(entry.size()));
    entry.read_to_end(&mut out).map_err(|e| e.to_string())?;
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieve::transport::tests::{MockResponse, MockTransport};
    use crate::retrieve::HttpResponse;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashSet;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const URL: &str = "http://tiles.example.com/wms?bbox=0,0,1,1";

    fn retriever(response: MockResponse) -> (HttpRetriever, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(response));
        (HttpRetriever::new(URL, transport.clone()), transport)
    }

    fn hash_of(r: &HttpRetriever) -> u64 {
        let mut h = DefaultHasher::new();
        r.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_successful_fetch() {
        let (r, _) = retriever(
            MockResponse::ok(b"elevation".to_vec())
                .with_header("content-type", "application/bil16")
                .with_header("content-length", "9")
                .with_header("cache-control", "max-age=60"),
        );
        assert_eq!(r.state(), RetrieverState::NotStarted);

        let state = r.call(&CancellationToken::new()).unwrap();
        assert_eq!(state, RetrieverState::Successful);
        assert_eq!(r.state(), RetrieverState::Successful);

        let data = r.data().unwrap();
        assert_eq!(&data.bytes[..], b"elevation");
        assert_eq!(data.content_type.as_deref(), Some("application/bil16"));
        assert_eq!(data.content_length, Some(9));
        assert!(data.expiration.is_some());
    }

    #[test]
    fn test_oversized_content_length_is_not_trusted() {
        let (r, _) = retriever(
            MockResponse::ok(b"tiny".to_vec()).with_header("content-length", "18446744073709551615"),
        );
        assert_eq!(r.call(&CancellationToken::new()).unwrap(), RetrieverState::Successful);

        let data = r.data().unwrap();
        assert_eq!(&data.bytes[..], b"tiny");
        assert_eq!(data.content_length, Some(u64::MAX));
    }

    #[test]
    fn test_presize_is_capped() {
        assert_eq!(presize(9), 9);
        assert_eq!(presize(u64::MAX), MAX_PRESIZE);
        assert_eq!(presize(MAX_PRESIZE as u64 + 1), MAX_PRESIZE);
    }

    #[test]
    fn test_equality_and_hash_by_url() {
        let t: Arc<dyn HttpTransport> = Arc::new(MockTransport::new(MockResponse::ok(vec![])));
        let a = HttpRetriever::new(URL, t.clone());
        let b = HttpRetriever::new(URL, t.clone()).with_unzip(true);
        let c = HttpRetriever::new(format!("{URL}&x=1"), t);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a.url().to_string());
        assert!(set.contains(b.url()));
    }

    #[test]
    fn test_cancelled_before_start_is_interrupted() {
        let (r, transport) = retriever(MockResponse::ok(b"x".to_vec()));
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(r.call(&token).unwrap(), RetrieverState::Interrupted);
        assert_eq!(r.state(), RetrieverState::Interrupted);
        assert_eq!(transport.request_count(), 0);
        assert!(r.data().is_none());
    }

    #[test]
    fn test_cancel_during_read_interrupts() {
        struct CancellingReader {
            token: CancellationToken,
        }
        impl Read for CancellingReader {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.token.cancel();
                buf[0] = 1;
                Ok(1)
            }
        }

        struct SlowTransport(CancellationToken);
        impl HttpTransport for SlowTransport {
            fn get(&self, _url: &str) -> Result<HttpResponse, TransportError> {
                Ok(HttpResponse {
                    status: 200,
                    headers: Default::default(),
                    body: Box::new(CancellingReader {
                        token: self.0.clone(),
                    }),
                })
            }
        }

        let token = CancellationToken::new();
        let r = HttpRetriever::new(URL, Arc::new(SlowTransport(token.clone())));
        assert_eq!(r.call(&token).unwrap(), RetrieverState::Interrupted);
        assert_eq!(r.state(), RetrieverState::Interrupted);
    }

    #[test]
    fn test_http_status_error() {
        let (r, _) = retriever(MockResponse::status(404));
        let err = r.call(&CancellationToken::new()).unwrap_err();
        assert!(matches!(err, RetrievalError::HttpStatus { status: 404, .. }));
        assert_eq!(r.state(), RetrieverState::Error);
    }

    #[test]
    fn test_connect_failure_reported_to_network_status() {
        let network = Arc::new(NetworkStatus::new(1, std::time::Duration::from_secs(60)));
        let transport = Arc::new(MockTransport::new(MockResponse {
            fail_connect: true,
            ..Default::default()
        }));
        let r = HttpRetriever::new(URL, transport).with_network_status(network.clone());

        let err = r.call(&CancellationToken::new()).unwrap_err();
        assert!(err.is_host_unreachable());
        assert!(network.is_host_unavailable(URL));
    }

    #[test]
    fn test_timeout_is_not_host_failure() {
        let network = Arc::new(NetworkStatus::new(1, std::time::Duration::from_secs(60)));
        let transport = Arc::new(MockTransport::new(MockResponse {
            fail_timeout: true,
            ..Default::default()
        }));
        let r = HttpRetriever::new(URL, transport).with_network_status(network.clone());

        let err = r.call(&CancellationToken::new()).unwrap_err();
        assert!(err.is_timeout());
        assert!(!network.is_host_unavailable(URL));
    }

    #[test]
    fn test_unzip_single_entry_payload() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("tile.bil", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"inner payload").unwrap();
        let zipped = writer.finish().unwrap().into_inner();

        let (r, _) = retriever(
            MockResponse::ok(zipped.clone()).with_header("content-type", "application/zip"),
        );
        let r = r.with_unzip(true);
        r.call(&CancellationToken::new()).unwrap();
        assert_eq!(&r.data().unwrap().bytes[..], b"inner payload");

        // Without the flag the archive is passed through untouched.
        let (plain, _) =
            retriever(MockResponse::ok(zipped.clone()).with_header("content-type", "application/zip"));
        plain.call(&CancellationToken::new()).unwrap();
        assert_eq!(plain.data().unwrap().bytes.len(), zipped.len());
    }

    #[test]
    fn test_corrupt_zip_is_error() {
        let (r, _) = retriever(
            MockResponse::ok(b"not a zip".to_vec()).with_header("content-type", "application/zip"),
        );
        let r = r.with_unzip(true);
        let err = r.call(&CancellationToken::new()).unwrap_err();
        assert!(matches!(err, RetrievalError::Unzip { .. }));
    }

    #[test]
    fn test_post_processor_runs_and_failure_is_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let ok: Arc<dyn PostProcessor> = Arc::new(move |_: &str, data: &RetrievedData| -> Result<(), BoxError> {
            counter.fetch_add(data.bytes.len(), Ordering::SeqCst);
            Ok(())
        });
        let (r, _) = retriever(MockResponse::ok(b"1234".to_vec()));
        let r = r.with_post_processor(ok);
        r.call(&CancellationToken::new()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let failing: Arc<dyn PostProcessor> =
            Arc::new(|_: &str, _: &RetrievedData| -> Result<(), BoxError> { Err("bad tile".into()) });
        let (r, _) = retriever(MockResponse::ok(b"1234".to_vec()));
        let r = r.with_post_processor(failing);
        let err = r.call(&CancellationToken::new()).unwrap_err();
        assert!(matches!(err, RetrievalError::PostProcess { .. }));
        assert_eq!(r.state(), RetrieverState::Error);
    }
}
