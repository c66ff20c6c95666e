//! HTTP transport abstraction for testability.

use super::error::TransportError;
use std::collections::HashMap;
use std::io::Read;
use std::time::Duration;

/// Default User-Agent string for HTTP requests.
const DEFAULT_USER_AGENT: &str = concat!("globetiles/", env!("CARGO_PKG_VERSION"));

/// Response headers and a streaming body.
pub struct HttpResponse {
    pub status: u16,
    /// Header map with lowercase names
    pub headers: HashMap<String, String>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// `Content-Length`, when present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }

    /// `Content-Type` without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for blocking HTTP GET.
///
/// Abstracts the network so retrievers can be exercised with in-memory
/// responses.
pub trait HttpTransport: Send + Sync {
    /// Issue a GET and return the response once headers have arrived.
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Real transport implementation using reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Create a transport with the given connect and overall timeouts.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(connect_timeout + read_timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = self.client.get(url).send().map_err(map_reqwest_error)?;

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        Ok(HttpResponse {
            status: response.status().as_u16(),
            headers,
            body: Box::new(response),
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned response served by [`MockTransport`].
    #[derive(Clone, Default)]
    pub struct MockResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
        pub fail_connect: bool,
        pub fail_timeout: bool,
        /// Time spent before answering
        pub delay: Option<Duration>,
    }

    impl MockResponse {
        pub fn ok(body: impl Into<Vec<u8>>) -> Self {
            Self {
                status: 200,
                body: body.into(),
                ..Default::default()
            }
        }

        pub fn status(status: u16) -> Self {
            Self {
                status,
                ..Default::default()
            }
        }

        pub fn with_header(mut self, name: &str, value: &str) -> Self {
            self.headers
                .push((name.to_ascii_lowercase(), value.to_string()));
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    /// Mock transport returning one canned response for every URL.
    pub struct MockTransport {
        pub response: Mutex<MockResponse>,
        pub requests: AtomicUsize,
        pub urls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        pub fn new(response: MockResponse) -> Self {
            Self {
                response: Mutex::new(response),
                requests: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    impl HttpTransport for MockTransport {
        fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().push(url.to_string());
            let response = self.response.lock().clone();
            if let Some(delay) = response.delay {
                std::thread::sleep(delay);
            }
            if response.fail_connect {
                return Err(TransportError::Connect("connection refused".to_string()));
            }
            if response.fail_timeout {
                return Err(TransportError::Timeout);
            }
            Ok(HttpResponse {
                status: response.status,
                headers: response.headers.into_iter().collect(),
                body: Box::new(Cursor::new(response.body)),
            })
        }
    }

    #[test]
    fn test_response_content_type_strips_parameters() {
        let response = HttpResponse {
            status: 200,
            headers: [("content-type".to_string(), "Application/Zip; charset=x".to_string())]
                .into_iter()
                .collect(),
            body: Box::new(Cursor::new(Vec::new())),
        };
        assert_eq!(response.content_type().as_deref(), Some("application/zip"));
        assert!(response.is_success());
        assert_eq!(response.content_length(), None);
    }
}
