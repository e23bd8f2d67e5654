//! HTTP Telemetry Sink
//!
//! ## Overview
//!
//! Posts each frame as JSON to the tracking server:
//!
//! ```text
//! POST /log
//! {"x": 0.84, "y": 3.17, "dist0": 3.26, "dist1": null, "dist2": 3.31, "dist3": 3.29}
//! ```
//!
//! ## Delivery
//!
//! One attempt per frame with a short timeout (1 s by default). A lost
//! frame is superseded by the next cycle's, so there is no retry and no
//! buffering; failures are returned to the caller and counted in
//! [`ConnectionStats`].
//!
//! The request blocks for up to the timeout. On the cycle thread, wrap the
//! sink in a [`TelemetryForwarder`](crate::forward::TelemetryForwarder).
//!
//! ## Example Usage
//!
//! ```no_run
//! use uwbtrack_connectors::http::{HttpConfig, HttpSink};
//!
//! let config = HttpConfig::new("http://192.168.1.20:5000")
//!     .bearer_token("tag-07")
//!     .timeout_ms(500);
//!
//! let sink = HttpSink::new(config)?;
//! # Ok::<(), uwbtrack_connectors::http::HttpError>(())
//! ```

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use thiserror::Error;
use uwbtrack_core::constants::TELEMETRY_TIMEOUT_MS;
use uwbtrack_core::{TelemetryFrame, TelemetrySink};

use crate::ConnectionStats;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(TELEMETRY_TIMEOUT_MS);

/// Default endpoint path on the tracking server
pub const DEFAULT_PATH: &str = "/log";

/// HTTP-specific errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(String),

    /// Server returned error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// HTTP configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Server URL, scheme and authority
    pub base_url: String,
    /// Endpoint path
    pub path: String,
    /// Request timeout
    pub timeout: Duration,
    /// Authentication method
    pub auth: AuthMethod,
    /// Custom headers
    pub headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

/// Authentication methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication
    None,
    /// Bearer token
    Bearer(String),
    /// Basic authentication
    Basic { username: String, password: String },
    /// API key in header
    ApiKey { header: String, value: String },
}

impl HttpConfig {
    /// Create new configuration with base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: DEFAULT_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
            auth: AuthMethod::None,
            headers: HashMap::new(),
            user_agent: format!("uwbtrack/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the endpoint path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set bearer token authentication
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = AuthMethod::Bearer(token.into());
        self
    }

    /// Set basic authentication
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Basic {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Set API key authentication
    pub fn api_key(mut self, header: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth = AuthMethod::ApiKey {
            header: header.into(),
            value: value.into(),
        };
        self
    }

    /// Set request timeout in milliseconds
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }

    /// Add custom header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Full endpoint URL
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.path.starts_with('/') {
            format!("{}{}", base, self.path)
        } else {
            format!("{}/{}", base, self.path)
        }
    }
}

/// Telemetry sink posting frames with the blocking ureq client
pub struct HttpSink {
    config: HttpConfig,
    url: String,
    agent: ureq::Agent,
    stats: ConnectionStats,
}

impl HttpSink {
    /// Create new HTTP sink
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(HttpError::Config("Base URL must start with http:// or https://".into()));
        }
        if config.timeout.is_zero() {
            return Err(HttpError::Config("timeout must be positive".into()));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build();

        Ok(Self {
            url: config.url(),
            config,
            agent,
            stats: ConnectionStats::default(),
        })
    }

    /// Endpoint frames are posted to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Delivery statistics
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Request with authentication and headers applied
    fn build_request(&self) -> ureq::Request {
        let mut request = self.agent.post(&self.url);

        match &self.config.auth {
            AuthMethod::None => {}
            AuthMethod::Bearer(token) => {
                request = request.set("Authorization", &format!("Bearer {}", token));
            }
            AuthMethod::Basic { username, password } => {
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                request = request.set("Authorization", &format!("Basic {}", credentials));
            }
            AuthMethod::ApiKey { header, value } => {
                request = request.set(header, value);
            }
        }

        for (name, value) in &self.config.headers {
            request = request.set(name, value);
        }

        request.set("Content-Type", "application/json")
    }

    /// Post one JSON body, single attempt
    fn post(&mut self, body: &str) -> Result<(), HttpError> {
        match self.build_request().send_string(body) {
            Ok(_) => {
                self.stats.record_sent(body.len());
                Ok(())
            }
            Err(ureq::Error::Status(status, response)) => {
                let err = HttpError::ServerError {
                    status,
                    message: response.into_string().unwrap_or_default(),
                };
                self.stats.record_failure(&err);
                Err(err)
            }
            Err(ureq::Error::Transport(transport)) => {
                let err = HttpError::Request(transport.to_string());
                self.stats.record_failure(&err);
                Err(err)
            }
        }
    }
}

impl<const N: usize> TelemetrySink<N> for HttpSink {
    type Error = HttpError;

    fn send(&mut self, frame: &TelemetryFrame<N>) -> Result<(), Self::Error> {
        let body =
            serde_json::to_string(frame).map_err(|e| HttpError::Serialization(e.to_string()))?;
        self.post(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use uwbtrack_core::EstimatorState;

    fn frame() -> TelemetryFrame<4> {
        TelemetryFrame {
            timestamp: 200,
            state: EstimatorState { x: 0.5, y: 2.25, vx: 0.0, vy: 0.0 },
            distances: [Some(2.0), None, Some(4.5), Some(4.75)],
        }
    }

    /// Accepts one request, answers with `status`, returns the raw request
    fn serve_once(status: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request = String::new();
            let mut content_length = 0;

            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }

            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();
            request.push_str(&String::from_utf8(body).unwrap());

            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            )
            .unwrap();
            request
        });

        (url, handle)
    }

    fn body_of(request: &str) -> serde_json::Value {
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_config_builder() {
        let config = HttpConfig::new("http://10.0.0.2:5000/")
            .bearer_token("test-token")
            .timeout_ms(250)
            .header("X-Tag", "07");

        assert_eq!(config.url(), "http://10.0.0.2:5000/log");
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(config.headers.contains_key("X-Tag"));
        assert_eq!(config.auth, AuthMethod::Bearer("test-token".into()));

        assert_eq!(config.path("track").url(), "http://10.0.0.2:5000/track");
    }

    #[test]
    fn test_url_validation() {
        assert!(HttpSink::new(HttpConfig::new("not-a-url")).is_err());
        assert!(HttpSink::new(HttpConfig::new("https://valid.url").timeout_ms(0)).is_err());
        assert!(HttpSink::new(HttpConfig::new("https://valid.url")).is_ok());
    }

    #[test]
    fn posts_frame_as_flat_json() {
        let (url, server) = serve_once("200 OK");
        let mut sink = HttpSink::new(HttpConfig::new(url).bearer_token("tag-07")).unwrap();

        sink.send(&frame()).unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("POST /log HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer tag-07"));

        let body = body_of(&request);
        assert_eq!(body["x"], 0.5);
        assert_eq!(body["y"], 2.25);
        assert_eq!(body["dist0"], 2.0);
        assert!(body["dist1"].is_null());
        assert_eq!(body["dist3"], 4.75);
        assert!(body.get("timestamp").is_none());

        assert_eq!(sink.stats().messages_sent, 1);
        assert!(sink.stats().bytes_sent > 0);
    }

    #[test]
    fn basic_and_api_key_auth() {
        let (url, server) = serve_once("200 OK");
        let mut sink = HttpSink::new(HttpConfig::new(url).basic_auth("tag", "secret")).unwrap();
        sink.send(&frame()).unwrap();
        // base64("tag:secret")
        assert!(server.join().unwrap().contains("Basic dGFnOnNlY3JldA=="));

        let (url, server) = serve_once("200 OK");
        let mut sink = HttpSink::new(HttpConfig::new(url).api_key("X-Api-Key", "k1")).unwrap();
        sink.send(&frame()).unwrap();
        assert!(server.join().unwrap().to_ascii_lowercase().contains("x-api-key: k1"));
    }

    #[test]
    fn server_error_is_reported_once() {
        let (url, server) = serve_once("500 Internal Server Error");
        let mut sink = HttpSink::new(HttpConfig::new(url)).unwrap();

        let result = sink.send(&frame());
        server.join().unwrap();

        assert!(matches!(result, Err(HttpError::ServerError { status: 500, .. })));
        assert_eq!(sink.stats().messages_failed, 1);
        assert_eq!(sink.stats().messages_sent, 0);
    }

    #[test]
    fn unreachable_server_fails_without_retry() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let mut sink = HttpSink::new(HttpConfig::new(url)).unwrap();
        let result = sink.send(&frame());

        assert!(matches!(result, Err(HttpError::Request(_))));
        assert_eq!(sink.stats().messages_failed, 1);
        assert!(sink.stats().last_error.is_some());
    }
}
