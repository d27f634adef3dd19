//! Per-test client registry
//!
//! Maps each test identity to exactly one [`Client`]. Concurrent first
//! requests for the same identity build a single recorder; later lookups
//! take the shard read lock only.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use tracing::{debug, info};

use crate::config::{Config, Mode};
use crate::matcher::{BodyMatcher, Matcher};
use crate::recorder::Recorder;
use crate::transport::{
    header_pairs, read_body, HttpClient, Request, Response, RoundTrip, Transport,
};
use crate::{Result, TapedeckError};

/// HTTP client bound to one test identity
///
/// Every request goes through the identity's recorder.
pub struct Client {
    recorder: Recorder,
    max_request_size: usize,
}

impl Client {
    /// Test identity this client serves
    #[must_use]
    pub fn identity(&self) -> &str {
        self.recorder.name()
    }

    /// Effective mode of the underlying recorder
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.recorder.mode()
    }

    /// Underlying recorder
    #[must_use]
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Execute a buffered request
    ///
    /// # Errors
    ///
    /// Returns error if replay has no match, the live call fails, or the
    /// client was closed
    pub async fn execute(&self, request: &Request) -> Result<Response> {
        self.recorder.handle(request).await
    }

    /// Send an `http::Request`, draining its body first
    ///
    /// The drained bytes are used for matching and recording, and the live
    /// call still receives the complete body.
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be read or exceeds the request size
    /// limit, if a header value is not UTF-8, or if [`execute`](Self::execute)
    /// fails
    pub async fn send<B>(&self, request: hyper::Request<B>) -> Result<hyper::Response<Full<Bytes>>>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = request.into_parts();
        let body = read_body(body, self.max_request_size).await?;

        let request = Request {
            method: parts.method.to_string(),
            url: parts.uri.to_string(),
            headers: header_pairs(&parts.headers)?,
            body,
        };

        let response = self.execute(&request).await?;
        into_http_response(response)
    }
}

impl Transport for Client {
    fn round_trip<'a>(&'a self, request: &'a Request) -> RoundTrip<'a> {
        Box::pin(self.execute(request))
    }
}

fn into_http_response(response: Response) -> Result<hyper::Response<Full<Bytes>>> {
    let mut builder = hyper::Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }

    builder
        .body(Full::new(response.body))
        .map_err(|e| TapedeckError::Transport(format!("Failed to build response: {e}")))
}

/// Registry of per-test clients
pub struct ClientRegistry {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    matcher: Arc<dyn Matcher>,
    clients: DashMap<String, Arc<Client>>,
    stores_opened: AtomicUsize,
}

impl ClientRegistry {
    /// Create a registry that goes live through [`HttpClient`]
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: Config) -> Result<Self> {
        Self::with_transport(config, Arc::new(HttpClient::new()))
    }

    /// Create a registry with a custom live transport
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            transport,
            matcher: Arc::new(BodyMatcher),
            clients: DashMap::new(),
            stores_opened: AtomicUsize::new(0),
        })
    }

    /// Replace the matcher used by clients opened from now on
    #[must_use]
    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Arc::new(matcher);
        self
    }

    /// Registry configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the client for a test identity, creating it on first use
    ///
    /// Concurrent first calls for the same identity all receive the same
    /// client and only one fixture store is opened.
    ///
    /// # Errors
    ///
    /// Returns [`TapedeckError::RecorderInit`] if the recorder cannot be opened
    pub fn get_client(&self, identity: &str) -> Result<Arc<Client>> {
        if let Some(client) = self.clients.get(identity) {
            return Ok(Arc::clone(&client));
        }

        // Exclusive shard lock; re-check before building
        match self.clients.entry(identity.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let client = Arc::new(
                    self.open_client(identity)
                        .map_err(|e| TapedeckError::recorder_init(identity, e))?,
                );
                entry.insert(Arc::clone(&client));
                Ok(client)
            }
        }
    }

    fn open_client(&self, identity: &str) -> Result<Client> {
        let recorder = Recorder::open(
            identity,
            &self.config,
            Arc::clone(&self.transport),
            Arc::clone(&self.matcher),
        )?;
        self.stores_opened.fetch_add(1, Ordering::Relaxed);

        info!(
            "Opened client for '{}' in {:?} mode ({})",
            identity,
            recorder.mode(),
            recorder.fixture_path().display()
        );

        Ok(Client {
            recorder,
            max_request_size: self.config.limits.max_request_size,
        })
    }

    /// Close the client for a test identity
    ///
    /// Passing tests persist their recording; failing tests discard it and
    /// leave the existing fixture untouched. Closing an unknown or already
    /// closed identity is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TapedeckError::Persist`] if the fixture cannot be written
    pub async fn close_client(&self, identity: &str, test_failed: bool) -> Result<()> {
        // Removal first, so teardown runs at most once per client
        let Some((_, client)) = self.clients.remove(identity) else {
            debug!("No active client for '{identity}'");
            return Ok(());
        };

        if test_failed {
            client.recorder().discard().await;
            info!("Closed client for '{identity}' without saving (test failed)");
            return Ok(());
        }

        client
            .recorder()
            .stop()
            .await
            .map_err(|e| TapedeckError::persist(identity, e))?;
        info!("Closed client for '{identity}'");

        Ok(())
    }

    /// Run a test body with its client and close it afterwards
    ///
    /// The body's error marks the test as failed. The body's result wins
    /// over a close failure.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or the close error if the body succeeded
    pub async fn with_client<F, Fut, T>(&self, identity: &str, body: F) -> Result<T>
    where
        F: FnOnce(Arc<Client>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.get_client(identity)?;
        let result = body(client).await;
        let closed = self.close_client(identity, result.is_err()).await;

        let value = result?;
        closed?;
        Ok(value)
    }

    /// Number of clients currently registered
    #[must_use]
    pub fn active_clients(&self) -> usize {
        self.clients.len()
    }

    /// Total number of fixture stores opened by this registry
    #[must_use]
    pub fn stores_opened(&self) -> usize {
        self.stores_opened.load(Ordering::Relaxed)
    }
}
