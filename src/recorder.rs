//! Record/replay transport for one test identity

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cassette::{Cassette, Interaction};
use crate::config::{Config, LimitsConfig, Mode};
use crate::fingerprint::{fingerprint_request, short_hex};
use crate::matcher::Matcher;
use crate::redaction::Redactor;
use crate::storage::{fixture_path, now_nanos};
use crate::transport::{Request, Response, RoundTrip, Transport};
use crate::{Result, TapedeckError};

/// Serves requests from a cassette or records live traffic into it
pub struct Recorder {
    name: String,
    mode: Mode,
    path: PathBuf,
    cassette: Mutex<Cassette>,
    real: Arc<dyn Transport>,
    matcher: Arc<dyn Matcher>,
    redactor: Redactor,
    limits: LimitsConfig,
    stopped: AtomicBool,
}

impl Recorder {
    /// Open the recorder for a test identity
    ///
    /// Replay loads the existing fixture; Record makes sure the fixtures
    /// directory can be created.
    ///
    /// # Errors
    ///
    /// Returns error if the identity is invalid, the fixture is missing or
    /// corrupted in replay mode, or the fixtures directory cannot be created
    pub fn open(
        name: &str,
        config: &Config,
        real: Arc<dyn Transport>,
        matcher: Arc<dyn Matcher>,
    ) -> Result<Self> {
        let path = fixture_path(&config.fixtures_dir, name)?;
        let mode = config.resolve_mode(path.exists());
        let redactor = Redactor::new(&config.redaction)?;
        let max_interactions = config.limits.max_interactions;

        let cassette = match mode {
            Mode::Replay => Cassette::load(name, &path, max_interactions)?,
            Mode::Record | Mode::RecordOnce => {
                std::fs::create_dir_all(&config.fixtures_dir)?;
                Cassette::new(name, &path, max_interactions)
            }
            Mode::Passthrough => Cassette::new(name, &path, max_interactions),
        };

        debug!(
            "Opened recorder '{}' in {:?} mode ({} interactions)",
            name,
            mode,
            cassette.len()
        );

        Ok(Self {
            name: name.to_string(),
            mode,
            path,
            cassette: Mutex::new(cassette),
            real,
            matcher,
            redactor,
            limits: config.limits.clone(),
            stopped: AtomicBool::new(false),
        })
    }

    /// Test identity
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective mode after resolution
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Fixture file location
    #[must_use]
    pub fn fixture_path(&self) -> &Path {
        &self.path
    }

    /// Check whether the recorder was stopped or discarded
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of interactions currently held
    pub async fn interaction_count(&self) -> usize {
        self.cassette.lock().await.len()
    }

    /// Send a request through the recorder
    ///
    /// # Errors
    ///
    /// Returns error if the recorder is stopped, limits are exceeded, replay
    /// finds no matching interaction, or the live transport fails
    pub async fn handle(&self, request: &Request) -> Result<Response> {
        if self.is_stopped() {
            return Err(TapedeckError::RecorderStopped(self.name.clone()));
        }

        if request.body.len() > self.limits.max_request_size {
            return Err(TapedeckError::DataTooLarge {
                size: request.body.len(),
                limit: self.limits.max_request_size,
            });
        }

        if request.headers.len() > self.limits.max_headers {
            return Err(TapedeckError::Transport(format!(
                "Too many headers: {}",
                request.headers.len()
            )));
        }

        match self.mode {
            Mode::Replay => self.replay(request).await,
            Mode::Record | Mode::RecordOnce => self.record(request).await,
            Mode::Passthrough => self.real.round_trip(request).await,
        }
    }

    async fn replay(&self, request: &Request) -> Result<Response> {
        // Compare in persisted form so removed headers and secrets line up
        let normalized = self.redactor.redact_request(request);

        let mut cassette = self.cassette.lock().await;
        if let Some(interaction) = cassette.claim(&normalized, self.matcher.as_ref()) {
            debug!(
                "Replayed {} {} -> {} ({})",
                normalized.method,
                normalized.url,
                interaction.response.status,
                short_hex(&fingerprint_request(&interaction.request))
            );
            return Ok(interaction.response.clone());
        }

        warn!(
            "No recorded interaction for {} {} in '{}' ({} unreplayed)",
            normalized.method,
            normalized.url,
            self.name,
            cassette.unreplayed_count()
        );
        Err(TapedeckError::InteractionNotFound {
            method: normalized.method,
            url: normalized.url,
        })
    }

    async fn record(&self, request: &Request) -> Result<Response> {
        // Live send gets the original request, body included
        let response = self.real.round_trip(request).await?;

        if response.body.len() > self.limits.max_response_size {
            return Err(TapedeckError::DataTooLarge {
                size: response.body.len(),
                limit: self.limits.max_response_size,
            });
        }

        let interaction = Interaction {
            request: self.redactor.redact_request(request),
            response: self.redactor.redact_response(&response),
            recorded_at: now_nanos(),
        };

        let mut cassette = self.cassette.lock().await;
        if self.is_stopped() {
            warn!(
                "Recorder '{}' stopped during {} {}; interaction not recorded",
                self.name, request.method, interaction.request.url
            );
            return Ok(response);
        }

        debug!(
            "Recorded {} {} -> {} ({})",
            interaction.request.method,
            interaction.request.url,
            interaction.response.status,
            short_hex(&fingerprint_request(&interaction.request))
        );
        cassette.add(interaction)?;

        Ok(response)
    }

    /// Stop the recorder, persisting the fixture in record mode
    ///
    /// A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the fixture cannot be written
    pub async fn stop(&self) -> Result<()> {
        let cassette = self.cassette.lock().await;
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if matches!(self.mode, Mode::Record | Mode::RecordOnce) {
            cassette.save()?;
            info!(
                "Persisted fixture '{}' to {} ({} interactions)",
                self.name,
                self.path.display(),
                cassette.len()
            );
        }

        Ok(())
    }

    /// Stop the recorder without persisting anything
    pub async fn discard(&self) {
        let mut cassette = self.cassette.lock().await;
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let dropped = cassette.new_interaction_count();
        if dropped > 0 {
            warn!(
                "Discarding {} recorded interactions for '{}'; fixture left untouched",
                dropped, self.name
            );
        }
        cassette.discard_new();
    }
}

impl Transport for Recorder {
    fn round_trip<'a>(&'a self, request: &'a Request) -> RoundTrip<'a> {
        Box::pin(self.handle(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::BodyMatcher;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Echoes the request body and counts live calls
    #[derive(Default)]
    struct EchoTransport {
        calls: AtomicUsize,
    }

    impl Transport for EchoTransport {
        fn round_trip<'a>(&'a self, request: &'a Request) -> RoundTrip<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = Response::new(200, request.body.clone());
            Box::pin(async move { Ok(response) })
        }
    }

    fn test_config(dir: &TempDir, mode: Mode) -> Config {
        let mut config = Config::with_fixtures_dir(dir.path());
        config.mode = mode;
        config.replay_only_env = "TAPEDECK_RECORDER_TEST_UNSET_FLAG".to_string();
        config
    }

    fn open(config: &Config, transport: &Arc<EchoTransport>) -> Recorder {
        let real: Arc<dyn Transport> = transport.clone();
        Recorder::open("TestRecorder", config, real, Arc::new(BodyMatcher)).unwrap()
    }

    #[tokio::test]
    async fn test_record_then_replay() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(EchoTransport::default());
        let config = test_config(&dir, Mode::RecordOnce);
        let request = Request::new("POST", "http://localhost/users").with_body("a");

        let recorder = open(&config, &transport);
        assert_eq!(recorder.mode(), Mode::Record);
        let live = recorder.handle(&request).await.unwrap();
        recorder.stop().await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        let recorder = open(&config, &transport);
        assert_eq!(recorder.mode(), Mode::Replay);
        let replayed = recorder.handle(&request).await.unwrap();
        assert_eq!(replayed, live);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replay_missing_fixture() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(EchoTransport::default());
        let config = test_config(&dir, Mode::Replay);
        let real: Arc<dyn Transport> = transport;

        let result = Recorder::open("TestMissing", &config, real, Arc::new(BodyMatcher));
        assert!(matches!(result, Err(TapedeckError::FixtureNotFound(_))));
    }

    #[tokio::test]
    async fn test_replay_miss() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(EchoTransport::default());

        let recorder = open(&test_config(&dir, Mode::Record), &transport);
        recorder.stop().await.unwrap();

        let recorder = open(&test_config(&dir, Mode::Replay), &transport);
        let err = recorder
            .handle(&Request::new("GET", "http://localhost/users"))
            .await
            .unwrap_err();
        assert!(err.is_match_failure());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_passthrough_records_nothing() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(EchoTransport::default());

        let recorder = open(&test_config(&dir, Mode::Passthrough), &transport);
        recorder
            .handle(&Request::new("GET", "http://localhost/"))
            .await
            .unwrap();
        recorder.stop().await.unwrap();

        assert_eq!(recorder.interaction_count().await, 0);
        assert!(!recorder.fixture_path().exists());
    }

    #[tokio::test]
    async fn test_stopped_recorder_rejects_requests() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(EchoTransport::default());

        let recorder = open(&test_config(&dir, Mode::Record), &transport);
        recorder.stop().await.unwrap();
        recorder.stop().await.unwrap();

        let result = recorder.handle(&Request::new("GET", "http://localhost/")).await;
        assert!(matches!(result, Err(TapedeckError::RecorderStopped(_))));
    }

    #[tokio::test]
    async fn test_discard_keeps_fixture_untouched() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(EchoTransport::default());

        let recorder = open(&test_config(&dir, Mode::Record), &transport);
        recorder
            .handle(&Request::new("GET", "http://localhost/"))
            .await
            .unwrap();
        recorder.discard().await;

        assert!(recorder.is_stopped());
        assert!(!recorder.fixture_path().exists());
        assert_eq!(recorder.interaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_request_size_limit() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(EchoTransport::default());
        let mut config = test_config(&dir, Mode::Record);
        config.limits.max_request_size = 4;

        let recorder = open(&config, &transport);
        let result = recorder
            .handle(&Request::new("POST", "http://localhost/").with_body("too large"))
            .await;

        assert!(matches!(result, Err(TapedeckError::DataTooLarge { .. })));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
