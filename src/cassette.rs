//! In-memory form of a fixture

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::codec::{decode_request, decode_response, encode_request, encode_response};
use crate::fingerprint::{fingerprint_request, fixture_id, short_hex};
use crate::matcher::Matcher;
use crate::storage::{FixtureReader, FixtureWriter};
use crate::transport::{Request, Response};
use crate::{Result, TapedeckError};

/// One recorded request/response exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    /// Request as persisted (credentials removed)
    pub request: Request,
    /// Response as persisted
    pub response: Response,
    /// Recording timestamp (Unix epoch nanoseconds)
    pub recorded_at: u64,
}

/// Ordered interactions for one test identity
#[derive(Debug)]
pub struct Cassette {
    name: String,
    path: PathBuf,
    interactions: Vec<Interaction>,
    replayed: Vec<bool>,
    loaded: usize,
    max_interactions: usize,
}

impl Cassette {
    /// Create an empty cassette
    #[must_use]
    pub fn new(name: &str, path: &Path, max_interactions: usize) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            interactions: Vec::new(),
            replayed: Vec::new(),
            loaded: 0,
            max_interactions,
        }
    }

    /// Load a cassette from its fixture file
    ///
    /// # Errors
    ///
    /// Returns error if the fixture is missing, corrupted, or a stored request
    /// does not match its indexed fingerprint
    pub fn load(name: &str, path: &Path, max_interactions: usize) -> Result<Self> {
        let reader = FixtureReader::open(path)?;
        let mut cassette = Self::new(name, path, max_interactions);

        for entry in reader.entries_iter() {
            let request = decode_request(reader.read_request(&entry)?)?;
            let response = decode_response(reader.read_response(&entry)?)?;

            if fingerprint_request(&request) != entry.request_hash {
                return Err(TapedeckError::InvalidFormat(format!(
                    "Fingerprint mismatch for {} {} in {}",
                    request.method,
                    request.url,
                    path.display()
                )));
            }

            cassette.interactions.push(Interaction {
                request,
                response,
                recorded_at: entry.recorded_at,
            });
            cassette.replayed.push(false);
        }

        cassette.loaded = cassette.interactions.len();
        debug!(
            "Loaded fixture '{}': {} interactions",
            name, cassette.loaded
        );

        Ok(cassette)
    }

    /// Test identity this cassette belongs to
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixture file location
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of interactions
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Check whether the cassette holds no interactions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Interactions added since the cassette was loaded or created
    #[must_use]
    pub fn new_interaction_count(&self) -> usize {
        self.interactions.len() - self.loaded
    }

    /// All interactions in recording order
    #[must_use]
    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Append a newly recorded interaction
    ///
    /// # Errors
    ///
    /// Returns error if the cassette is full
    pub fn add(&mut self, interaction: Interaction) -> Result<()> {
        if self.interactions.len() >= self.max_interactions {
            return Err(TapedeckError::DataTooLarge {
                size: self.interactions.len() + 1,
                limit: self.max_interactions,
            });
        }

        self.interactions.push(interaction);
        self.replayed.push(false);
        Ok(())
    }

    /// Claim the first not-yet-replayed interaction the matcher accepts
    ///
    /// Each interaction is served once, so repeated identical requests
    /// receive their recorded responses in order.
    pub fn claim(&mut self, request: &Request, matcher: &dyn Matcher) -> Option<&Interaction> {
        let index = self
            .interactions
            .iter()
            .zip(&self.replayed)
            .position(|(interaction, replayed)| {
                !replayed && matcher.matches(request, &interaction.request)
            })?;

        self.replayed[index] = true;
        Some(&self.interactions[index])
    }

    /// Number of interactions not replayed yet
    #[must_use]
    pub fn unreplayed_count(&self) -> usize {
        self.replayed.iter().filter(|replayed| !**replayed).count()
    }

    /// Drop interactions added since load
    pub fn discard_new(&mut self) {
        self.interactions.truncate(self.loaded);
        self.replayed.truncate(self.loaded);
    }

    /// Write every interaction to the fixture file
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer =
            FixtureWriter::create(&self.path, fixture_id(&self.name), self.interactions.len())?;

        for interaction in &self.interactions {
            let request_hash = fingerprint_request(&interaction.request);
            writer.append_interaction(
                request_hash,
                &encode_request(&interaction.request)?,
                &encode_response(&interaction.response)?,
                interaction.recorded_at,
            )?;
            debug!(
                "Persisting {} {} ({})",
                interaction.request.method,
                interaction.request.url,
                short_hex(&request_hash)
            );
        }

        writer.finalize()
    }
}
