//! Tapedeck - per-test HTTP record/replay clients
//!
//! A [`ClientRegistry`] hands every test identity its own [`Client`]. In
//! record mode the client goes live and captures each exchange into a
//! fixture file; in replay mode it answers from that fixture without any
//! network traffic.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod cassette;
pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod recorder;
pub mod redaction;
pub mod registry;
pub mod storage;
pub mod transport;

pub use config::{Config, Mode};
pub use error::{Result, TapedeckError};
pub use matcher::{BodyMatcher, DefaultMatcher, Matcher};
pub use registry::{Client, ClientRegistry};
pub use transport::{HttpClient, Request, Response, Transport};
