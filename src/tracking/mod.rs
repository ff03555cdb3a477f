//! Request classification for metrics

pub mod classifier;
pub mod env;
pub mod fingerprint;

pub use classifier::{is_background_path, RequestClassifier, RequestOutcome};
pub use env::{RequestEnv, ResponseFacts, TrackViewOverride, TRACK_VIEW_HEADER};
pub use fingerprint::{ClientFingerprint, UserAgentFingerprint};
