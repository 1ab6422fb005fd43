//! Synheart Wayfind - On-device navigation pattern recognition
//!
//! Wayfind learns a user's browsing habits from a stream of navigation events
//! and predicts where they are likely to go next. Everything is online and
//! in-memory: normalization → history → transition model and temporal store
//! → pattern detectors → pattern database, with a prediction engine reading
//! the learned state and a performance governor bounding the cost per event.
//!
//! ## Modules
//!
//! - **Learning**: `normalizer`, `history`, `transition`, `temporal`, `detectors`, `patterns`
//! - **Serving**: `predictor`, `pipeline` (the `PatternRecognizer` entry point)
//! - **Operations**: `governor`, `snapshot`, `adapter`, `ffi`

pub mod adapter;
pub mod config;
pub mod detectors;
pub mod error;
pub mod governor;
pub mod history;
pub mod normalizer;
pub mod patterns;
pub mod pipeline;
pub mod predictor;
pub mod snapshot;
pub mod temporal;
pub mod transition;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use adapter::EventAdapter;
pub use config::RecognizerConfig;
pub use error::WayfindError;
pub use pipeline::{replay_events, PatternRecognizer, SharedRecognizer};
pub use snapshot::{ModelSnapshot, SNAPSHOT_VERSION};
pub use types::{
    BrowsingPattern, NavigationEvent, NavigationEventType, PatternPrediction, PatternType,
    PerformanceMetrics, PredictionContext, PredictionType,
};

/// Wayfind version embedded in exported snapshots and CLI output
pub const WAYFIND_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "synheart-wayfind";
