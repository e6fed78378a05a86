//! sentrycam: face-tracking camera sentry
//!
//! Captures frames, detects faces, steers a two-axis servo gimbal toward them
//! and drives a debounced remote recording session with operator mail.
//!
//! # Features
//! - Busy-wait servo pulse trains over Raspberry Pi GPIO
//! - Dead-zone tracking policy with per-axis position state
//! - Debounced recording state machine with fire-and-forget notifications
//! - Periodic microphone sampling alongside the frame loop
//! - Local H.264/MP4 archive recording
//!
//! Hardware backends sit behind cargo features (`camera`, `audio`,
//! `recording`, `opencv`, `gpio`); everything else runs offline against the
//! doubles in [`testing`].
//!
//! # Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use sentrycam::{CaptureOrchestrator, SentryConfig};
//!
//! let config = SentryConfig::load_from_file("sentrycam.toml")?;
//! config.validate()?;
//! let stats = CaptureOrchestrator::new(config, source, detector, gimbal, sink, pool)
//!     .with_audio_source(open_microphone)
//!     .run();
//! ```
pub mod audio;
pub mod capture;
pub mod config;
pub mod detect;
pub mod errors;
pub mod gimbal;
pub mod notify;
pub mod orchestrator;
pub mod overlay;
pub mod recording;
pub mod timing;
pub mod tracking;

// Testing utilities - collaborator doubles for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::SentryConfig;
pub use errors::{Result, SentryError};
pub use orchestrator::{CaptureOrchestrator, LoopEnd, LoopStats, ShutdownHandle};
pub use tracking::{FaceBox, TrackingDecision, TrackingPolicy};

/// Initialize logging, defaulting to `sentrycam=info`
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "sentrycam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
