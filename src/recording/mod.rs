//! Recording control for the sentry
//!
//! - `state`: debounced start/stop decisions
//! - `sink`: the recording/encoding collaborator interface
//! - `mp4`: local H.264/MP4 archive sink (feature `recording`)
//!
//! # Example
//! ```rust,ignore
//! use sentrycam::recording::{RecordingStateMachine, Transition};
//!
//! let mut sm = RecordingStateMachine::new(10_000);
//! if let Some(Transition::Started(session)) = sm.observe(faces.len(), now_ms) {
//!     // notify the remote endpoint
//! }
//! ```

mod sink;
mod state;

#[cfg(feature = "recording")]
mod mp4;

pub use sink::{RecordingSink, StreamSettings};
pub use state::{RecordingState, RecordingStateMachine, SessionSnapshot, Transition};

#[cfg(feature = "recording")]
pub use mp4::{H264Encoder, Mp4Sink};
