//! Debounced recording state
//!
//! Recording starts on the first frame with a face and stops only after the
//! quiet timeout has elapsed with no faces, so short detection gaps never
//! flap the remote recorder.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current state of the remote recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Active,
}

/// Immutable view of a session handed to side-effect tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Correlates log lines of one recording
    pub session_id: Uuid,
    /// Loop time the session started, ms
    pub started_at_ms: u64,
    /// Loop time a face was last seen, ms
    pub last_face_seen_at_ms: u64,
    /// Loop time of the transition, ms
    pub at_ms: u64,
}

/// A state change and the session it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started(SessionSnapshot),
    Stopped(SessionSnapshot),
}

impl Transition {
    pub fn snapshot(&self) -> &SessionSnapshot {
        match self {
            Transition::Started(s) | Transition::Stopped(s) => s,
        }
    }
}

/// Single owner of the recording status and last-face timestamp.
///
/// Callers feed one observation per frame and dispatch the returned
/// transition's side effects themselves.
#[derive(Debug)]
pub struct RecordingStateMachine {
    state: RecordingState,
    quiet_timeout_ms: u64,
    last_face_seen_at_ms: u64,
    session_id: Uuid,
    started_at_ms: u64,
    sessions: u64,
}

impl RecordingStateMachine {
    pub fn new(quiet_timeout_ms: u64) -> Self {
        Self {
            state: RecordingState::Idle,
            quiet_timeout_ms,
            last_face_seen_at_ms: 0,
            session_id: Uuid::nil(),
            started_at_ms: 0,
            sessions: 0,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == RecordingState::Active
    }

    pub fn last_face_seen_at_ms(&self) -> u64 {
        self.last_face_seen_at_ms
    }

    pub fn quiet_timeout_ms(&self) -> u64 {
        self.quiet_timeout_ms
    }

    /// Sessions started since construction
    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    /// Record one frame's detection count at loop time `now_ms`.
    pub fn observe(&mut self, face_count: usize, now_ms: u64) -> Option<Transition> {
        if face_count > 0 {
            self.last_face_seen_at_ms = now_ms;

            if self.state == RecordingState::Idle {
                self.state = RecordingState::Active;
                self.session_id = Uuid::new_v4();
                self.started_at_ms = now_ms;
                self.sessions += 1;
                log::info!(
                    "Recording session {} started at {} ms ({} face(s))",
                    self.session_id,
                    now_ms,
                    face_count
                );
                return Some(Transition::Started(self.snapshot(now_ms)));
            }
            return None;
        }

        if self.state == RecordingState::Active {
            let quiet = now_ms.saturating_sub(self.last_face_seen_at_ms);
            if quiet > self.quiet_timeout_ms {
                self.state = RecordingState::Idle;
                log::info!(
                    "Recording session {} stopped after {} ms without faces",
                    self.session_id,
                    quiet
                );
                return Some(Transition::Stopped(self.snapshot(now_ms)));
            }
        }

        None
    }

    fn snapshot(&self, at_ms: u64) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            started_at_ms: self.started_at_ms,
            last_face_seen_at_ms: self.last_face_seen_at_ms,
            at_ms,
        }
    }
}
