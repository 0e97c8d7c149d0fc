//! Session manager - one processor per session, no shared mutable analysis
//!
//! The manager owns the session map and the finished-session history. Each
//! session sits behind its own mutex so at most one frame is in flight per
//! session, while different sessions proceed independently.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use forma_core::{FormaError, FormaResult, LandmarkFrame, SessionId, SessionIdAllocator};
use forma_motion::{
    FeedbackKind, FrameReport, Mode, Phase, ProfileTable, RepCounters, SessionProcessor,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::RuntimeConfig;

/// Read-only view of a live session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub mode: Mode,
    pub phase: Phase,
    pub counters: RepCounters,
    pub feedback: Vec<FeedbackKind>,
}

/// Record of a finished session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub mode: Mode,
    pub correct: u32,
    pub incorrect: u32,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    /// Span between the first and last frame timestamps
    pub duration: Duration,
    pub discarded_rep: bool,
}

impl SessionSummary {
    pub fn total(&self) -> u32 {
        self.correct.saturating_add(self.incorrect)
    }
}

struct ActiveSession {
    mode: Mode,
    processor: SessionProcessor,
    last_activity: Instant,
}

/// Registry of live sessions
pub struct SessionManager {
    profiles: Arc<ProfileTable>,
    default_mode: Mode,
    max_sessions: usize,
    history_capacity: usize,
    keep_empty_sessions: bool,
    idle_timeout: Duration,
    ids: SessionIdAllocator,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<ActiveSession>>>>,
    history: Mutex<VecDeque<SessionSummary>>,
}

impl SessionManager {
    /// Manager with built-in profiles and default limits
    pub fn new() -> Self {
        Self::with_profiles(&RuntimeConfig::default(), Arc::new(ProfileTable::builtin()))
    }

    /// Manager configured from `config`, including its profile overrides
    pub fn from_config(config: &RuntimeConfig) -> FormaResult<Self> {
        config.validate()?;
        let profiles = Arc::new(config.profile_table()?);
        Ok(Self::with_profiles(config, profiles))
    }

    pub fn with_profiles(config: &RuntimeConfig, profiles: Arc<ProfileTable>) -> Self {
        SessionManager {
            profiles,
            default_mode: config.default_mode,
            max_sessions: config.max_sessions,
            history_capacity: config.history_capacity,
            keep_empty_sessions: config.keep_empty_sessions,
            idle_timeout: config.idle_timeout,
            ids: SessionIdAllocator::new(),
            sessions: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Open a session.
    ///
    /// `mode` falls back to the configured default; an unknown name fails
    /// and no session is created.
    pub fn open(&self, mode: Option<&str>) -> FormaResult<SessionId> {
        let mode = match mode {
            Some(name) => name.parse::<Mode>()?,
            None => self.default_mode,
        };

        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(FormaError::SessionLimitReached(sessions.len()));
        }

        let id = self.ids.allocate();
        let processor = SessionProcessor::new(id, self.profiles.get(mode));
        sessions.insert(
            id,
            Arc::new(Mutex::new(ActiveSession {
                mode,
                processor,
                last_activity: Instant::now(),
            })),
        );
        info!(session = %id, %mode, "session opened");
        Ok(id)
    }

    fn session(&self, id: SessionId) -> FormaResult<Arc<Mutex<ActiveSession>>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(FormaError::SessionNotFound(id))
    }

    /// Feed one landmark frame to a session
    pub fn process(&self, id: SessionId, frame: &LandmarkFrame) -> FormaResult<FrameReport> {
        let session = self.session(id)?;
        let mut session = session.lock();
        session.last_activity = Instant::now();
        Ok(session.processor.process(frame))
    }

    /// Current phase, counters and warnings of a live session
    pub fn snapshot(&self, id: SessionId) -> FormaResult<SessionSnapshot> {
        let session = self.session(id)?;
        let session = session.lock();
        Ok(SessionSnapshot {
            id,
            mode: session.mode,
            phase: session.processor.phase(),
            counters: session.processor.counters(),
            feedback: session.processor.active_feedback(),
        })
    }

    /// Close a session, discarding any rep in progress, and record it
    pub fn close(&self, id: SessionId) -> FormaResult<SessionSummary> {
        let session = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(FormaError::SessionNotFound(id))?;

        let mut session = session.lock();
        let end = session.processor.finish();
        let duration = match (end.stats.first_frame, end.stats.last_frame) {
            (Some(first), Some(last)) => last - first,
            _ => Duration::ZERO,
        };
        let summary = SessionSummary {
            id,
            mode: session.mode,
            correct: end.counters.correct,
            incorrect: end.counters.incorrect,
            frames_processed: end.stats.processed,
            frames_skipped: end.stats.skipped,
            duration,
            discarded_rep: end.discarded_rep,
        };
        self.record(summary.clone());
        Ok(summary)
    }

    fn record(&self, summary: SessionSummary) {
        if self.history_capacity == 0 || (summary.total() == 0 && !self.keep_empty_sessions) {
            debug!(id = %summary.id, "not keeping session summary");
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= self.history_capacity {
            history.pop_back();
        }
        history.push_front(summary);
    }

    /// Close every session idle for longer than the configured timeout
    pub fn reap_idle(&self, now: Instant) -> Vec<SessionSummary> {
        let idle: Vec<SessionId> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.lock().last_activity) > self.idle_timeout)
            .map(|(id, _)| *id)
            .collect();

        idle.into_iter()
            .filter_map(|id| {
                info!(session = %id, "closing idle session");
                self.close(id).ok()
            })
            .collect()
    }

    /// Finished sessions, newest first
    pub fn history(&self) -> Vec<SessionSummary> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
