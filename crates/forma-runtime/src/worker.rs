//! Session workers
//!
//! One task per session: frames in, reports out, strictly in order. The
//! detector is shared between all workers; analysis state is not.

use std::sync::Arc;
use std::time::{Duration, Instant};

use forma_core::{FormaError, FormaResult, LandmarkFrame, SessionId};
use forma_motion::FrameReport;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{PoseDetector, RawFrame, SessionManager, SessionSummary};

/// Client side of a running session worker
pub struct SessionHandle {
    id: SessionId,
    frames: mpsc::Sender<RawFrame>,
    reports: mpsc::Receiver<FrameReport>,
    join: JoinHandle<FormaResult<SessionSummary>>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a frame, waiting while the worker is saturated
    pub async fn send(&self, frame: RawFrame) -> FormaResult<()> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| FormaError::SessionClosed(self.id))
    }

    /// Next report, `None` once the worker has stopped
    pub async fn next_report(&mut self) -> Option<FrameReport> {
        self.reports.recv().await
    }

    /// Stop accepting frames, drain what is in flight and close the session
    pub async fn finish(self) -> FormaResult<(Vec<FrameReport>, SessionSummary)> {
        let SessionHandle {
            id,
            frames,
            mut reports,
            join,
        } = self;
        drop(frames);

        let mut pending = Vec::new();
        while let Some(report) = reports.recv().await {
            pending.push(report);
        }
        let summary = join.await.map_err(|_| FormaError::SessionClosed(id))??;
        Ok((pending, summary))
    }
}

/// Open a session on `manager` and start a worker task for it
pub fn spawn_session(
    manager: Arc<SessionManager>,
    detector: Arc<dyn PoseDetector>,
    mode: Option<&str>,
    channel_capacity: usize,
) -> FormaResult<SessionHandle> {
    let id = manager.open(mode)?;
    let capacity = channel_capacity.max(1);
    let (frame_tx, mut frame_rx) = mpsc::channel::<RawFrame>(capacity);
    let (report_tx, report_rx) = mpsc::channel::<FrameReport>(capacity);

    let join = tokio::spawn(async move {
        while let Some(raw) = frame_rx.recv().await {
            let landmarks = match detector.detect(&raw) {
                Ok(landmarks) => landmarks,
                Err(e) => {
                    warn!(session = %id, error = %e, "pose detection failed");
                    LandmarkFrame::empty(raw.timestamp)
                }
            };

            let report = match manager.process(id, &landmarks) {
                Ok(report) => report,
                Err(e) => {
                    // Reaped or closed from elsewhere
                    debug!(session = %id, error = %e, "session gone, stopping worker");
                    return Err(e);
                }
            };
            if report_tx.send(report).await.is_err() {
                break; // Client dropped
            }
        }
        manager.close(id)
    });

    Ok(SessionHandle {
        id,
        frames: frame_tx,
        reports: report_rx,
        join,
    })
}

/// Periodically close sessions that stopped receiving frames
pub fn spawn_reaper(manager: Arc<SessionManager>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let reaped = manager.reap_idle(Instant::now());
            if !reaped.is_empty() {
                debug!(count = reaped.len(), "reaped idle sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;
    use forma_core::FrameTime;
    use forma_motion::Phase;

    fn failing_detector() -> Arc<dyn PoseDetector> {
        Arc::new(|frame: &RawFrame| {
            if frame.data.is_empty() {
                Err(FormaError::Detector("no image".into()))
            } else {
                Ok(LandmarkFrame::empty(frame.timestamp))
            }
        })
    }

    #[tokio::test]
    async fn test_worker_reports_in_order() {
        let manager = Arc::new(SessionManager::new());
        let mut handle = spawn_session(manager.clone(), failing_detector(), None, 4).unwrap();

        for i in 0..3 {
            handle
                .send(RawFrame::new(FrameTime::from_millis(i * 33), 0, 0, vec![1]))
                .await
                .unwrap();
            let report = handle.next_report().await.unwrap();
            assert_eq!(report.timestamp, FrameTime::from_millis(i * 33));
            assert!(report.outcome.is_skipped());
            assert_eq!(report.phase, Phase::Standing);
        }

        let (pending, summary) = handle.finish().await.unwrap();
        assert!(pending.is_empty());
        assert_eq!(summary.frames_skipped, 3);
        assert_eq!(manager.active_count(), 0);
        assert!(manager.history().is_empty());
    }

    #[tokio::test]
    async fn test_detector_failure_skips_frame() {
        let manager = Arc::new(SessionManager::new());
        let mut handle = spawn_session(manager, failing_detector(), Some("pro"), 1).unwrap();

        handle.send(RawFrame::default()).await.unwrap();
        let report = handle.next_report().await.unwrap();
        assert!(report.outcome.is_skipped());
        assert_eq!(report.count(), 0);

        let (_, summary) = handle.finish().await.unwrap();
        assert_eq!(summary.frames_skipped, 1);
    }

    #[tokio::test]
    async fn test_finish_drains_pending_reports() {
        let manager = Arc::new(SessionManager::new());
        let handle = spawn_session(manager, failing_detector(), None, 8).unwrap();
        for i in 0..5 {
            handle
                .send(RawFrame::new(FrameTime::from_millis(i), 0, 0, vec![1]))
                .await
                .unwrap();
        }

        let (pending, summary) = handle.finish().await.unwrap();
        assert_eq!(pending.len(), 5);
        assert_eq!(summary.frames_skipped, 5);
    }

    #[tokio::test]
    async fn test_unknown_mode_spawns_nothing() {
        let manager = Arc::new(SessionManager::new());
        let result = spawn_session(manager.clone(), failing_detector(), Some("elite"), 4);
        assert!(matches!(result, Err(FormaError::UnknownMode(_))));
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_reaper_closes_idle_sessions() {
        let mut config = RuntimeConfig::default();
        config.idle_timeout = Duration::from_millis(20);
        config.keep_empty_sessions = true;
        let manager = Arc::new(SessionManager::from_config(&config).unwrap());
        manager.open(None).unwrap();

        let reaper = spawn_reaper(manager.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(200)).await;
        reaper.abort();

        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.history().len(), 1);
    }
}
