//! Capture sessions: a bounded run of frame capture, classification and
//! history append, followed by a write of the mood log.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::classifier::{Classification, EmotionClassifier};
use crate::config::Config;
use crate::device::{CaptureDevice, DeviceError, Frame, FrameStream};
use crate::history::MoodHistory;
use crate::mood::summarize;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("capture session already running")]
    AlreadyRunning,
    #[error(transparent)]
    DeviceUnavailable(DeviceError),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub duration: Duration,
    pub frame_interval: Duration,
    pub mirror: bool,
    pub log_path: PathBuf,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            duration: Duration::from_secs(config.capture.duration_secs),
            frame_interval: Duration::from_millis(config.capture.frame_interval_ms),
            mirror: config.capture.mirror,
            log_path: PathBuf::from(&config.mood_log_path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    Cancelled,
    EndOfStream,
    FrameError,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub device: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub frames: usize,
    pub no_face: usize,
    pub faults: usize,
    pub end_reason: EndReason,
    pub persisted: bool,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    pub current: Option<SessionInfo>,
    pub last: Option<SessionReport>,
}

/// 超过 Instant 可表示范围的时长按约 30 年截断
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

type CancelSlot = Arc<std::sync::Mutex<Option<watch::Sender<bool>>>>;
type CurrentSlot = Arc<std::sync::RwLock<Option<SessionInfo>>>;

/// Releases the session slot when the session ends, including on panic:
/// clears the current session, drops the cancel sender and finally the
/// running flag.
struct RunningGuard {
    running: Arc<AtomicBool>,
    cancel_tx: CancelSlot,
    current: CurrentSlot,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if let Ok(mut current) = self.current.write() {
            current.take();
        }
        if let Ok(mut cancel_tx) = self.cancel_tx.lock() {
            cancel_tx.take();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

fn session_deadline(start: Instant, duration: Duration) -> Instant {
    start
        .checked_add(duration)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

struct PreparedSession {
    guard: RunningGuard,
    stream: Box<dyn FrameStream>,
    cancel: watch::Receiver<bool>,
    info: SessionInfo,
}

#[derive(Debug, Default)]
struct FrameCounts {
    frames: usize,
    no_face: usize,
    faults: usize,
}

/// Owns the process-wide mood state and runs at most one capture session at a
/// time.
pub struct SessionManager {
    device: Arc<dyn CaptureDevice>,
    classifier: Arc<dyn EmotionClassifier>,
    history: Arc<MoodHistory>,
    settings: SessionSettings,
    running: Arc<AtomicBool>,
    cancel_tx: CancelSlot,
    current: CurrentSlot,
    last: RwLock<Option<SessionReport>>,
    task: Mutex<Option<JoinHandle<SessionReport>>>,
}

impl SessionManager {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        classifier: Arc<dyn EmotionClassifier>,
        history: Arc<MoodHistory>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            device,
            classifier,
            history,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            cancel_tx: Arc::new(std::sync::Mutex::new(None)),
            current: Arc::new(std::sync::RwLock::new(None)),
            last: RwLock::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn history(&self) -> &MoodHistory {
        &self.history
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> SessionStatus {
        let current = self.current.read().ok().and_then(|c| c.clone());
        SessionStatus {
            running: self.is_running(),
            current,
            last: self.last.read().await.clone(),
        }
    }

    /// Runs a whole session on the calling task and returns its report.
    pub async fn run_session(&self) -> Result<SessionReport, SessionError> {
        let prepared = self.prepare().await?;
        Ok(self.drive(prepared).await)
    }

    /// Claims the device and runs the capture loop on a background task.
    ///
    /// `AlreadyRunning` and `DeviceUnavailable` are reported here, before the
    /// task is spawned.
    pub async fn start(self: &Arc<Self>) -> Result<SessionInfo, SessionError> {
        let prepared = self.prepare().await?;
        let info = prepared.info.clone();

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move { manager.drive(prepared).await });
        *self.task.lock().await = Some(handle);

        Ok(info)
    }

    /// Signals the active session to stop. Returns false when idle.
    pub async fn stop(&self) -> bool {
        let requested = match self.cancel_tx.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(tx) => {
                    tx.send_replace(true);
                    true
                }
                None => false,
            },
            Err(_) => false,
        };
        if requested {
            tracing::info!("Capture session cancellation requested");
        }
        requested
    }

    /// Waits for the background session spawned by [`start`](Self::start).
    pub async fn wait(&self) -> Option<SessionReport> {
        let handle = self.task.lock().await.take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "Capture session task panicked");
                None
            }
        }
    }

    async fn prepare(&self) -> Result<PreparedSession, SessionError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("Capture session already running; start ignored");
            return Err(SessionError::AlreadyRunning);
        }
        let guard = RunningGuard {
            running: self.running.clone(),
            cancel_tx: self.cancel_tx.clone(),
            current: self.current.clone(),
        };

        let device = self.device.name();
        let stream = match self.device.open().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(%device, error = %e, "Could not access capture device");
                return Err(SessionError::DeviceUnavailable(e));
            }
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        if let Ok(mut slot) = self.cancel_tx.lock() {
            *slot = Some(cancel_tx);
        }

        let info = SessionInfo {
            id: uuid::Uuid::new_v4().to_string(),
            device,
            started_at: Utc::now(),
        };
        if let Ok(mut current) = self.current.write() {
            *current = Some(info.clone());
        }

        tracing::info!(
            session_id = %info.id,
            device = %info.device,
            duration_secs = self.settings.duration.as_secs_f64(),
            "Capture session started"
        );

        Ok(PreparedSession {
            guard,
            stream,
            cancel: cancel_rx,
            info,
        })
    }

    async fn drive(&self, prepared: PreparedSession) -> SessionReport {
        let PreparedSession {
            guard,
            mut stream,
            mut cancel,
            info,
        } = prepared;

        let deadline = session_deadline(Instant::now(), self.settings.duration);
        let mut counts = FrameCounts::default();

        let end_reason = loop {
            let cancelled = *cancel.borrow();
            if cancelled {
                break EndReason::Cancelled;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.changed() => break EndReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => break EndReason::Completed,
                next = stream.next_frame() => next,
            };

            match next {
                Ok(Some(frame)) => self.process_frame(frame, &mut counts).await,
                Ok(None) => break EndReason::EndOfStream,
                Err(e) => {
                    tracing::warn!(session_id = %info.id, error = %e, "Frame acquisition failed");
                    break EndReason::FrameError;
                }
            }

            if !self.settings.frame_interval.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.changed() => break EndReason::Cancelled,
                    _ = tokio::time::sleep(self.settings.frame_interval) => {}
                }
            }
        };

        drop(stream);
        tracing::debug!(session_id = %info.id, "Capture device released");

        let log_path = &self.settings.log_path;
        let persisted = match self.history.persist(log_path).await {
            Ok(entries) => {
                tracing::info!(entries, path = %log_path.display(), "Mood log written");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %log_path.display(), "Failed to write mood log");
                false
            }
        };

        let summary = summarize(&self.history.snapshot().await);
        let report = SessionReport {
            id: info.id,
            started_at: info.started_at,
            ended_at: Utc::now(),
            frames: counts.frames,
            no_face: counts.no_face,
            faults: counts.faults,
            end_reason,
            persisted,
            summary,
        };
        tracing::info!(
            session_id = %report.id,
            frames = report.frames,
            no_face = report.no_face,
            faults = report.faults,
            end_reason = ?report.end_reason,
            summary = %report.summary,
            "Capture session finished"
        );

        *self.last.write().await = Some(report.clone());
        drop(guard);

        report
    }

    async fn process_frame(&self, mut frame: Frame, counts: &mut FrameCounts) {
        if self.settings.mirror {
            frame.mirror();
        }

        let classification = self.classifier.classify(&frame).await;
        if classification.is_fault() {
            counts.faults += 1;
            tracing::debug!(
                classifier = self.classifier.name(),
                ?classification,
                "Classifier fault"
            );
        } else if classification == Classification::NoFace {
            counts.no_face += 1;
        }

        self.history.record(classification.label()).await;
        counts.frames += 1;
    }
}
