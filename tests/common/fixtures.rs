use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use mood_monitor::classifier::{Classification, EmotionClassifier};
use mood_monitor::device::{CaptureDevice, DeviceError, Frame, FrameStream};

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Yields this many frames, then reports end of stream.
    Frames(usize),
    /// Never yields a frame; the session only ends when cancelled.
    Stalled,
    /// Refuses to open.
    Unavailable,
}

pub struct StubCamera {
    behavior: Behavior,
    opens: AtomicUsize,
}

impl StubCamera {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            opens: AtomicUsize::new(0),
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for StubCamera {
    fn name(&self) -> String {
        "stub-camera".to_string()
    }

    async fn open(&self) -> Result<Box<dyn FrameStream>, DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Unavailable => Err(DeviceError::Unavailable("/dev/video0 busy".to_string())),
            behavior => Ok(Box::new(StubStream {
                behavior,
                emitted: 0,
            })),
        }
    }
}

struct StubStream {
    behavior: Behavior,
    emitted: usize,
}

#[async_trait]
impl FrameStream for StubStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        match self.behavior {
            Behavior::Frames(n) if self.emitted >= n => Ok(None),
            Behavior::Stalled => std::future::pending().await,
            _ => {
                self.emitted += 1;
                Ok(Some(Frame::new(RgbImage::from_pixel(4, 4, Rgb([90, 90, 90])))))
            }
        }
    }
}

/// Hands out the given labels in order, wrapping around.
pub struct LabelCycle {
    labels: Vec<String>,
    calls: AtomicUsize,
}

impl LabelCycle {
    pub fn new(labels: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EmotionClassifier for LabelCycle {
    fn name(&self) -> &'static str {
        "label-cycle"
    }

    async fn classify(&self, _frame: &Frame) -> Classification {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        Classification::Emotion(self.labels[idx % self.labels.len()].clone())
    }
}
