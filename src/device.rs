//! Camera abstraction. A device is opened once per capture session and yields
//! decoded RGB frames until the session drops the stream.

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use thiserror::Error;

use crate::config::{DeviceConfig, DeviceSource};
use crate::constants::FRAME_FILE_EXTENSIONS;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("could not access device: {0}")]
    Unavailable(String),
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }

    /// Flips the frame left-to-right so it reads like a mirror.
    pub fn mirror(&mut self) {
        image::imageops::flip_horizontal_in_place(&mut self.image);
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&self.image)?;
        Ok(buf.into_inner())
    }
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    fn name(&self) -> String;

    /// Acquires the device. Failing here means the session never starts.
    async fn open(&self) -> Result<Box<dyn FrameStream>, DeviceError>;
}

#[async_trait]
pub trait FrameStream: Send {
    /// `Ok(None)` once the source has no more frames.
    async fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError>;
}

pub fn from_config(config: &DeviceConfig) -> Arc<dyn CaptureDevice> {
    match config.source {
        DeviceSource::Webcam => Arc::new(WebcamDevice::new(config.camera_index)),
        DeviceSource::Directory => Arc::new(DirectoryDevice::new(&config.dir)),
        DeviceSource::Snapshot => Arc::new(SnapshotDevice::new(
            &config.snapshot_url,
            Duration::from_secs(config.timeout_secs),
        )),
    }
}

/// Validate device configuration at startup.
/// Panics if the snapshot source is selected without a URL, or the webcam
/// source in a build without the `webcam` feature.
pub fn validate_config(config: &DeviceConfig) {
    if config.source == DeviceSource::Webcam && !cfg!(feature = "webcam") {
        panic!(
            "Invalid capture configuration: CAPTURE_SOURCE=webcam requires \
             building with `--features webcam`."
        );
    }
    if config.source == DeviceSource::Snapshot && config.snapshot_url.trim().is_empty() {
        panic!(
            "Invalid capture configuration: CAPTURE_SOURCE=snapshot requires \
             CAPTURE_SNAPSHOT_URL to be set."
        );
    }
}

async fn decode(bytes: Vec<u8>) -> Result<Frame, DeviceError> {
    let image =
        tokio::task::spawn_blocking(move || image::load_from_memory(&bytes).map(|i| i.to_rgb8()))
            .await
            .map_err(|e| DeviceError::Read(e.to_string()))??;
    Ok(Frame::new(image))
}

/// Local camera opened by index through OpenCV's videoio.
#[derive(Debug, Clone)]
pub struct WebcamDevice {
    index: i32,
}

impl WebcamDevice {
    pub fn new(index: i32) -> Self {
        Self { index }
    }
}

#[async_trait]
impl CaptureDevice for WebcamDevice {
    fn name(&self) -> String {
        format!("webcam:{}", self.index)
    }

    async fn open(&self) -> Result<Box<dyn FrameStream>, DeviceError> {
        webcam::open(self.index).await
    }
}

#[cfg(feature = "webcam")]
mod webcam {
    use async_trait::async_trait;
    use image::RgbImage;
    use opencv::core::Mat;
    use opencv::prelude::*;
    use opencv::{imgproc, videoio};

    use super::{DeviceError, Frame, FrameStream};

    pub(super) async fn open(index: i32) -> Result<Box<dyn FrameStream>, DeviceError> {
        let capture = tokio::task::spawn_blocking(move || open_capture(index))
            .await
            .map_err(|e| DeviceError::Unavailable(e.to_string()))??;
        tracing::debug!(index, "Webcam opened");
        Ok(Box::new(WebcamStream {
            capture: Some(capture),
        }))
    }

    fn open_capture(index: i32) -> Result<videoio::VideoCapture, DeviceError> {
        let unavailable = |e: opencv::Error| DeviceError::Unavailable(format!("camera {index}: {e}"));
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY).map_err(unavailable)?;
        if !capture.is_opened().map_err(unavailable)? {
            return Err(DeviceError::Unavailable(format!(
                "camera {index} could not be opened"
            )));
        }
        Ok(capture)
    }

    /// The capture handle moves into the blocking pool for every read. A read
    /// dropped mid-flight releases the camera with it.
    struct WebcamStream {
        capture: Option<videoio::VideoCapture>,
    }

    #[async_trait]
    impl FrameStream for WebcamStream {
        async fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
            let Some(mut capture) = self.capture.take() else {
                return Ok(None);
            };
            let (capture, frame) = tokio::task::spawn_blocking(move || {
                let frame = read_frame(&mut capture);
                (capture, frame)
            })
            .await
            .map_err(|e| DeviceError::Read(e.to_string()))?;
            self.capture = Some(capture);
            frame.map(Some)
        }
    }

    fn read_frame(capture: &mut videoio::VideoCapture) -> Result<Frame, DeviceError> {
        let read_err = |e: opencv::Error| DeviceError::Read(e.to_string());

        let mut bgr = Mat::default();
        let grabbed = capture.read(&mut bgr).map_err(read_err)?;
        if !grabbed || bgr.rows() == 0 {
            return Err(DeviceError::Read("camera returned no frame".to_string()));
        }

        // OpenCV 帧为 BGR 顺序
        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(read_err)?;
        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let bytes = rgb.data_bytes().map_err(read_err)?.to_vec();
        let image = RgbImage::from_raw(width, height, bytes)
            .ok_or_else(|| DeviceError::Read("unexpected frame layout".to_string()))?;
        Ok(Frame::new(image))
    }
}

#[cfg(not(feature = "webcam"))]
mod webcam {
    use super::{DeviceError, FrameStream};

    pub(super) async fn open(index: i32) -> Result<Box<dyn FrameStream>, DeviceError> {
        Err(DeviceError::Unavailable(format!(
            "camera {index}: built without the `webcam` feature"
        )))
    }
}

/// Replays the image files of a directory, in name order, as camera frames.
#[derive(Debug, Clone)]
pub struct DirectoryDevice {
    dir: PathBuf,
}

impl DirectoryDevice {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn is_frame_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                FRAME_FILE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl CaptureDevice for DirectoryDevice {
    fn name(&self) -> String {
        format!("directory:{}", self.dir.display())
    }

    async fn open(&self) -> Result<Box<dyn FrameStream>, DeviceError> {
        let unavailable = |e: std::io::Error| {
            DeviceError::Unavailable(format!("{}: {e}", self.dir.display()))
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(unavailable)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let path = entry.path();
            if Self::is_frame_file(&path) {
                files.push(path);
            }
        }

        if files.is_empty() {
            return Err(DeviceError::Unavailable(format!(
                "{}: no frames found",
                self.dir.display()
            )));
        }
        files.sort();

        Ok(Box::new(DirectoryStream {
            files: files.into(),
        }))
    }
}

struct DirectoryStream {
    files: VecDeque<PathBuf>,
}

#[async_trait]
impl FrameStream for DirectoryStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        let Some(path) = self.files.pop_front() else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(&path).await?;
        decode(bytes).await.map(Some)
    }
}

/// Pulls a still image from an IP camera snapshot URL for every frame.
#[derive(Debug, Clone)]
pub struct SnapshotDevice {
    url: String,
    client: reqwest::Client,
}

impl SnapshotDevice {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.to_string(),
            client,
        }
    }
}

async fn fetch_snapshot(client: &reqwest::Client, url: &str) -> Result<Frame, DeviceError> {
    let resp = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| DeviceError::Read(e.to_string()))?;
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| DeviceError::Read(e.to_string()))?;
    decode(bytes.to_vec()).await
}

#[async_trait]
impl CaptureDevice for SnapshotDevice {
    fn name(&self) -> String {
        format!("snapshot:{}", self.url)
    }

    async fn open(&self) -> Result<Box<dyn FrameStream>, DeviceError> {
        // 打开时先抓一帧探测设备，探测帧作为首帧返回
        let first = fetch_snapshot(&self.client, &self.url)
            .await
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        Ok(Box::new(SnapshotStream {
            url: self.url.clone(),
            client: self.client.clone(),
            pending: Some(first),
        }))
    }
}

struct SnapshotStream {
    url: String,
    client: reqwest::Client,
    pending: Option<Frame>,
}

#[async_trait]
impl FrameStream for SnapshotStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        fetch_snapshot(&self.client, &self.url).await.map(Some)
    }
}
