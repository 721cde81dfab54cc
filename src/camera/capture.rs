//! Native camera capture using the nokhwa crate.
//!
//! Frames are captured on a background thread and presented to the display
//! surface as they arrive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use futures_util::future::BoxFuture;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use tokio::sync::oneshot;

use super::{CameraFrame, CameraSource, DisplaySurface, VideoStream};
use crate::error::{ClassifierError, Result};

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    /// Camera index
    pub index: u32,
    /// Camera name
    pub name: String,
}

/// List available cameras
pub fn list_cameras() -> Result<Vec<CameraInfo>> {
    let cameras = nokhwa::query(ApiBackend::Auto)
        .map_err(|e| ClassifierError::Camera(format!("Failed to enumerate cameras: {}", e)))?;

    Ok(cameras
        .iter()
        .enumerate()
        .map(|(idx, info)| CameraInfo {
            index: idx as u32,
            name: info.human_name().to_string(),
        })
        .collect())
}

/// Camera source backed by the platform's native capture API
#[derive(Clone, Debug)]
pub struct NativeCamera {
    /// Camera index (0 for the default device)
    pub index: u32,
}

impl NativeCamera {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

impl NativeCamera {
    async fn open_stream(camera_index: u32, surface: Arc<DisplaySurface>) -> Result<Box<dyn VideoStream>> {
        let stream = CaptureStream::start(camera_index, Arc::downgrade(&surface))?;
        stream.opened.await.map_err(|_| {
            ClassifierError::Camera("Camera capture thread exited before opening".to_string())
        })??;
        Ok(Box::new(stream.handle))
    }
}

impl CameraSource for NativeCamera {
    fn open(&self, surface: Arc<DisplaySurface>) -> BoxFuture<'static, Result<Box<dyn VideoStream>>> {
        Box::pin(Self::open_stream(self.index, surface))
    }
}

/// Handle to a running capture thread
struct CaptureHandle {
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl VideoStream for CaptureHandle {
    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            // The capture thread may drop the last surface reference itself
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CaptureStream {
    handle: CaptureHandle,
    opened: oneshot::Receiver<Result<()>>,
}

impl CaptureStream {
    fn start(camera_index: u32, surface: Weak<DisplaySurface>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let (opened_tx, opened) = oneshot::channel();

        let running_clone = running.clone();
        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_thread(camera_index, surface, running_clone, opened_tx))
            .map_err(|e| ClassifierError::Camera(format!("Failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            handle: CaptureHandle {
                running,
                thread_handle: Some(thread_handle),
            },
            opened,
        })
    }
}

/// Open the camera, preferring the highest resolution it offers
fn open_camera(camera_index: u32) -> Result<Camera> {
    let index = CameraIndex::Index(camera_index);

    let attempts = [
        RequestedFormatType::AbsoluteHighestResolution,
        RequestedFormatType::HighestResolution(Resolution::new(640, 480)),
        RequestedFormatType::None,
    ];

    let mut last_error = None;
    for (attempt, format) in attempts.into_iter().enumerate() {
        match Camera::new(index.clone(), RequestedFormat::new::<RgbAFormat>(format)) {
            Ok(camera) => return Ok(camera),
            Err(e) => {
                tracing::warn!(attempt, "Failed to open camera {}: {}", camera_index, e);
                last_error = Some(e);
            }
        }
    }

    Err(ClassifierError::Camera(match last_error {
        Some(e) => e.to_string(),
        None => format!("Camera {} unavailable", camera_index),
    }))
}

/// Camera capture thread. Exits once stopped or once the surface is gone.
fn capture_thread(
    camera_index: u32,
    surface: Weak<DisplaySurface>,
    running: Arc<AtomicBool>,
    opened: oneshot::Sender<Result<()>>,
) {
    tracing::info!("Starting camera capture thread (camera {})", camera_index);

    let mut camera = match open_camera(camera_index) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = opened.send(Err(e));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = opened.send(Err(ClassifierError::Camera(e.to_string())));
        return;
    }

    tracing::info!(
        "Camera opened: {} ({}x{})",
        camera.info().human_name(),
        camera.resolution().width(),
        camera.resolution().height()
    );
    let _ = opened.send(Ok(()));

    let frame_count = AtomicU64::new(0);

    while running.load(Ordering::Acquire) {
        match camera.frame() {
            Ok(frame) => match frame.decode_image::<RgbAFormat>() {
                Ok(image) => {
                    let Some(surface) = surface.upgrade() else {
                        break;
                    };
                    let frame_number = frame_count.fetch_add(1, Ordering::Relaxed);
                    surface.present(CameraFrame {
                        width: image.width(),
                        height: image.height(),
                        data: image.into_raw(),
                        frame_number,
                        timestamp: Instant::now(),
                    });
                }
                Err(e) => {
                    tracing::warn!("Failed to decode frame: {}", e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to capture frame: {}", e);
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Failed to stop camera stream: {}", e);
    }
    tracing::info!("Camera capture thread stopped");
}
