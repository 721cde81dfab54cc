//! Camera acquisition and the display surface
//!
//! A [`CameraSource`] opens a platform video stream and publishes its frames
//! into a [`DisplaySurface`]. The surface keeps the latest frame in a triple
//! buffer and signals readiness once a frame with usable dimensions has
//! arrived.

pub mod capture;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::Result;

pub use capture::{list_cameras, CameraInfo, NativeCamera};

/// Camera frame data
#[derive(Clone, Debug)]
pub struct CameraFrame {
    /// RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame number
    pub frame_number: u64,
    /// Frame timestamp
    pub timestamp: Instant,
}

impl CameraFrame {
    /// Build a frame from raw RGBA bytes
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32, frame_number: u64) -> Self {
        Self {
            data,
            width,
            height,
            frame_number,
            timestamp: Instant::now(),
        }
    }
}

/// A running platform stream. Dropping or stopping it ends capture.
pub trait VideoStream: Send {
    /// Stop capturing
    fn stop(&mut self);
}

/// Platform capability that opens a video-only stream into a surface.
///
/// The returned future resolves once the stream is playing, or fails with
/// the platform's message (no device, permission denied). Capture should
/// only hold the surface weakly: the surface owns the stream.
pub trait CameraSource: Send + Sync {
    fn open(&self, surface: Arc<DisplaySurface>) -> BoxFuture<'static, Result<Box<dyn VideoStream>>>;
}

/// Rendering target that always holds the most recent camera frame
pub struct DisplaySurface {
    /// Triple buffered frames
    frames: [Mutex<Option<CameraFrame>>; 3],
    /// Slot of the latest complete frame
    latest_slot: AtomicU64,
    /// Next slot to write
    write_slot: AtomicU64,
    /// Readiness ("metadata loaded")
    ready: watch::Sender<bool>,
    /// Attached stream
    stream: Mutex<Option<Box<dyn VideoStream>>>,
}

impl DisplaySurface {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            frames: [Mutex::new(None), Mutex::new(None), Mutex::new(None)],
            latest_slot: AtomicU64::new(0),
            write_slot: AtomicU64::new(0),
            ready,
            stream: Mutex::new(None),
        }
    }

    /// Publish a new frame. The first frame with non-zero dimensions marks
    /// the surface ready.
    pub fn present(&self, frame: CameraFrame) {
        let has_dimensions = frame.width > 0 && frame.height > 0;

        let idx = self.write_slot.fetch_add(1, Ordering::AcqRel);
        *self.frames[(idx % 3) as usize].lock() = Some(frame);
        self.latest_slot.store(idx, Ordering::Release);

        if has_dimensions {
            self.ready.send_if_modified(|ready| {
                let changed = !*ready;
                *ready = true;
                changed
            });
        }
    }

    /// The latest frame, if any has been presented
    pub fn current_frame(&self) -> Option<CameraFrame> {
        if self.write_slot.load(Ordering::Acquire) == 0 {
            return None;
        }
        let idx = self.latest_slot.load(Ordering::Acquire);
        self.frames[(idx % 3) as usize].lock().clone()
    }

    /// Dimensions of the latest frame
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.current_frame().map(|f| (f.width, f.height))
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the surface has usable dimensions. No timeout.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives in self, so this only errors if self is gone
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Attach a stream, stopping any previously attached one
    pub fn attach(&self, stream: Box<dyn VideoStream>) {
        let previous = self.stream.lock().replace(stream);
        if let Some(mut previous) = previous {
            previous.stop();
        }
    }

    /// Stop and release the attached stream.
    ///
    /// Buffered frames are dropped and the surface is no longer ready, so a
    /// later stream has to deliver its own first frame.
    pub fn detach(&self) {
        let stream = self.stream.lock().take();
        if let Some(mut stream) = stream {
            stream.stop();
        }
        self.clear();
    }

    fn clear(&self) {
        self.ready.send_replace(false);
        self.write_slot.store(0, Ordering::Release);
        self.latest_slot.store(0, Ordering::Release);
        for slot in &self.frames {
            *slot.lock() = None;
        }
    }

    pub fn has_stream(&self) -> bool {
        self.stream.lock().is_some()
    }
}

impl Default for DisplaySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DisplaySurface {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Open a camera stream, attach it to `surface` and wait for it to be ready.
pub async fn setup_camera(source: &dyn CameraSource, surface: Arc<DisplaySurface>) -> Result<()> {
    tracing::info!("Requesting camera stream");
    let stream = source.open(surface.clone()).await?;
    surface.attach(stream);

    surface.wait_ready().await;

    if let Some((width, height)) = surface.dimensions() {
        tracing::info!(width, height, "Camera stream ready");
    }
    Ok(())
}
