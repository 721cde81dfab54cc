#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use futures_util::future::BoxFuture;
use ndarray::ArrayView4;
use parking_lot::Mutex;
use serde_json::{json, Value};
use url::Url;

use webcam_classifier::camera::{CameraFrame, CameraSource, DisplaySurface, VideoStream};
use webcam_classifier::manifest::Manifest;
use webcam_classifier::model::{Classifier, ModelHandle, ModelRuntime};
use webcam_classifier::session::{PredictContext, SessionHooks};
use webcam_classifier::ClassifierError;

/// A manifest with one weight group
pub fn valid_manifest() -> Value {
    json!({ "weightsManifest": [{ "paths": ["group1-shard1of1.bin"] }] })
}

/// Model that always returns the same scores
pub struct StubModel {
    pub scores: Vec<f32>,
    pub input_size: (u32, u32),
}

impl Classifier for StubModel {
    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn predict(&self, _input: ArrayView4<'_, f32>) -> webcam_classifier::Result<Vec<f32>> {
        Ok(self.scores.clone())
    }
}

pub fn stub_model(scores: &[f32]) -> ModelHandle {
    Arc::new(StubModel {
        scores: scores.to_vec(),
        input_size: (8, 8),
    })
}

/// Runtime that records load requests and hands out stub models
pub struct StubRuntime {
    pub urls: Mutex<Vec<String>>,
    scores: Vec<f32>,
    failure: Option<String>,
}

impl StubRuntime {
    pub fn new(scores: &[f32]) -> Arc<Self> {
        Arc::new(Self {
            urls: Mutex::new(Vec::new()),
            scores: scores.to_vec(),
            failure: None,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            urls: Mutex::new(Vec::new()),
            scores: Vec::new(),
            failure: Some(message.to_string()),
        })
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().len()
    }
}

impl ModelRuntime for StubRuntime {
    fn load(&self, url: Url, _manifest: Manifest) -> BoxFuture<'static, webcam_classifier::Result<ModelHandle>> {
        self.urls.lock().push(url.to_string());
        let result = match &self.failure {
            Some(message) => Err(ClassifierError::Runtime(message.clone())),
            None => Ok(stub_model(&self.scores)),
        };
        Box::pin(async move { result })
    }
}

struct FakeStream {
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl VideoStream for FakeStream {
    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != std::thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

/// Camera that presents a grey 16x12 frame every few milliseconds.
/// Like the native capture thread it only holds the surface weakly.
#[derive(Default)]
pub struct FakeCamera {
    pub opens: AtomicUsize,
    live_threads: Arc<AtomicUsize>,
}

impl FakeCamera {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Capture threads that have not exited yet
    pub fn live_threads(&self) -> usize {
        self.live_threads.load(Ordering::SeqCst)
    }
}

impl CameraSource for FakeCamera {
    fn open(&self, surface: Arc<DisplaySurface>) -> BoxFuture<'static, webcam_classifier::Result<Box<dyn VideoStream>>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.live_threads.fetch_add(1, Ordering::SeqCst);

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let live_threads = self.live_threads.clone();
        let surface = Arc::downgrade(&surface);
        let thread = std::thread::spawn(move || {
            let mut frame_number = 0;
            while thread_running.load(Ordering::Acquire) {
                let Some(surface) = surface.upgrade() else {
                    break;
                };
                surface.present(CameraFrame::from_rgba(vec![90; 16 * 12 * 4], 16, 12, frame_number));
                drop(surface);
                frame_number += 1;
                std::thread::sleep(Duration::from_millis(5));
            }
            live_threads.fetch_sub(1, Ordering::SeqCst);
        });

        Box::pin(async move {
            Ok::<Box<dyn VideoStream>, ClassifierError>(Box::new(FakeStream {
                running,
                thread: Some(thread),
            }))
        })
    }
}

/// Camera whose stream opens but never delivers a frame
#[derive(Default)]
pub struct SilentCamera {
    pub opens: AtomicUsize,
}

impl CameraSource for SilentCamera {
    fn open(&self, _surface: Arc<DisplaySurface>) -> BoxFuture<'static, webcam_classifier::Result<Box<dyn VideoStream>>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {
            Ok::<Box<dyn VideoStream>, ClassifierError>(Box::new(FakeStream {
                running: Arc::new(AtomicBool::new(true)),
                thread: None,
            }))
        })
    }
}

/// Counts hook invocations
#[derive(Default)]
pub struct HookCounters {
    pub load: AtomicUsize,
    pub camera: AtomicUsize,
    pub predict: AtomicUsize,
}

impl HookCounters {
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.load.load(Ordering::SeqCst),
            self.camera.load(Ordering::SeqCst),
            self.predict.load(Ordering::SeqCst),
        )
    }
}

/// Hooks that only count calls. `load_error` makes model loading fail.
pub fn counting_hooks(counters: Arc<HookCounters>, load_error: Option<&str>) -> SessionHooks {
    let load_error = load_error.map(str::to_string);

    let load_counters = counters.clone();
    let camera_counters = counters.clone();
    let predict_counters = counters;

    SessionHooks {
        load_model: Arc::new(move |_url: String| -> BoxFuture<'static, webcam_classifier::Result<ModelHandle>> {
            load_counters.load.fetch_add(1, Ordering::SeqCst);
            let load_error = load_error.clone();
            Box::pin(async move {
                // Give a concurrent start the chance to run
                tokio::time::sleep(Duration::from_millis(10)).await;
                match load_error {
                    Some(message) => Err(ClassifierError::Runtime(message)),
                    None => Ok(stub_model(&[0.6, 0.4])),
                }
            })
        }),
        setup_camera: Arc::new(move |_surface: Arc<DisplaySurface>| -> BoxFuture<'static, webcam_classifier::Result<()>> {
            camera_counters.camera.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }),
        predict_loop: Arc::new(move |ctx: PredictContext| -> BoxFuture<'static, ()> {
            predict_counters.predict.fetch_add(1, Ordering::SeqCst);
            ctx.labels.set_prediction("class_0");
            Box::pin(async {})
        }),
    }
}

/// Serve manifests over HTTP on an ephemeral port
///
/// - `/tfjs_model/model.json`: valid manifest
/// - `/bad/model.json`: `{}`
/// - `/garbled/model.json`: not JSON
/// - anything else: 404
pub async fn serve_manifests() -> SocketAddr {
    let app = Router::new()
        .route("/tfjs_model/model.json", get(|| async { Json(valid_manifest()) }))
        .route("/bad/model.json", get(|| async { Json(json!({})) }))
        .route("/garbled/model.json", get(|| async { "not json" }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to read test server address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });
    addr
}

/// Write a manifest into a temp dir and return the dir and its file:// URL
pub fn manifest_dir(manifest: &Value) -> (tempfile::TempDir, Url) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let model_dir = dir.path().join("tfjs_model");
    std::fs::create_dir_all(&model_dir).expect("Failed to create model directory");
    std::fs::write(
        model_dir.join("model.json"),
        serde_json::to_vec(manifest).expect("Failed to serialize manifest"),
    )
    .expect("Failed to write manifest");

    let origin = Url::from_directory_path(dir.path()).expect("Temp dir is not absolute");
    (dir, origin)
}
