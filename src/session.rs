//! Session controller
//!
//! Sequences model loading, camera setup and the predict loop behind a
//! single-flight `running` flag. Each step is a replaceable hook so the
//! sequence can run without camera or model hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::camera::{self, CameraSource, DisplaySurface, NativeCamera};
use crate::error::Result;
use crate::labels::Labels;
use crate::model::{ModelHandle, ModelLoader, OnnxRuntime};
use crate::predict;
use crate::settings::ClassifierSettings;

/// Status shown while the model loads
pub const STATUS_LOADING: &str = "Loading model...";
/// Status shown once the model is loaded and the camera is being started
pub const STATUS_RUNNING: &str = "Camera ready. Running predictions...";

/// Everything the predict loop needs
pub struct PredictContext {
    pub surface: Arc<DisplaySurface>,
    pub model: ModelHandle,
    pub labels: Labels,
    pub interval: Duration,
    pub stop: watch::Receiver<bool>,
}

pub type LoadModelHook = Arc<dyn Fn(String) -> BoxFuture<'static, Result<ModelHandle>> + Send + Sync>;
pub type SetupCameraHook = Arc<dyn Fn(Arc<DisplaySurface>) -> BoxFuture<'static, Result<()>> + Send + Sync>;
pub type PredictLoopHook = Arc<dyn Fn(PredictContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// The three steps of a session start
#[derive(Clone)]
pub struct SessionHooks {
    pub load_model: LoadModelHook,
    pub setup_camera: SetupCameraHook,
    pub predict_loop: PredictLoopHook,
}

impl SessionHooks {
    /// Hooks backed by a model loader and a camera source
    pub fn new(loader: ModelLoader, camera: Arc<dyn CameraSource>) -> Self {
        Self {
            load_model: Arc::new(move |url: String| -> BoxFuture<'static, Result<ModelHandle>> {
                let loader = loader.clone();
                Box::pin(async move { loader.load_model(&url).await })
            }),
            setup_camera: Arc::new(move |surface: Arc<DisplaySurface>| -> BoxFuture<'static, Result<()>> {
                let camera = camera.clone();
                Box::pin(async move { camera::setup_camera(camera.as_ref(), surface).await })
            }),
            predict_loop: Arc::new(|ctx: PredictContext| -> BoxFuture<'static, ()> {
                Box::pin(predict::predict_loop(
                    ctx.surface,
                    ctx.model,
                    ctx.labels,
                    ctx.interval,
                    ctx.stop,
                ))
            }),
        }
    }

    /// ONNX Runtime model and native camera, configured from settings
    pub fn native(settings: &ClassifierSettings) -> Result<Self> {
        let runtime = Arc::new(OnnxRuntime::new(settings)?);
        let loader = ModelLoader::new(&settings.origin, runtime)?;
        Ok(Self::new(loader, Arc::new(NativeCamera::new(settings.camera_index))))
    }
}

/// A classification session
pub struct Session {
    settings: ClassifierSettings,
    running: AtomicBool,
    hooks: RwLock<SessionHooks>,
    default_hooks: SessionHooks,
    labels: Labels,
    surface: Arc<DisplaySurface>,
    model: Mutex<Option<ModelHandle>>,
    stop_tx: watch::Sender<bool>,
    predict_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session whose default hooks are `hooks`
    pub fn new(settings: ClassifierSettings, hooks: SessionHooks) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            settings,
            running: AtomicBool::new(false),
            hooks: RwLock::new(hooks.clone()),
            default_hooks: hooks,
            labels: Labels::new(),
            surface: Arc::new(DisplaySurface::new()),
            model: Mutex::new(None),
            stop_tx,
            predict_task: Mutex::new(None),
        }
    }

    /// Create a session using the ONNX runtime and the native camera
    pub fn native(settings: ClassifierSettings) -> Result<Self> {
        let hooks = SessionHooks::native(&settings)?;
        Ok(Self::new(settings, hooks))
    }

    /// Replace the hooks used by subsequent starts
    pub fn set_hooks(&self, hooks: SessionHooks) {
        *self.hooks.write() = hooks;
    }

    /// Restore the hooks the session was created with
    pub fn reset_hooks(&self) {
        *self.hooks.write() = self.default_hooks.clone();
    }

    /// Start the session.
    ///
    /// A no-op if a start is in flight or has already happened. Failures are
    /// written to the status label.
    pub async fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Session already started, ignoring start request");
            return;
        }

        let hooks = self.hooks.read().clone();
        if let Err(e) = self.run_sequence(&hooks).await {
            tracing::error!("Session start failed: {}", e);
            self.labels.set_status(format!("Error: {}", e));
            *self.model.lock() = None;
            if self.settings.allow_restart {
                self.running.store(false, Ordering::Release);
            }
        }
    }

    async fn run_sequence(&self, hooks: &SessionHooks) -> Result<()> {
        self.stop_tx.send_replace(false);

        self.labels.set_status(STATUS_LOADING);
        let model = (hooks.load_model)(self.settings.model_url.clone()).await?;
        *self.model.lock() = Some(model.clone());

        self.labels.set_status(STATUS_RUNNING);
        (hooks.setup_camera)(self.surface.clone()).await?;

        let ctx = PredictContext {
            surface: self.surface.clone(),
            model,
            labels: self.labels.clone(),
            interval: self.settings.tick_interval(),
            stop: self.stop_tx.subscribe(),
        };
        let task = tokio::spawn((hooks.predict_loop)(ctx));
        *self.predict_task.lock() = Some(task);
        Ok(())
    }

    /// Stop the predict loop and release the camera.
    ///
    /// The session can only be started again if `allow_restart` is set.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);

        let task = self.predict_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Predict loop ended abnormally: {}", e);
            }
        }

        self.surface.detach();
        *self.model.lock() = None;

        if self.settings.allow_restart {
            self.running.store(false, Ordering::Release);
        }
        tracing::info!("Session stopped");
    }

    /// Whether a predict loop was spawned and is still running
    pub fn is_predicting(&self) -> bool {
        self.predict_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn surface(&self) -> &Arc<DisplaySurface> {
        &self.surface
    }

    /// The loaded model, once loading succeeded
    pub fn model(&self) -> Option<ModelHandle> {
        self.model.lock().clone()
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
        if let Some(task) = self.predict_task.get_mut().take() {
            task.abort();
        }
        self.surface.detach();
    }
}
